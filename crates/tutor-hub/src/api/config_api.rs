//! Administration of `models.json`: endpoints, models, feature defaults, reload.
//!
//! Every write goes through the catalog on a blocking thread.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::model_catalog::{
    CatalogError, EndpointDefinition, EndpointPatch, ModelCatalog, ModelDefinition, ModelKind, ModelPatch,
    ModelSelection,
};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct EndpointRequest {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(url)]
    pub base_url: String,
    pub api_key_env: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ModelRequest {
    #[validate(length(min = 1, max = 100))]
    pub id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub endpoint: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub voices: Vec<String>,
}

fn enabled() -> bool {
    true
}

impl From<EndpointRequest> for EndpointDefinition {
    fn from(req: EndpointRequest) -> Self {
        EndpointDefinition {
            id: req.id.trim().to_string(),
            name: req.name,
            base_url: req.base_url.trim_end_matches('/').to_string(),
            api_key_env: req.api_key_env.filter(|v| !v.trim().is_empty()),
            enabled: req.enabled,
        }
    }
}

impl From<ModelRequest> for ModelDefinition {
    fn from(req: ModelRequest) -> Self {
        ModelDefinition {
            id: req.id.trim().to_string(),
            name: req.name,
            endpoint: req.endpoint.filter(|v| !v.trim().is_empty()),
            enabled: req.enabled,
            voices: req.voices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<EndpointDefinition>,
}

#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    pub ok: bool,
    pub endpoint: EndpointDefinition,
}

#[derive(Debug, Serialize)]
pub struct ModelsListResponse {
    pub models: Vec<ModelDefinition>,
}

#[derive(Debug, Serialize)]
pub struct ModelResponse {
    pub ok: bool,
    pub model: ModelDefinition,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct DefaultsResponse {
    pub ok: bool,
    pub defaults: ModelSelection,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub ok: bool,
    pub message: String,
}

/// Run a catalog operation off the async workers.
async fn with_catalog<T, F>(state: &AppState, op: F) -> Result<T, TutorError>
where
    F: FnOnce(&ModelCatalog) -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    let catalog = state.catalog.clone();
    tokio::task::spawn_blocking(move || op(&catalog))
        .await
        .map_err(|e| TutorError::Internal(format!("catalog task failed: {}", e)))?
        .map_err(TutorError::from)
}

fn model_kind(raw: &str) -> Result<ModelKind, TutorError> {
    raw.parse::<ModelKind>().map_err(TutorError::Validation)
}

fn feature_name(raw: &str) -> Result<String, TutorError> {
    let feature = raw.trim().to_ascii_lowercase();
    if feature.is_empty() || feature.len() > 32 {
        return Err(TutorError::Validation(format!("Invalid feature name '{}'", raw)));
    }
    Ok(feature)
}

/// GET /api/v1/config/endpoints
pub async fn list_endpoints(State(state): State<AppState>) -> Result<Json<EndpointsResponse>, TutorError> {
    let result = with_catalog(&state, |catalog| Ok(catalog.endpoints())).await;
    track("GET /api/v1/config/endpoints", result.map(|endpoints| EndpointsResponse { endpoints })).map(Json)
}

/// POST /api/v1/config/endpoints
pub async fn add_endpoint(
    State(state): State<AppState>,
    Json(request): Json<EndpointRequest>,
) -> Result<Json<EndpointResponse>, TutorError> {
    let result = match validate_input(&request) {
        Ok(()) => {
            let endpoint = EndpointDefinition::from(request);
            info!("Adding endpoint {} ({})", endpoint.id, endpoint.base_url);
            with_catalog(&state, move |catalog| catalog.add_endpoint(endpoint)).await
        }
        Err(e) => Err(e),
    };
    track("POST /api/v1/config/endpoints", result.map(|endpoint| EndpointResponse { ok: true, endpoint })).map(Json)
}

/// PUT /api/v1/config/endpoints/:id
pub async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<EndpointPatch>,
) -> Result<Json<EndpointResponse>, TutorError> {
    info!("Updating endpoint {}", id);
    let result = with_catalog(&state, move |catalog| catalog.update_endpoint(&id, &patch)).await;
    track("PUT /api/v1/config/endpoints/:id", result.map(|endpoint| EndpointResponse { ok: true, endpoint })).map(Json)
}

/// DELETE /api/v1/config/endpoints/:id
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, TutorError> {
    info!("Deleting endpoint {}", id);
    let result = with_catalog(&state, move |catalog| catalog.delete_endpoint(&id)).await;
    track("DELETE /api/v1/config/endpoints/:id", result.map(|()| OkResponse { ok: true })).map(Json)
}

/// GET /api/v1/config/models/:model_type
///
/// Lists disabled models too, so they can be re-enabled.
pub async fn list_catalog_models(
    State(state): State<AppState>,
    Path(model_type): Path<String>,
) -> Result<Json<ModelsListResponse>, TutorError> {
    let result = match model_kind(&model_type) {
        Ok(kind) => with_catalog(&state, move |catalog| Ok(catalog.models(kind, true))).await,
        Err(e) => Err(e),
    };
    track("GET /api/v1/config/models/:model_type", result.map(|models| ModelsListResponse { models })).map(Json)
}

/// POST /api/v1/config/models/:model_type
pub async fn add_catalog_model(
    State(state): State<AppState>,
    Path(model_type): Path<String>,
    Json(request): Json<ModelRequest>,
) -> Result<Json<ModelResponse>, TutorError> {
    let checked = model_kind(&model_type).and_then(|kind| validate_input(&request).map(|()| kind));
    let result = match checked {
        Ok(kind) => {
            let model = ModelDefinition::from(request);
            info!("Adding {} model {}", kind, model.id);
            with_catalog(&state, move |catalog| catalog.add_model(kind, model)).await
        }
        Err(e) => Err(e),
    };
    track("POST /api/v1/config/models/:model_type", result.map(|model| ModelResponse { ok: true, model })).map(Json)
}

/// PUT /api/v1/config/models/:model_type/:id
pub async fn update_catalog_model(
    State(state): State<AppState>,
    Path((model_type, id)): Path<(String, String)>,
    Json(patch): Json<ModelPatch>,
) -> Result<Json<ModelResponse>, TutorError> {
    let result = match model_kind(&model_type) {
        Ok(kind) => {
            info!("Updating {} model {}", kind, id);
            with_catalog(&state, move |catalog| catalog.update_model(kind, &id, &patch)).await
        }
        Err(e) => Err(e),
    };
    track("PUT /api/v1/config/models/:model_type/:id", result.map(|model| ModelResponse { ok: true, model })).map(Json)
}

/// DELETE /api/v1/config/models/:model_type/:id
pub async fn delete_catalog_model(
    State(state): State<AppState>,
    Path((model_type, id)): Path<(String, String)>,
) -> Result<Json<OkResponse>, TutorError> {
    let result = match model_kind(&model_type) {
        Ok(kind) => {
            info!("Deleting {} model {}", kind, id);
            with_catalog(&state, move |catalog| catalog.delete_model(kind, &id)).await
        }
        Err(e) => Err(e),
    };
    track("DELETE /api/v1/config/models/:model_type/:id", result.map(|()| OkResponse { ok: true })).map(Json)
}

/// GET /api/v1/config/defaults/:feature
pub async fn get_defaults(
    State(state): State<AppState>,
    Path(feature): Path<String>,
) -> Result<Json<DefaultsResponse>, TutorError> {
    let result = match feature_name(&feature) {
        Ok(feature) => with_catalog(&state, move |catalog| Ok(catalog.defaults(&feature))).await,
        Err(e) => Err(e),
    };
    track("GET /api/v1/config/defaults/:feature", result.map(|defaults| DefaultsResponse { ok: true, defaults }))
        .map(Json)
}

/// PUT /api/v1/config/defaults/:feature
pub async fn set_defaults(
    State(state): State<AppState>,
    Path(feature): Path<String>,
    Json(defaults): Json<ModelSelection>,
) -> Result<Json<DefaultsResponse>, TutorError> {
    let result = match feature_name(&feature) {
        Ok(feature) => {
            info!("Setting {} defaults: {:?}", feature, defaults);
            with_catalog(&state, move |catalog| catalog.set_defaults(&feature, defaults)).await
        }
        Err(e) => Err(e),
    };
    track("PUT /api/v1/config/defaults/:feature", result.map(|defaults| DefaultsResponse { ok: true, defaults }))
        .map(Json)
}

/// POST /api/v1/config/reload
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<ReloadResponse>, TutorError> {
    let result = with_catalog(&state, |catalog| catalog.reload().map_err(CatalogError::from)).await;
    track(
        "POST /api/v1/config/reload",
        result.map(|()| ReloadResponse { ok: true, message: "Configuration reloaded".to_string() }),
    )
    .map(Json)
}
