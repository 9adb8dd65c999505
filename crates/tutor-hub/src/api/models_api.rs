//! Model catalog and per-feature model selection endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use validator::Validate;

use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::metrics;
use crate::model_catalog::{ModelDefinition, ModelSelection, TTS_VOICES};
use crate::model_registry::{FEATURE_ENGLISH, FEATURE_MATH};
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub voices: Vec<String>,
}

/// Selectable models keyed by id, shaped for the client's dropdowns.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub llm: BTreeMap<String, ModelInfo>,
    pub tts: BTreeMap<String, ModelInfo>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectModelsParams {
    pub feature: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub llm: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub tts: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub tts_voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectModelsResponse {
    pub ok: bool,
    pub feature: String,
    pub selection: ModelSelection,
}

fn llm_info(model: ModelDefinition) -> (String, ModelInfo) {
    (model.id, ModelInfo { name: model.name, voices: Vec::new() })
}

fn tts_info(model: ModelDefinition) -> (String, ModelInfo) {
    let voices = if model.voices.is_empty() {
        TTS_VOICES.iter().map(|v| v.to_string()).collect()
    } else {
        model.voices
    };
    (model.id, ModelInfo { name: model.name, voices })
}

/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    metrics::inc_request("GET /api/v1/models", "200");
    let response = match state.registry.catalog() {
        Some(catalog) => ModelsResponse {
            llm: catalog.llm_models().into_iter().map(llm_info).collect(),
            tts: catalog.tts_models().into_iter().map(tts_info).collect(),
        },
        None => {
            let defaults = state.registry.defaults();
            let single = |id: &str| ModelDefinition {
                id: id.to_string(),
                name: id.to_string(),
                endpoint: None,
                enabled: true,
                voices: Vec::new(),
            };
            ModelsResponse {
                llm: [llm_info(single(&defaults.llm))].into_iter().collect(),
                tts: [tts_info(single(&defaults.tts))].into_iter().collect(),
            }
        }
    };
    Json(response)
}

/// GET /api/v1/models/selected
pub async fn selected_models(State(state): State<AppState>) -> Json<BTreeMap<String, ModelSelection>> {
    metrics::inc_request("GET /api/v1/models/selected", "200");
    Json(state.registry.all())
}

fn check_selection(params: &SelectModelsParams) -> Result<String, TutorError> {
    validate_input(params)?;
    let feature = params
        .feature
        .as_deref()
        .map(|f| f.trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| FEATURE_ENGLISH.to_string());
    if feature != FEATURE_ENGLISH && feature != FEATURE_MATH {
        return Err(TutorError::Validation(format!(
            "Unknown feature '{}'; expected {} or {}",
            feature, FEATURE_ENGLISH, FEATURE_MATH
        )));
    }
    if let Some(voice) = params.tts_voice.as_deref() {
        if !TTS_VOICES.contains(&voice.trim().to_ascii_lowercase().as_str()) {
            return Err(TutorError::Validation(format!("Unknown voice '{}'", voice)));
        }
    }
    Ok(feature)
}

/// POST /api/v1/models/select
pub async fn select_models(
    State(state): State<AppState>,
    Query(params): Query<SelectModelsParams>,
) -> Result<Json<SelectModelsResponse>, TutorError> {
    let result = match check_selection(&params) {
        Ok(feature) => {
            let update = ModelSelection {
                llm: params.llm,
                tts: params.tts,
                tts_voice: params.tts_voice.map(|v| v.trim().to_ascii_lowercase()),
            };
            info!("Selecting models for {}: {:?}", feature, update);
            // The selection is persisted to the catalog file.
            let registry = state.registry.clone();
            tokio::task::spawn_blocking(move || {
                let selection = registry.set_models(&feature, &update);
                SelectModelsResponse { ok: true, feature, selection }
            })
            .await
            .map_err(|e| TutorError::Internal(format!("model selection task failed: {}", e)))
        }
        Err(e) => Err(e),
    };
    track("POST /api/v1/models/select", result).map(Json)
}
