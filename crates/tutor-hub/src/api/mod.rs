//! HTTP endpoints. Handlers stay thin: extract, validate, call the session
//! engine or tutor, map the result.

pub mod admin_api;
pub mod config_api;
pub mod conversation_api;
pub mod math_api;
pub mod models_api;
pub mod query_api;
pub mod search_api;
pub mod speech_api;
pub mod stream_api;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::error::TutorError;
use crate::metrics;

pub use admin_api::{health, metrics_text, version};
pub use config_api::{
    add_catalog_model, add_endpoint, delete_catalog_model, delete_endpoint, get_defaults, list_catalog_models,
    list_endpoints, reload_config, set_defaults, update_catalog_model, update_endpoint,
};
pub use conversation_api::{
    append_turn, create_conversation, delete_conversation, end_conversation, get_archived_transcript,
    list_archived,
};
pub use math_api::{
    ask_question, explain_concept, list_concepts, list_domains, list_math_conversations, search_concepts,
    solve_image, solve_problem, tutor_status,
};
pub use models_api::{list_models, select_models, selected_models};
pub use query_api::smart_query;
pub use search_api::search_conversations;
pub use speech_api::pronounce;
pub use stream_api::stream_turn;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn status_for(err: &TutorError) -> StatusCode {
    match err {
        TutorError::NotFound(_) => StatusCode::NOT_FOUND,
        TutorError::Validation(_) => StatusCode::BAD_REQUEST,
        TutorError::Upstream(_) => StatusCode::BAD_GATEWAY,
        TutorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TutorError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Count the request under `route` with the status it will be answered with.
pub(crate) fn track<T>(route: &str, result: Result<T, TutorError>) -> Result<T, TutorError> {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    metrics::inc_request(route, status.as_str());
    result
}

pub(crate) fn validate_input<T: Validate>(input: &T) -> Result<(), TutorError> {
    input
        .validate()
        .map_err(|e| TutorError::Validation(e.to_string().replace('\n', "; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_map_to_distinct_statuses() {
        assert_eq!(status_for(&TutorError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&TutorError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&TutorError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&TutorError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_has_json_body() {
        let response = TutorError::NotFound("Session abc not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
