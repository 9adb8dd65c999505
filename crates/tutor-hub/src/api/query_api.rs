//! Smart English query endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::shared_state::AppState;
use crate::smart_query::{QueryResult, SmartQuery};

#[derive(Debug, Deserialize, Validate)]
pub struct QueryParams {
    #[validate(length(min = 1, max = 500))]
    pub q: String,
    #[validate(length(max = 8))]
    pub level: Option<String>,
    #[validate(length(max = 100))]
    pub model: Option<String>,
}

/// GET /api/v1/query
pub async fn smart_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResult>, TutorError> {
    info!("Smart query: {:?} (level {:?})", params.q, params.level);
    let result = match validate_input(&params) {
        Ok(()) => {
            state
                .query
                .query(SmartQuery { q: params.q, level: params.level, model: params.model })
                .await
        }
        Err(e) => Err(e),
    };
    track("GET /api/v1/query", result).map(Json)
}
