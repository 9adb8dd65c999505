//! Conversation search over the index (title/topic substring, exact level).

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use crate::api::{track, validate_input};
use crate::conversation_db::{SearchHit, SearchQuery, DEFAULT_SEARCH_LIMIT};
use crate::error::TutorError;
use crate::shared_state::AppState;

pub const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SearchParams {
    #[validate(length(max = 200))]
    pub query: Option<String>,
    #[validate(length(max = 200))]
    pub topic: Option<String>,
    #[validate(length(max = 8))]
    pub level: Option<String>,
    #[validate(range(max = 100))]
    pub limit: Option<usize>,
    pub feature: Option<String>,
}

impl From<SearchParams> for SearchQuery {
    fn from(params: SearchParams) -> Self {
        SearchQuery {
            query: params.query,
            topic: params.topic,
            level: params.level,
            limit: params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT),
            feature: params.feature,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
}

/// GET /api/v1/conversations/search
pub async fn search_conversations(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, TutorError> {
    info!(
        "Search request: query={:?}, topic={:?}, level={:?}, feature={:?}, limit={:?}",
        params.query, params.topic, params.level, params.feature, params.limit
    );
    let result = match validate_input(&params) {
        Ok(()) => state.sessions.search(&SearchQuery::from(params)).await.map(|results| {
            debug!("Search returned {} results", results.len());
            SearchResponse { total: results.len(), results }
        }),
        Err(e) => Err(e),
    };
    track("GET /api/v1/conversations/search", result).map(Json)
}
