//! Conversation lifecycle endpoints: start, continue, end, delete and archive reads.
//!
//! Inputs arrive as query parameters, matching the routes the web client calls.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::metrics;
use crate::session_engine::{ArchiveSummary, CreateSession, CreatedSession, DeleteOutcome, Transcript, TurnReply};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct StartConversationParams {
    #[validate(length(min = 1, max = 200))]
    pub topic: String,
    #[validate(length(min = 1, max = 8))]
    pub level: String,
    pub model: Option<String>,
    #[validate(length(max = 200))]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TurnParams {
    #[validate(length(min = 1, max = 4000))]
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct ArchivesResponse {
    pub archives: Vec<ArchiveSummary>,
}

/// POST /api/v1/conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Query(params): Query<StartConversationParams>,
) -> Result<Json<CreatedSession>, TutorError> {
    info!("Starting conversation: topic='{}', level={}", params.topic, params.level);
    let result = match validate_input(&params) {
        Ok(()) => {
            state
                .sessions
                .create(CreateSession {
                    topic: params.topic,
                    level: params.level,
                    model: params.model,
                    title: params.title,
                })
                .await
        }
        Err(e) => Err(e),
    };
    track("POST /api/v1/conversation", result).map(Json)
}

/// POST /api/v1/conversation/:sid
pub async fn append_turn(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Query(params): Query<TurnParams>,
) -> Result<Json<TurnReply>, TutorError> {
    info!("Next turn for session {}", sid);
    let result = match validate_input(&params) {
        Ok(()) => state.sessions.append_turn(&sid, &params.user).await,
        Err(e) => Err(e),
    };
    track("POST /api/v1/conversation/:sid", result).map(Json)
}

/// DELETE /api/v1/conversation/:sid
pub async fn end_conversation(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Transcript>, TutorError> {
    info!("Ending session {}", sid);
    track("DELETE /api/v1/conversation/:sid", state.sessions.end(&sid).await).map(Json)
}

/// DELETE /api/v1/conversations/:sid
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<DeleteOutcome>, TutorError> {
    info!("Deleting session {}", sid);
    track("DELETE /api/v1/conversations/:sid", state.sessions.delete(&sid).await).map(Json)
}

/// GET /api/v1/conversations/archived
pub async fn list_archived(State(state): State<AppState>) -> Json<ArchivesResponse> {
    metrics::inc_request("GET /api/v1/conversations/archived", "200");
    Json(ArchivesResponse { archives: state.sessions.list_archives() })
}

/// GET /api/v1/conversations/archived/:sid
pub async fn get_archived_transcript(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Transcript>, TutorError> {
    track("GET /api/v1/conversations/archived/:sid", state.sessions.transcript(&sid).await).map(Json)
}
