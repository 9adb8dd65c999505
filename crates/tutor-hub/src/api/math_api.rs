//! Math tutor endpoints. Problem, question and concept inputs arrive as JSON
//! bodies; image uploads carry the raw image as the body.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use validator::Validate;

use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::math_tutor::{
    knowledge, ConceptExplanation, ConceptRequest, ConceptSearch, DomainList, ImageProblem, MathConversation,
    MathProblem, QuestionAnswer, QuestionRequest, SolvedProblem, TutorStatus,
};
use crate::metrics;
use crate::shared_state::AppState;

/// Largest accepted image upload.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize, Validate)]
pub struct ConceptSearchParams {
    #[validate(length(min = 1, max = 100))]
    pub keyword: String,
}

#[derive(Debug, Serialize)]
pub struct ConceptsResponse {
    pub concepts: BTreeMap<&'static str, Vec<String>>,
}

/// GET /api/v1/math/conversations
pub async fn list_math_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<MathConversation>>, TutorError> {
    track("GET /api/v1/math/conversations", state.math.list_conversations().await).map(Json)
}

/// POST /api/v1/math/solve
pub async fn solve_problem(
    State(state): State<AppState>,
    Json(problem): Json<MathProblem>,
) -> Result<Json<SolvedProblem>, TutorError> {
    info!("Solving math problem (session: {:?})", problem.session_id);
    track("POST /api/v1/math/solve", state.math.solve(problem).await).map(Json)
}

/// POST /api/v1/math/solve-image
pub async fn solve_image(
    State(state): State<AppState>,
    Query(params): Query<ImageProblem>,
    headers: HeaderMap,
    image: Bytes,
) -> Result<Json<SolvedProblem>, TutorError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    info!("Solving math image ({} bytes, {})", image.len(), content_type);
    let result = state.math.solve_image(&image, content_type, params).await;
    track("POST /api/v1/math/solve-image", result).map(Json)
}

/// POST /api/v1/math/concept
pub async fn explain_concept(
    State(state): State<AppState>,
    Json(request): Json<ConceptRequest>,
) -> Result<Json<ConceptExplanation>, TutorError> {
    track("POST /api/v1/math/concept", state.math.concept(request).await).map(Json)
}

/// POST /api/v1/math/question
pub async fn ask_question(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QuestionAnswer>, TutorError> {
    info!("Follow-up question for math session {}", request.session_id);
    track("POST /api/v1/math/question", state.math.question(request).await).map(Json)
}

/// GET /api/v1/math/concepts
pub async fn list_concepts() -> Json<ConceptsResponse> {
    metrics::inc_request("GET /api/v1/math/concepts", "200");
    Json(ConceptsResponse { concepts: knowledge::available_concepts() })
}

/// GET /api/v1/math/concepts/search
pub async fn search_concepts(
    State(state): State<AppState>,
    Query(params): Query<ConceptSearchParams>,
) -> Result<Json<ConceptSearch>, TutorError> {
    let result = validate_input(&params).and_then(|()| state.math.search_concepts(&params.keyword));
    track("GET /api/v1/math/concepts/search", result).map(Json)
}

/// GET /api/v1/math/domains
pub async fn list_domains() -> Json<DomainList> {
    metrics::inc_request("GET /api/v1/math/domains", "200");
    Json(DomainList::all())
}

/// GET /api/v1/math/status
pub async fn tutor_status(State(state): State<AppState>) -> Result<Json<TutorStatus>, TutorError> {
    track("GET /api/v1/math/status", state.math.status().await).map(Json)
}
