use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::speech::{PronounceRequest, AUDIO_CONTENT_TYPE};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PronounceParams {
    #[validate(length(min = 1, max = 4096))]
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<String>,
    pub model: Option<String>,
}

/// GET /api/v1/pronounce
pub async fn pronounce(
    State(state): State<AppState>,
    Query(params): Query<PronounceParams>,
) -> Result<Response, TutorError> {
    info!("Pronounce request ({} chars)", params.text.chars().count());
    let result = match validate_input(&params) {
        Ok(()) => {
            let request = PronounceRequest {
                text: params.text,
                voice: params.voice,
                speed: params.speed,
                model: params.model,
            };
            state.speech.pronounce(&request).await
        }
        Err(e) => Err(e),
    };
    let audio = track("GET /api/v1/pronounce", result)?;
    Ok(([(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)], audio).into_response())
}
