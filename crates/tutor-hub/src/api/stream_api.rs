//! Streaming turn endpoint.
//!
//! Flow: client POST → session checkout (user message committed) → provider stream → SSE back.
//! Events: `delta` carries a text fragment, `done` the committed reply as JSON,
//! `error` a failure message after which nothing more is sent.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{error, info};

use crate::api::conversation_api::TurnParams;
use crate::api::{track, validate_input};
use crate::error::TutorError;
use crate::session_engine::TurnEvent;
use crate::shared_state::AppState;

fn to_sse(event: TurnEvent) -> Event {
    match event {
        TurnEvent::Delta(text) => Event::default().event("delta").data(text.replace('\r', "")),
        TurnEvent::Completed(reply) => Event::default().event("done").json_data(&reply).unwrap_or_else(|e| {
            error!("Failed to encode completed reply: {}", e);
            Event::default().event("error").data("reply could not be encoded")
        }),
        TurnEvent::Failed(message) => Event::default().event("error").data(message.replace('\r', "")),
    }
}

/// POST /api/v1/conversation/:sid/stream
pub async fn stream_turn(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Query(params): Query<TurnParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, TutorError> {
    info!("Streaming turn for session {}", sid);
    let result = match validate_input(&params) {
        Ok(()) => state.sessions.stream_turn(&sid, &params.user).await,
        Err(e) => Err(e),
    };
    let events = track("POST /api/v1/conversation/:sid/stream", result)?;
    Ok(Sse::new(events.map(|event| Ok(to_sse(event)))).keep_alive(KeepAlive::default()))
}
