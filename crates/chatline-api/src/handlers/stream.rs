use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    Json,
};
use chatline_core::{SendRequest, StreamUnit};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{ApiError, ApiResult},
    middleware::identity::UserId,
    state::AppState,
};

/// SSE comment text used for keep-alives
pub const HEARTBEAT_COMMENT: &str = "heartbeat";

fn to_event(unit: StreamUnit) -> Event {
    match unit.payload() {
        Some(payload) => Event::default().data(payload.to_string()),
        None => Event::default().comment(HEARTBEAT_COMMENT),
    }
}

/// Send a message and stream the reply using Server-Sent Events
///
/// Each `data:` line carries `{"content", "done"}`; a terminal failure carries
/// `{"error", "done": true}` instead.
#[utoipa::path(
    post,
    path = "/api/chat/message/stream",
    responses(
        (status = 200, description = "Streaming response", content_type = "text/event-stream"),
        (status = 400, description = "Missing caller identity or empty message"),
        (status = 404, description = "No API configuration for the model")
    ),
    tag = "chat"
)]
pub async fn send_message_stream(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(mut req): Json<SendRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    req.user_id = user_id;
    tracing::info!(session_id = %req.session_id, user_id, model = %req.model_name, "stream requested");

    let receiver = state.pipeline.start(req).await?;
    let sse_stream = ReceiverStream::new(receiver).map(|unit| Ok::<Event, Infallible>(to_event(unit)));

    Ok(Sse::new(sse_stream))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecoverQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecoverResponse {
    pub cached_response: String,
}

/// Re-fetch the text streamed so far after a dropped connection
#[utoipa::path(
    get,
    path = "/api/chat/stream/recover",
    params(RecoverQuery),
    responses(
        (status = 200, description = "Partial reply", body = RecoverResponse),
        (status = 404, description = "Nothing buffered for the session")
    ),
    tag = "chat"
)]
pub async fn recover_stream(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Query(query): Query<RecoverQuery>,
) -> ApiResult<Json<RecoverResponse>> {
    state
        .persist
        .get_session(&query.session_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", query.session_id)))?;

    let cached_response = state
        .pipeline
        .recover(&query.session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("no buffered response".into()))?;

    Ok(Json(RecoverResponse { cached_response }))
}

