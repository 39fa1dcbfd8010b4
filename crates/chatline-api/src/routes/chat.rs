use axum::{extract::State, Json};
use chatline_core::SendRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{error::ApiResult, middleware::identity::UserId, state::AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendMessageResponse {
    pub response: String,
}

/// Send a message and wait for the whole reply
#[utoipa::path(
    post,
    path = "/api/chat/message",
    responses(
        (status = 200, description = "Model reply", body = SendMessageResponse),
        (status = 404, description = "No API configuration for the model"),
        (status = 502, description = "Upstream model failed")
    ),
    tag = "chat"
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(mut req): Json<SendRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    req.user_id = user_id;
    let response = state.pipeline.send(req).await?;
    Ok(Json(SendMessageResponse { response }))
}
