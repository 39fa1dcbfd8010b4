use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chatline_persist::{MessagePage, Session, SessionPage, SessionPatch};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    error::{ApiError, ApiResult},
    middleware::identity::UserId,
    state::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListSessionsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListMessagesQuery {
    /// Only messages with a lower order value
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

async fn owned_session(state: &AppState, session_id: &str, user_id: i64) -> ApiResult<Session> {
    state
        .persist
        .get_session(session_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))
}

/// List the caller's sessions, most recently active first
#[utoipa::path(
    get,
    path = "/api/chat/sessions",
    params(ListSessionsQuery),
    responses((status = 200, description = "One page of sessions")),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<SessionPage>> {
    let page = state
        .persist
        .list_sessions(user_id, query.page, query.page_size)
        .await?;
    Ok(Json(page))
}

/// Page backwards through a session's history
#[utoipa::path(
    get,
    path = "/api/chat/sessions/{session_id}/messages",
    params(
        ("session_id" = String, Path, description = "Session identifier"),
        ListMessagesQuery
    ),
    responses(
        (status = 200, description = "Messages, oldest first"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(session_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<MessagePage>> {
    owned_session(&state, &session_id, user_id).await?;
    let page = state
        .persist
        .get_messages_page(&session_id, query.before, query.limit)
        .await?;
    Ok(Json(page))
}

/// Rename a session or switch its persona
#[utoipa::path(
    patch,
    path = "/api/chat/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Updated session"),
        (status = 400, description = "Empty or invalid patch"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(session_id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> ApiResult<Json<Session>> {
    let persona = patch.persona_name.clone();
    let session = state
        .persist
        .update_session(&session_id, user_id, patch)
        .await?;

    if let (Some(persona), Some(engine)) = (persona, state.sessions.get(&session_id).await) {
        if let Some(prompt) = state.sessions.personas().content(&persona) {
            engine.lock().await.set_system_prompt(prompt);
        }
    }

    Ok(Json(session))
}

/// Delete a session with its messages and shared links
#[utoipa::path(
    delete,
    path = "/api/chat/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_session(&state, &session_id, user_id).await?;
    state.sessions.delete(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
