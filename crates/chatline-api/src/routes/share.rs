use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chatline_persist::{SharedAccess, SharedLink, SharedLinkPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{error::ApiResult, middleware::identity::UserId, state::AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShareRequest {
    pub session_id: String,
    /// Omitted or -1 for unlimited views
    pub max_views: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
}

/// Share one of the caller's sessions
#[utoipa::path(
    post,
    path = "/api/share",
    request_body = CreateShareRequest,
    responses(
        (status = 201, description = "Link created"),
        (status = 404, description = "Session not found or not owned by the caller")
    ),
    tag = "share"
)]
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<CreateShareRequest>,
) -> ApiResult<(StatusCode, Json<SharedLink>)> {
    let link = state
        .shares
        .create(&req.session_id, user_id, req.max_views, req.expires_at)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// The caller's links, newest first
#[utoipa::path(
    get,
    path = "/api/share",
    responses((status = 200, description = "Links created by the caller")),
    tag = "share"
)]
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Vec<SharedLink>>> {
    Ok(Json(state.shares.list(user_id).await?))
}

/// Open a shared transcript; counts one view
#[utoipa::path(
    get,
    path = "/api/share/{share_id}",
    params(("share_id" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Session, messages and link"),
        (status = 403, description = "Link is private"),
        (status = 404, description = "Link not found"),
        (status = 410, description = "Link expired"),
        (status = 429, description = "View limit reached")
    ),
    tag = "share"
)]
pub async fn access_link(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> ApiResult<Json<SharedAccess>> {
    Ok(Json(state.shares.access(&share_id).await?))
}

/// Link metadata without counting a view
#[utoipa::path(
    get,
    path = "/api/share/{share_id}/info",
    params(("share_id" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Link metadata"),
        (status = 404, description = "Link not found")
    ),
    tag = "share"
)]
pub async fn link_info(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> ApiResult<Json<SharedLink>> {
    Ok(Json(state.shares.info(&share_id).await?))
}

/// Whether the link would currently admit a view
#[utoipa::path(
    get,
    path = "/api/share/{share_id}/validate",
    params(("share_id" = String, Path, description = "Share token")),
    responses((status = 200, description = "Validity", body = ValidateResponse)),
    tag = "share"
)]
pub async fn validate_link(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> ApiResult<Json<ValidateResponse>> {
    let valid = state.shares.validate(&share_id).await?;
    Ok(Json(ValidateResponse { valid }))
}

/// Change a link's visibility, view limit or expiry
#[utoipa::path(
    patch,
    path = "/api/share/{share_id}",
    params(("share_id" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Updated link"),
        (status = 404, description = "Link not found or not owned by the caller")
    ),
    tag = "share"
)]
pub async fn update_link(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(share_id): Path<String>,
    Json(patch): Json<SharedLinkPatch>,
) -> ApiResult<Json<SharedLink>> {
    Ok(Json(state.shares.update(&share_id, user_id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/api/share/{share_id}",
    params(("share_id" = String, Path, description = "Share token")),
    responses(
        (status = 204, description = "Link deleted"),
        (status = 404, description = "Link not found or not owned by the caller")
    ),
    tag = "share"
)]
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(share_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.shares.delete(&share_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
