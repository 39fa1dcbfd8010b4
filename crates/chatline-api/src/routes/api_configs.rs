use axum::{extract::State, http::StatusCode, Json};
use chatline_persist::NewApiConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{error::ApiResult, middleware::identity::UserId, state::AppState};

/// Stored configuration without its secret
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfigResponse {
    pub id: i64,
    pub api_name: String,
    pub model_name: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
}

/// Register upstream credentials for a model
#[utoipa::path(
    post,
    path = "/api/api-configs",
    responses(
        (status = 201, description = "Configuration stored", body = ApiConfigResponse),
        (status = 409, description = "A configuration with this name already exists")
    ),
    tag = "api-configs"
)]
pub async fn create_api_config(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<NewApiConfig>,
) -> ApiResult<(StatusCode, Json<ApiConfigResponse>)> {
    let config = state.persist.create_api_config(user_id, req).await?;
    tracing::info!(user_id, api_name = %config.api_name, model = %config.model_name, "API configuration created");

    Ok((
        StatusCode::CREATED,
        Json(ApiConfigResponse {
            id: config.id,
            api_name: config.api_name,
            model_name: config.model_name,
            base_url: config.base_url,
            created_at: config.created_at,
        }),
    ))
}
