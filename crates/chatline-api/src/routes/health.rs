use axum::{extract::State, Json};
use chatline_core::TitleQueueStats;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: HashMap<String, String>,
    pub live_sessions: usize,
    #[schema(value_type = Object)]
    pub titles: TitleQueueStats,
}

/// Health check endpoint
///
/// Returns the health status of the API and its dependencies
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut services = HashMap::new();

    // A one-row listing doubles as a connectivity probe
    let database = match state.persist.list_sessions(0, Some(1), Some(1)).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "database health probe failed");
            "disconnected"
        }
    };
    services.insert("database".to_string(), database.to_string());

    let cache = if state.sessions.cache().is_available().await {
        "available"
    } else {
        "unavailable"
    };
    services.insert("cache".to_string(), cache.to_string());

    let status = if database == "connected" { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
        live_sessions: state.sessions.live_sessions().await,
        titles: state.titles.stats(),
    })
}
