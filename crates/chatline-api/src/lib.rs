pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    config::Config,
    handlers::stream,
    routes::{api_configs, chat, health, sessions, share},
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        api_configs::create_api_config,
        chat::send_message,
        stream::send_message_stream,
        stream::recover_stream,
        sessions::list_sessions,
        sessions::list_messages,
        sessions::update_session,
        sessions::delete_session,
        share::create_link,
        share::list_links,
        share::access_link,
        share::link_info,
        share::validate_link,
        share::update_link,
        share::delete_link,
    ),
    components(schemas(
        health::HealthResponse,
        api_configs::ApiConfigResponse,
        chat::SendMessageResponse,
        stream::RecoverResponse,
        share::CreateShareRequest,
        share::ValidateResponse,
    )),
    tags(
        (name = "health", description = "Service status"),
        (name = "api-configs", description = "Upstream credentials"),
        (name = "chat", description = "Sending messages"),
        (name = "sessions", description = "Conversation history"),
        (name = "share", description = "Public links to transcripts"),
    )
)]
pub struct ApiDoc;

pub fn build_router(state: Arc<AppState>) -> Router {
    let chat_routes = Router::new()
        .route("/message", post(chat::send_message))
        .route("/message/stream", post(stream::send_message_stream))
        .route("/stream/recover", get(stream::recover_stream))
        .route("/sessions", get(sessions::list_sessions))
        .route(
            "/sessions/:session_id",
            axum::routing::patch(sessions::update_session).delete(sessions::delete_session),
        )
        .route("/sessions/:session_id/messages", get(sessions::list_messages));

    let share_routes = Router::new()
        .route("/", post(share::create_link).get(share::list_links))
        .route(
            "/:share_id",
            get(share::access_link)
                .patch(share::update_link)
                .delete(share::delete_link),
        )
        .route("/:share_id/info", get(share::link_info))
        .route("/:share_id/validate", get(share::validate_link));

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs.max(1));

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/api/api-configs", post(api_configs::create_api_config))
        .nest("/api/chat", chat_routes)
        .nest("/api/share", share_routes)
        .layer(axum::middleware::from_fn(middleware::logging::log_request))
        .layer(TimeoutLayer::new(request_timeout));

    // Without a CORS layer browsers only allow same-origin calls
    if let Some(cors) = build_cors_layer(&state.config) {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn build_cors_layer(config: &Config) -> Option<CorsLayer> {
    if !config.cors.enabled {
        return None;
    }

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.cors.origins.iter().any(|o| o == "*") {
        return Some(cors.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = config
        .cors
        .origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    Some(cors.allow_origin(origins))
}
