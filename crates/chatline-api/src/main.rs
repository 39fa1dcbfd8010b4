use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatline_api::{
    build_router,
    config::Config,
    state::{build_cache, AppState},
};
use chatline_llm::OpenAIClientFactory;
use chatline_persist::SqlitePersistenceClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting Chatline API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    tracing::info!("Connecting to database");
    let persist = SqlitePersistenceClient::connect(
        &config.database_url,
        config.database.max_connections,
        Duration::from_millis(config.database.acquire_timeout_ms),
    )
    .await?;
    tracing::info!("Database ready");

    let cache = build_cache(&config.cache).await;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        Arc::new(persist),
        Arc::new(cache),
        Arc::new(OpenAIClientFactory),
    ));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("OpenAPI document: http://{}/api/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
