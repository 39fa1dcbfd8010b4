use std::sync::Arc;

use chatline_core::{
    CacheService, ChatPipeline, MemoryCache, PersonaCatalog, RedisCache, SessionManager,
    ShareService, TitleQueue,
};
use chatline_llm::ClientFactory;
use chatline_persist::PersistenceClient;

use crate::config::{CacheConfig, Config};

/// Shared application state passed to all handlers
///
/// Every service is built once here and shared through `Arc`s.
/// Must be constructed inside a tokio runtime (the title queue spawns its dispatcher).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: Arc<dyn PersistenceClient>,
    pub sessions: Arc<SessionManager>,
    pub pipeline: Arc<ChatPipeline>,
    pub shares: Arc<ShareService>,
    pub titles: TitleQueue,
}

impl AppState {
    pub fn new(
        config: Config,
        persist: Arc<dyn PersistenceClient>,
        cache: Arc<CacheService>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        let personas = Arc::new(PersonaCatalog::new(
            config.personas.clone(),
            config.chat.default_persona.clone(),
        ));
        let titles = TitleQueue::spawn(
            Arc::clone(&persist),
            config.titles.workers,
            config.titles.queue_size,
        );
        let sessions = Arc::new(
            SessionManager::new(
                Arc::clone(&persist),
                cache,
                clients,
                personas,
                config.chat.max_history,
            )
            .with_title_queue(titles.clone()),
        );
        let pipeline = Arc::new(ChatPipeline::new(Arc::clone(&sessions), config.pipeline()));
        let shares = Arc::new(ShareService::new(Arc::clone(&persist)));

        Self {
            config: Arc::new(config),
            persist,
            sessions,
            pipeline,
            shares,
            titles,
        }
    }
}

/// Pick the cache backend: Redis when a URL is configured, process memory
/// otherwise. An unreachable Redis at startup leaves the cache disabled.
pub async fn build_cache(config: &CacheConfig) -> CacheService {
    let settings = config.settings();
    if !config.enabled {
        tracing::warn!("Cache disabled, every request will read from the database");
        return CacheService::disabled(settings);
    }

    let Some(url) = config.url.as_deref() else {
        tracing::info!("Using in-process cache");
        return CacheService::new(Arc::new(MemoryCache::new()), settings);
    };

    match RedisCache::connect(url).await {
        Ok(redis) => CacheService::new(Arc::new(redis), settings),
        Err(e) => {
            tracing::error!(error = %e, "Redis cache unreachable, continuing without cache");
            CacheService::disabled(settings)
        }
    }
}
