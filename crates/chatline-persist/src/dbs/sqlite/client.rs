use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::dbs::sqlite::repositories::{
    SqliteApiConfigRepository, SqliteMessageRepository, SqliteSessionRepository,
    SqliteSharedLinkRepository,
};
use crate::dbs::sqlite::schema;
use crate::error::{PersistError, Result};
use crate::models::{
    DBMessage, MessagePage, NewApiConfig, NewMessage, Session, SessionPage, SessionPatch,
    SharedAccess, SharedLink, SharedLinkPatch, UserApiConfig,
};
use crate::trait_client::PersistenceClient;

/// SQLite-backed [`PersistenceClient`]
#[derive(Clone)]
pub struct SqlitePersistenceClient {
    pool: SqlitePool,
    sessions: SqliteSessionRepository,
    messages: SqliteMessageRepository,
    api_configs: SqliteApiConfigRepository,
    shared_links: SqliteSharedLinkRepository,
}

impl SqlitePersistenceClient {
    /// Connect to SQLite, creating the database file if needed, and run migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single long-lived connection
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool
    /// must never open a second one or recycle the first.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::migrate(&pool).await?;

        Ok(Self {
            sessions: SqliteSessionRepository::new(pool.clone()),
            messages: SqliteMessageRepository::new(pool.clone()),
            api_configs: SqliteApiConfigRepository::new(pool.clone()),
            shared_links: SqliteSharedLinkRepository::new(pool.clone()),
            pool,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap liveness probe for health checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceClient for SqlitePersistenceClient {
    async fn find_or_create_session(
        &self,
        session_id: &str,
        user_id: i64,
        model_name: &str,
    ) -> Result<Session> {
        self.sessions.find_or_create(session_id, user_id, model_name).await
    }

    async fn get_session(&self, session_id: &str, user_id: i64) -> Result<Option<Session>> {
        self.sessions.get(session_id, user_id).await
    }

    async fn list_sessions(
        &self,
        user_id: i64,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<SessionPage> {
        self.sessions.list(user_id, page, page_size).await
    }

    async fn update_session(
        &self,
        session_id: &str,
        user_id: i64,
        patch: SessionPatch,
    ) -> Result<Session> {
        self.sessions.update(session_id, user_id, patch).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.delete_cascade(session_id).await
    }

    async fn save_message(&self, message: NewMessage) -> Result<DBMessage> {
        self.messages.save(message).await
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<DBMessage>> {
        self.messages.list(session_id).await
    }

    async fn get_messages_page(
        &self,
        session_id: &str,
        before_order: Option<i64>,
        limit: Option<i64>,
    ) -> Result<MessagePage> {
        self.messages.page(session_id, before_order, limit).await
    }

    async fn create_api_config(&self, user_id: i64, config: NewApiConfig) -> Result<UserApiConfig> {
        self.api_configs.create(user_id, config).await
    }

    async fn get_api_config(&self, user_id: i64, model_name: &str) -> Result<UserApiConfig> {
        self.api_configs.find_by_model(user_id, model_name).await
    }

    async fn create_shared_link(
        &self,
        session_id: &str,
        created_by: i64,
        max_views: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SharedLink> {
        self.shared_links
            .create(session_id, created_by, max_views, expires_at)
            .await
    }

    async fn get_shared_link(&self, share_id: &str) -> Result<Option<SharedLink>> {
        self.shared_links.get(share_id).await
    }

    async fn list_shared_links(&self, created_by: i64) -> Result<Vec<SharedLink>> {
        self.shared_links.list_by_creator(created_by).await
    }

    async fn update_shared_link(
        &self,
        share_id: &str,
        user_id: i64,
        patch: SharedLinkPatch,
    ) -> Result<SharedLink> {
        self.shared_links.update(share_id, user_id, patch).await
    }

    async fn delete_shared_link(&self, share_id: &str, user_id: i64) -> Result<()> {
        self.shared_links.delete(share_id, user_id).await
    }

    async fn access_shared_link(&self, share_id: &str) -> Result<SharedAccess> {
        self.shared_links.access(share_id).await
    }
}
