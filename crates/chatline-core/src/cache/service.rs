use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatline_llm::Message;
use chatline_persist::{DBMessage, NewMessage, PersistError, Session, UserApiConfig};
use serde::{Deserialize, Serialize};

use super::backend::{CacheBackend, CacheError, UnavailableCache};
use crate::error::{ChatError, Result};

pub const FULL_SESSION_PREFIX: &str = "full_session:";
pub const STREAM_RESPONSE_PREFIX: &str = "stream_response:";
pub const MODEL_CONFIG_PREFIX: &str = "model:";

/// Everything needed to rebuild a conversation engine without the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSession {
    pub session: Session,
    pub messages: Vec<Message>,
    pub api_key: String,
    pub base_url: String,
}

impl CachedSession {
    pub fn is_usable(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub session_ttl: Duration,
    pub stream_ttl: Duration,
    pub model_ttl: Duration,
    /// Base delay of the linear backoff in [`CacheService::save_with_retry`]
    pub retry_backoff: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(3600),
            stream_ttl: Duration::from_secs(600),
            model_ttl: Duration::from_secs(86_400),
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Durable append path used by [`CacheService::save_with_retry`]
#[async_trait]
pub trait MessageWriter: Send + Sync {
    async fn write_message(&self, message: NewMessage) -> chatline_persist::Result<DBMessage>;
}

/// Region-aware adapter over a [`CacheBackend`]
///
/// Writes against an unreachable backend succeed as no-ops; reads report
/// [`CacheError::Unavailable`] so callers can tell degradation from a miss.
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    settings: CacheSettings,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        Self { backend, settings }
    }

    /// Service with no backing store, every read degrades
    pub fn disabled(settings: CacheSettings) -> Self {
        Self::new(Arc::new(UnavailableCache), settings)
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    async fn read(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        if !self.backend.is_available().await {
            return Err(CacheError::Unavailable);
        }
        self.backend.get(key).await
    }

    // ------------------------------------------------------------------
    // Full-session snapshot
    // ------------------------------------------------------------------

    pub async fn cache_full_session(
        &self,
        session_id: &str,
        snapshot: &CachedSession,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError> {
        if !self.backend.is_available().await {
            tracing::debug!(session_id = %session_id, "cache unavailable, skipping session snapshot");
            return Ok(());
        }
        let data = serde_json::to_string(snapshot)?;
        self.backend
            .set(&format!("{}{}", FULL_SESSION_PREFIX, session_id), &data, ttl)
            .await
    }

    pub async fn get_full_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<Option<CachedSession>, CacheError> {
        let key = format!("{}{}", FULL_SESSION_PREFIX, session_id);
        match self.read(&key).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_full_session(&self, session_id: &str) -> std::result::Result<(), CacheError> {
        if !self.backend.is_available().await {
            return Ok(());
        }
        self.backend
            .delete(&format!("{}{}", FULL_SESSION_PREFIX, session_id))
            .await
    }

    // ------------------------------------------------------------------
    // Stream buffer
    // ------------------------------------------------------------------

    pub async fn append_stream(&self, session_id: &str, chunk: &str) -> std::result::Result<(), CacheError> {
        if chunk.is_empty() || !self.backend.is_available().await {
            return Ok(());
        }
        self.backend
            .append(
                &format!("{}{}", STREAM_RESPONSE_PREFIX, session_id),
                chunk,
                self.settings.stream_ttl,
            )
            .await
    }

    /// Text streamed so far for the session's in-flight reply
    pub async fn get_stream(&self, session_id: &str) -> std::result::Result<Option<String>, CacheError> {
        self.read(&format!("{}{}", STREAM_RESPONSE_PREFIX, session_id))
            .await
    }

    pub async fn delete_stream(&self, session_id: &str) -> std::result::Result<(), CacheError> {
        if !self.backend.is_available().await {
            return Ok(());
        }
        self.backend
            .delete(&format!("{}{}", STREAM_RESPONSE_PREFIX, session_id))
            .await
    }

    // ------------------------------------------------------------------
    // Model config
    // ------------------------------------------------------------------

    fn model_key(user_id: i64, model_name: &str) -> String {
        format!("{}{}:{}", MODEL_CONFIG_PREFIX, user_id, model_name)
    }

    pub async fn cache_model_config(&self, config: &UserApiConfig) -> std::result::Result<(), CacheError> {
        if !self.backend.is_available().await {
            return Ok(());
        }
        let data = serde_json::to_string(config)?;
        self.backend
            .set(
                &Self::model_key(config.user_id, &config.model_name),
                &data,
                self.settings.model_ttl,
            )
            .await
    }

    pub async fn get_model_config(
        &self,
        user_id: i64,
        model_name: &str,
    ) -> std::result::Result<Option<UserApiConfig>, CacheError> {
        match self.read(&Self::model_key(user_id, model_name)).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Persistence with retry
    // ------------------------------------------------------------------

    /// Persist a message, retrying failed attempts with linearly growing delays
    ///
    /// Errors caused by the message itself (validation, missing session) are
    /// not retried. Backoff sleeps run on the caller's task.
    pub async fn save_with_retry<W>(
        &self,
        writer: &W,
        message: NewMessage,
        max_attempts: u32,
    ) -> Result<DBMessage>
    where
        W: MessageWriter + ?Sized,
    {
        let max_attempts = max_attempts.max(1);
        let mut last_error: Option<PersistError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.settings.retry_backoff * (attempt - 1);
                tracing::debug!(
                    session_id = %message.session_id,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying message save"
                );
                tokio::time::sleep(delay).await;
            }

            match writer.write_message(message.clone()).await {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_client_error() => {
                    return Err(ChatError::Persistence {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %message.session_id,
                        attempt,
                        error = %e,
                        "message save failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(ChatError::Persistence {
            attempts: max_attempts,
            source: last_error
                .unwrap_or_else(|| PersistError::Internal("no save attempt was made".into())),
        })
    }
}
