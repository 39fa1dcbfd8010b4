use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatline_llm::{ClientFactory, Message, OpenAIConfig, Role};
use chatline_persist::{
    DBMessage, NewMessage, PersistenceClient, Session, SessionPatch, UserApiConfig,
};
use tokio::sync::{Mutex, RwLock};

use crate::cache::{CacheError, CacheService, CachedSession, MessageWriter};
use crate::engine::ConversationEngine;
use crate::error::{ChatError, Result};
use crate::persona::PersonaCatalog;
use crate::title::{TitleJob, TitleQueue};

/// Shared handle to a live engine; holding the lock serializes sends
pub type EngineHandle = Arc<Mutex<ConversationEngine>>;

struct LiveSession {
    user_id: i64,
    engine: EngineHandle,
}

/// Owner of the live engine table
///
/// Resolves sessions through memory, then the cached snapshot, then the
/// durable store. Registration happens under the table's write lock so a
/// session is never reconstructed twice.
pub struct SessionManager {
    engines: RwLock<HashMap<String, LiveSession>>,
    persist: Arc<dyn PersistenceClient>,
    cache: Arc<CacheService>,
    clients: Arc<dyn ClientFactory>,
    personas: Arc<PersonaCatalog>,
    titles: Option<TitleQueue>,
    max_history: usize,
}

impl SessionManager {
    pub fn new(
        persist: Arc<dyn PersistenceClient>,
        cache: Arc<CacheService>,
        clients: Arc<dyn ClientFactory>,
        personas: Arc<PersonaCatalog>,
        max_history: usize,
    ) -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            persist,
            cache,
            clients,
            personas,
            titles: None,
            max_history,
        }
    }

    pub fn with_title_queue(mut self, titles: TitleQueue) -> Self {
        self.titles = Some(titles);
        self
    }

    pub fn persist(&self) -> &Arc<dyn PersistenceClient> {
        &self.persist
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub fn personas(&self) -> &PersonaCatalog {
        &self.personas
    }

    pub async fn live_sessions(&self) -> usize {
        self.engines.read().await.len()
    }

    /// Live engine for `session_id`, if one is registered
    pub async fn get(&self, session_id: &str) -> Option<EngineHandle> {
        self.engines
            .read()
            .await
            .get(session_id)
            .map(|live| Arc::clone(&live.engine))
    }

    /// Return the session's engine, reconstructing it when it is not live
    ///
    /// An empty `base_url` keeps the endpoint stored with the user's API
    /// configuration. A non-empty `persona` replaces the system entry, also on
    /// an engine that is already live.
    pub async fn get_or_create(
        &self,
        user_id: i64,
        session_id: &str,
        model_name: &str,
        base_url: &str,
        persona: &str,
    ) -> Result<EngineHandle> {
        if session_id.trim().is_empty() {
            return Err(ChatError::Validation("session_id must not be empty".into()));
        }
        if model_name.trim().is_empty() {
            return Err(ChatError::Validation("model_name must not be empty".into()));
        }

        let live = {
            let engines = self.engines.read().await;
            engines.get(session_id).map(|live| (live.user_id, Arc::clone(&live.engine)))
        };
        if let Some((owner, engine)) = live {
            return self.reuse(owner, user_id, session_id, engine, persona).await;
        }

        let mut engines = self.engines.write().await;
        if let Some(live) = engines.get(session_id) {
            let (owner, engine) = (live.user_id, Arc::clone(&live.engine));
            drop(engines);
            return self.reuse(owner, user_id, session_id, engine, persona).await;
        }

        let engine = match self
            .from_snapshot(user_id, session_id, base_url, persona)
            .await?
        {
            Some(engine) => engine,
            None => {
                self.from_store(user_id, session_id, model_name, base_url, persona)
                    .await?
            }
        };

        let handle = Arc::new(Mutex::new(engine));
        engines.insert(
            session_id.to_string(),
            LiveSession {
                user_id,
                engine: Arc::clone(&handle),
            },
        );
        tracing::info!(session_id = %session_id, user_id, live = engines.len(), "engine registered");

        Ok(handle)
    }

    async fn reuse(
        &self,
        owner: i64,
        user_id: i64,
        session_id: &str,
        engine: EngineHandle,
        persona: &str,
    ) -> Result<EngineHandle> {
        if owner != user_id {
            return Err(ChatError::Conflict(format!(
                "session {} belongs to another user",
                session_id
            )));
        }
        if !persona.is_empty() {
            if let Some(prompt) = self.personas.content(persona) {
                engine.lock().await.set_system_prompt(prompt);
            }
        }
        Ok(engine)
    }

    /// System prompt for a requested persona, falling back to the stored one
    fn system_prompt(&self, requested: &str, stored: Option<&str>) -> Option<&str> {
        let name = if requested.is_empty() {
            stored.unwrap_or_default()
        } else {
            requested
        };
        self.personas.content(name)
    }

    async fn from_snapshot(
        &self,
        user_id: i64,
        session_id: &str,
        base_url: &str,
        persona: &str,
    ) -> Result<Option<ConversationEngine>> {
        let snapshot = match self.cache.get_full_session(session_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(CacheError::Unavailable) => {
                tracing::debug!(session_id = %session_id, "cache unavailable, loading session from store");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to read session snapshot");
                return Ok(None);
            }
        };

        if snapshot.session.user_id != user_id || !snapshot.is_usable() {
            tracing::debug!(session_id = %session_id, "ignoring session snapshot");
            return Ok(None);
        }

        let base_url = if base_url.is_empty() {
            snapshot.base_url.as_str()
        } else {
            base_url
        };
        let config = OpenAIConfig::new(snapshot.api_key.clone()).with_base_url(base_url);
        let client = self
            .clients
            .create_chat_client(&config)
            .map_err(ChatError::Upstream)?;

        let prompt = self.system_prompt(persona, snapshot.session.persona_name.as_deref());
        tracing::debug!(session_id = %session_id, messages = snapshot.messages.len(), "engine rebuilt from snapshot");

        Ok(Some(ConversationEngine::from_history(
            session_id,
            snapshot.session.model_name.clone(),
            client,
            self.max_history,
            prompt,
            snapshot.messages,
        )))
    }

    async fn from_store(
        &self,
        user_id: i64,
        session_id: &str,
        model_name: &str,
        base_url: &str,
        persona: &str,
    ) -> Result<ConversationEngine> {
        let api_config = self.api_config(user_id, model_name).await?;
        let mut session = self
            .persist
            .find_or_create_session(session_id, user_id, model_name)
            .await?;
        let history: Vec<Message> = self
            .persist
            .get_messages(session_id)
            .await?
            .into_iter()
            .map(Message::from)
            .collect();

        let base_url = if base_url.is_empty() {
            api_config.base_url.clone()
        } else {
            base_url.to_string()
        };
        let config = OpenAIConfig::new(api_config.api_key.clone()).with_base_url(base_url.clone());
        let client = self
            .clients
            .create_chat_client(&config)
            .map_err(ChatError::Upstream)?;

        if !persona.is_empty()
            && session.persona_name.as_deref() != Some(persona)
            && self.personas.content(persona).is_some()
        {
            let patch = SessionPatch {
                persona_name: Some(persona.to_string()),
                ..SessionPatch::default()
            };
            match self.persist.update_session(session_id, user_id, patch).await {
                Ok(updated) => session = updated,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to store persona")
                }
            }
        }

        let prompt = self.system_prompt(persona, session.persona_name.as_deref());
        let engine = ConversationEngine::from_history(
            session_id,
            model_name,
            client,
            self.max_history,
            prompt,
            history.clone(),
        );

        let snapshot = CachedSession {
            session,
            messages: history,
            api_key: api_config.api_key,
            base_url,
        };
        if let Err(e) = self
            .cache
            .cache_full_session(session_id, &snapshot, self.cache.settings().session_ttl)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "failed to cache session snapshot");
        }

        tracing::debug!(session_id = %session_id, messages = snapshot.messages.len(), "engine rebuilt from store");
        Ok(engine)
    }

    /// User credentials for a model, read through the model-config cache
    async fn api_config(&self, user_id: i64, model_name: &str) -> Result<UserApiConfig> {
        match self.cache.get_model_config(user_id, model_name).await {
            Ok(Some(config)) => return Ok(config),
            Ok(None) | Err(CacheError::Unavailable) => {}
            Err(e) => tracing::warn!(user_id, model_name, error = %e, "failed to read cached model config"),
        }

        let config = self.persist.get_api_config(user_id, model_name).await?;
        if let Err(e) = self.cache.cache_model_config(&config).await {
            tracing::warn!(user_id, model_name, error = %e, "failed to cache model config");
        }
        Ok(config)
    }

    /// Durably append a message to a session's history
    pub async fn save_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        user_id: i64,
    ) -> Result<DBMessage> {
        let saved = self
            .write_message(NewMessage::new(session_id, user_id, role, content))
            .await?;
        Ok(saved)
    }

    async fn after_save(&self, saved: &DBMessage) {
        if saved.role == Role::User && saved.message_order == 1 {
            if let Some(titles) = &self.titles {
                titles.enqueue(TitleJob {
                    session_id: saved.session_id.clone(),
                    user_id: saved.user_id,
                    first_message: saved.content.clone(),
                });
            }
        }
        self.refresh_snapshot(saved).await;
    }

    /// Extend a cached snapshot with a newly stored message
    async fn refresh_snapshot(&self, saved: &DBMessage) {
        let session_id = saved.session_id.as_str();
        let result = match self.cache.get_full_session(session_id).await {
            Ok(Some(mut snapshot)) => {
                snapshot.messages.push(saved.to_message());
                touch(&mut snapshot.session, saved);
                self.cache
                    .cache_full_session(session_id, &snapshot, self.cache.settings().session_ttl)
                    .await
            }
            Ok(None) | Err(CacheError::Unavailable) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(session_id = %session_id, error = %e, "dropping stale session snapshot");
            if let Err(e) = self.cache.delete_full_session(session_id).await {
                tracing::debug!(session_id = %session_id, error = %e, "failed to drop session snapshot");
            }
        }
    }

    /// Drop the live engine and delete the session with its messages
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let mut engines = self.engines.write().await;
        engines.remove(session_id);
        self.persist.delete_session(session_id).await?;
        drop(engines);

        if let Err(e) = self.cache.delete_full_session(session_id).await {
            tracing::debug!(session_id = %session_id, error = %e, "failed to drop session snapshot");
        }
        tracing::info!(session_id = %session_id, "session deleted");
        Ok(())
    }
}

fn touch(session: &mut Session, saved: &DBMessage) {
    session.message_count += 1;
    session.last_message_at = Some(saved.created_at);
    session.updated_at = saved.created_at;
}

#[async_trait]
impl MessageWriter for SessionManager {
    async fn write_message(&self, message: NewMessage) -> chatline_persist::Result<DBMessage> {
        let saved = self.persist.save_message(message).await?;
        self.after_save(&saved).await;
        Ok(saved)
    }
}
