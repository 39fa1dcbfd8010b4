use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatline_llm::Role;
use chatline_persist::NewMessage;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheError, CacheService};
use crate::engine::ChunkSink;
use crate::error::{ChatError, Result};
use crate::session::SessionManager;

const STREAM_CHANNEL_CAPACITY: usize = 256;

/// One message turn as submitted by a caller
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    #[serde(skip)]
    pub user_id: i64,
    pub session_id: String,
    #[serde(alias = "model")]
    pub model_name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default, alias = "persona_name")]
    pub persona: String,
    pub message: String,
}

impl SendRequest {
    fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }
        Ok(())
    }
}

/// Unit delivered to a streaming caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUnit {
    Chunk(String),
    /// Keep-alive emitted while the model is idle
    Heartbeat,
    Done,
    Error(String),
}

impl StreamUnit {
    /// JSON body of the unit; heartbeats have none
    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::Chunk(content) => Some(json!({ "content": content, "done": false })),
            Self::Done => Some(json!({ "content": "", "done": true })),
            Self::Error(error) => Some(json!({ "error": error, "done": true })),
            Self::Heartbeat => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stream_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub save_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_timeout: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(5),
            save_retries: 3,
        }
    }
}

/// Drives one send from the user turn to the persisted reply
pub struct ChatPipeline {
    sessions: Arc<SessionManager>,
    config: PipelineConfig,
}

impl ChatPipeline {
    pub fn new(sessions: Arc<SessionManager>, config: PipelineConfig) -> Self {
        Self { sessions, config }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Start a streaming send and return the receiving end of its units
    ///
    /// Resolving the engine and storing the user turn happen before this
    /// returns, so their failures surface as a plain error. Everything after
    /// is reported in-band and the stream always ends with a terminal unit
    /// unless the receiver goes away first.
    pub async fn start(&self, request: SendRequest) -> Result<mpsc::Receiver<StreamUnit>> {
        request.validate()?;

        let engine = self
            .sessions
            .get_or_create(
                request.user_id,
                &request.session_id,
                &request.model_name,
                &request.base_url,
                &request.persona,
            )
            .await?;
        let guard = engine.lock_owned().await;

        let cache = Arc::clone(self.sessions.cache());
        if let Err(e) = cache.delete_stream(&request.session_id).await {
            tracing::debug!(session_id = %request.session_id, error = %e, "failed to clear stale stream buffer");
        }

        self.sessions
            .save_message(&request.session_id, Role::User, &request.message, request.user_id)
            .await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let sessions = Arc::clone(&self.sessions);
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut engine = guard;
            let session_id = request.session_id.clone();
            let cancel = CancellationToken::new();
            let heartbeat = spawn_heartbeat(tx.clone(), cancel.clone(), config.heartbeat_interval);

            let mut sink = BufferingSink {
                session_id: session_id.clone(),
                cache: Arc::clone(&cache),
                tx: tx.clone(),
            };
            let outcome = tokio::time::timeout(
                config.stream_timeout,
                engine.send_message_stream(&request.message, &cancel, &mut sink),
            )
            .await;

            cancel.cancel();
            if let Err(e) = heartbeat.await {
                tracing::debug!(session_id = %session_id, error = %e, "heartbeat task ended abnormally");
            }

            let reply = match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %session_id, error = %e, "streaming send failed");
                    let _ = tx.send(StreamUnit::Error(e.to_string())).await;
                    return;
                }
                Err(_) => {
                    let e = ChatError::Timeout(config.stream_timeout.as_secs());
                    tracing::warn!(session_id = %session_id, error = %e, "streaming send timed out");
                    let _ = tx.send(StreamUnit::Error(e.to_string())).await;
                    return;
                }
            };

            if reply.is_empty() {
                engine.discard_unsaved_reply();
                let _ = tx
                    .send(StreamUnit::Error("model returned an empty response".into()))
                    .await;
                return;
            }

            let content = match cache.get_stream(&session_id).await {
                Ok(Some(buffered)) if !buffered.is_empty() => buffered,
                Ok(_) | Err(CacheError::Unavailable) => reply,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to read stream buffer");
                    reply
                }
            };

            let message = NewMessage::new(&session_id, request.user_id, Role::Assistant, content);
            let unit = match cache
                .save_with_retry(sessions.as_ref(), message, config.save_retries)
                .await
            {
                Ok(saved) => {
                    tracing::info!(session_id = %session_id, message_order = saved.message_order, "assistant reply stored");
                    StreamUnit::Done
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "failed to store assistant reply");
                    engine.discard_unsaved_reply();
                    StreamUnit::Error(e.to_string())
                }
            };

            if let Err(e) = cache.delete_stream(&session_id).await {
                tracing::debug!(session_id = %session_id, error = %e, "failed to clear stream buffer");
            }
            drop(engine);
            let _ = tx.send(unit).await;
        });

        Ok(rx)
    }

    /// Text streamed so far for a session whose caller lost the connection
    pub async fn recover(&self, session_id: &str) -> Option<String> {
        match self.sessions.cache().get_stream(session_id).await {
            Ok(Some(text)) if !text.is_empty() => Some(text),
            Ok(_) | Err(CacheError::Unavailable) => None,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to read stream buffer");
                None
            }
        }
    }

    /// Blocking send: store the user turn, call the model, store the reply
    pub async fn send(&self, request: SendRequest) -> Result<String> {
        request.validate()?;

        let engine = self
            .sessions
            .get_or_create(
                request.user_id,
                &request.session_id,
                &request.model_name,
                &request.base_url,
                &request.persona,
            )
            .await?;
        let mut engine = engine.lock().await;

        self.sessions
            .save_message(&request.session_id, Role::User, &request.message, request.user_id)
            .await?;

        let reply = tokio::time::timeout(
            self.config.stream_timeout,
            engine.send_message(&request.message),
        )
        .await
        .map_err(|_| ChatError::Timeout(self.config.stream_timeout.as_secs()))??;

        if reply.is_empty() {
            engine.discard_unsaved_reply();
            return Err(ChatError::Upstream(anyhow::anyhow!(
                "model returned an empty response"
            )));
        }

        let message = NewMessage::new(
            &request.session_id,
            request.user_id,
            Role::Assistant,
            reply.clone(),
        );
        if let Err(e) = self
            .sessions
            .cache()
            .save_with_retry(self.sessions.as_ref(), message, self.config.save_retries)
            .await
        {
            engine.discard_unsaved_reply();
            return Err(e);
        }

        Ok(reply)
    }
}

/// Mirrors every chunk into the stream buffer before forwarding it
struct BufferingSink {
    session_id: String,
    cache: Arc<CacheService>,
    tx: mpsc::Sender<StreamUnit>,
}

#[async_trait]
impl ChunkSink for BufferingSink {
    async fn on_chunk(&mut self, chunk: &str) -> Result<()> {
        if let Err(e) = self.cache.append_stream(&self.session_id, chunk).await {
            tracing::warn!(session_id = %self.session_id, error = %e, "failed to buffer chunk");
        }
        self.tx
            .send(StreamUnit::Chunk(chunk.to_string()))
            .await
            .map_err(|_| ChatError::Disconnected)
    }
}

/// Emit keep-alives until `cancel` fires; a closed receiver cancels the send
fn spawn_heartbeat(
    tx: mpsc::Sender<StreamUnit>,
    cancel: CancellationToken,
    period: Duration,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tx.closed() => {
                    tracing::debug!("stream receiver closed, cancelling send");
                    cancel.cancel();
                    break;
                }
                _ = ticker.tick() => match tx.try_send(StreamUnit::Heartbeat) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => {
                        cancel.cancel();
                        break;
                    }
                },
            }
        }
    })
}
