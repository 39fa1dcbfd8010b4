use std::sync::Arc;

use async_trait::async_trait;
use chatline_llm::{ChatClient, ChatRequest, Message, StreamEvent};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};

/// Receiver of incremental reply fragments
#[async_trait]
pub trait ChunkSink: Send {
    async fn on_chunk(&mut self, chunk: &str) -> Result<()>;
}

/// One session's live upstream client plus its in-memory history
///
/// The history mirrors the persisted messages of the session, optionally
/// preceded by a transient system entry that is never stored.
pub struct ConversationEngine {
    session_id: String,
    model: String,
    client: Arc<dyn ChatClient>,
    messages: Vec<Message>,
    max_history: usize,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("session_id", &self.session_id)
            .field("model", &self.model)
            .field("messages", &self.messages)
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}

impl ConversationEngine {
    pub fn new(
        session_id: impl Into<String>,
        model: impl Into<String>,
        client: Arc<dyn ChatClient>,
        max_history: usize,
        system_prompt: Option<&str>,
    ) -> Self {
        Self::from_history(session_id, model, client, max_history, system_prompt, Vec::new())
    }

    /// Rebuild an engine around previously persisted turns
    pub fn from_history(
        session_id: impl Into<String>,
        model: impl Into<String>,
        client: Arc<dyn ChatClient>,
        max_history: usize,
        system_prompt: Option<&str>,
        history: Vec<Message>,
    ) -> Self {
        let mut engine = Self {
            session_id: session_id.into(),
            model: model.into(),
            client,
            messages: history,
            max_history: max_history.max(1),
        };
        if let Some(prompt) = system_prompt {
            engine.set_system_prompt(prompt);
        }
        engine
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Install or replace the leading system entry; an empty prompt is ignored
    pub fn set_system_prompt(&mut self, prompt: &str) {
        if prompt.is_empty() {
            return;
        }
        match self.messages.first_mut() {
            Some(first) if first.is_system() => first.content = prompt.to_string(),
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }

    /// Keep the leading system entry plus the most recent `2 * max_history` turns
    ///
    /// Runs before every upstream call and after every appended reply.
    fn truncate_history(&mut self) {
        let start = usize::from(self.messages.first().is_some_and(Message::is_system));
        let keep = self.max_history * 2;
        let len = self.messages.len();
        if len > keep + start {
            let removed = len - keep - start;
            self.messages.drain(start..start + removed);
            tracing::debug!(session_id = %self.session_id, removed, "history truncated");
        }
    }

    fn request(&self) -> ChatRequest {
        ChatRequest::new(self.model.clone(), self.messages.clone())
    }

    fn rollback_user_turn(&mut self) {
        if self.messages.last().is_some_and(|m| m.role == chatline_llm::Role::User) {
            self.messages.pop();
        }
    }

    /// Drop the trailing assistant entry when its reply could not be stored,
    /// so upstream context never runs ahead of durable history
    pub fn discard_unsaved_reply(&mut self) -> bool {
        if self
            .messages
            .last()
            .is_some_and(|m| m.role == chatline_llm::Role::Assistant)
        {
            self.messages.pop();
            true
        } else {
            false
        }
    }

    /// Blocking send; the user turn is rolled back if the upstream call fails
    pub async fn send_message(&mut self, text: &str) -> Result<String> {
        self.messages.push(Message::human(text));
        self.truncate_history();

        let response = match self.client.chat(self.request()).await {
            Ok(response) => response,
            Err(e) => {
                self.rollback_user_turn();
                return Err(ChatError::Upstream(e));
            }
        };

        let reply = response.content.unwrap_or_default();
        self.messages.push(Message::ai(reply.clone()));
        self.truncate_history();
        Ok(reply)
    }

    /// Streaming send, forwarding each fragment to `sink` in arrival order
    ///
    /// The user turn is rolled back only when the stream cannot be opened.
    /// Once fragments may have reached the caller, failures leave it in place.
    pub async fn send_message_stream<S>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<String>
    where
        S: ChunkSink + ?Sized,
    {
        self.messages.push(Message::human(text));
        self.truncate_history();

        let client = Arc::clone(&self.client);
        let request = self.request();
        let opened = tokio::select! {
            _ = cancel.cancelled() => None,
            opened = client.chat_stream(request) => Some(opened),
        };
        let Some(opened) = opened else {
            self.rollback_user_turn();
            return Err(ChatError::Cancelled);
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.rollback_user_turn();
                return Err(ChatError::Upstream(e));
            }
        };

        let mut reply = String::new();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                event = stream.next() => event,
            };

            match event {
                Some(Ok(StreamEvent::Message { content })) => {
                    sink.on_chunk(&content).await?;
                    reply.push_str(&content);
                }
                Some(Ok(StreamEvent::Done { .. })) | None => break,
                Some(Err(e)) => {
                    tracing::warn!(session_id = %self.session_id, error = %e, "upstream stream failed");
                    return Err(ChatError::Upstream(e));
                }
            }
        }

        self.messages.push(Message::ai(reply.clone()));
        self.truncate_history();
        Ok(reply)
    }
}
