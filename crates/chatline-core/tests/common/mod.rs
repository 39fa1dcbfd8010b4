#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chatline_core::{
    CacheService, CacheSettings, ChatPipeline, MemoryCache, PersonaCatalog, PipelineConfig,
    SendRequest, SessionManager, StreamUnit,
};
use chatline_core::persona::Persona;
use chatline_llm::{
    ChatClient, ChatRequest, ChatResponse, ClientFactory, EventStream, Message, OpenAIConfig,
    StreamEvent,
};
use chatline_persist::{NewApiConfig, PersistenceClient, SqlitePersistenceClient};
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::mpsc;

pub const USER: i64 = 1;
pub const MODEL: &str = "test-model";

/// What the fake upstream does on its next call
pub enum Script {
    Reply(Vec<&'static str>),
    FailOpen,
    /// Streams the chunks, then breaks the connection
    FailAfter(Vec<&'static str>),
    /// Waits before each chunk
    Slow(Duration, Vec<&'static str>),
    /// Runs the hook when the call starts, then replies
    Hooked(BoxFuture<'static, ()>, Vec<&'static str>),
}

/// Upstream model double that plays queued scripts and records requests
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    fn next(&self, request: ChatRequest) -> Script {
        self.requests.lock().unwrap().push(request.messages);
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Reply(vec!["ok"]))
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let chunks = match self.next(request) {
            Script::Reply(chunks) | Script::Slow(_, chunks) => chunks,
            Script::Hooked(hook, chunks) => {
                hook.await;
                chunks
            }
            Script::FailOpen | Script::FailAfter(_) => {
                return Err(anyhow!("Chat API error (502 Bad Gateway): upstream down"))
            }
        };
        Ok(ChatResponse {
            content: Some(chunks.concat()),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let events = |chunks: Vec<&'static str>| {
            chunks
                .into_iter()
                .map(|c| Ok(StreamEvent::Message { content: c.to_string() }))
                .collect::<Vec<Result<StreamEvent>>>()
        };

        match self.next(request) {
            Script::Reply(chunks) => Ok(Box::pin(futures::stream::iter(events(chunks)))),
            Script::FailOpen => Err(anyhow!("Chat API error (502 Bad Gateway): upstream down")),
            Script::FailAfter(chunks) => {
                let mut items = events(chunks);
                items.push(Err(anyhow!("Stream error: connection reset")));
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Script::Slow(delay, chunks) => Ok(Box::pin(
                futures::stream::iter(events(chunks)).then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                }),
            )),
            Script::Hooked(hook, chunks) => {
                hook.await;
                Ok(Box::pin(futures::stream::iter(events(chunks))))
            }
        }
    }
}

/// Hands out the same scripted client for every configuration
pub struct ScriptedFactory {
    pub client: Arc<ScriptedClient>,
    pub configs: Mutex<Vec<OpenAIConfig>>,
    pub created: AtomicUsize,
}

impl ClientFactory for ScriptedFactory {
    fn create_chat_client(&self, config: &OpenAIConfig) -> Result<Arc<dyn ChatClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().unwrap().push(config.clone());
        Ok(self.client.clone())
    }
}

pub struct Harness {
    pub persist: Arc<SqlitePersistenceClient>,
    pub backend: Arc<MemoryCache>,
    pub cache: Arc<CacheService>,
    pub factory: Arc<ScriptedFactory>,
    pub sessions: Arc<SessionManager>,
    pub pipeline: ChatPipeline,
}

impl Harness {
    pub async fn new(cache_available: bool) -> Self {
        Self::with_config(cache_available, PipelineConfig {
            stream_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(5),
            save_retries: 3,
        })
        .await
    }

    pub async fn with_config(cache_available: bool, config: PipelineConfig) -> Self {
        let persist = Arc::new(SqlitePersistenceClient::connect_in_memory().await.unwrap());
        persist
            .create_api_config(
                USER,
                NewApiConfig {
                    api_name: "primary".into(),
                    api_key: "sk-test".into(),
                    model_name: MODEL.into(),
                    base_url: "http://upstream.test/v1".into(),
                },
            )
            .await
            .unwrap();

        let backend = Arc::new(MemoryCache::new());
        backend.set_available(cache_available);
        Self::assemble(persist, backend, config)
    }

    pub fn assemble(
        persist: Arc<SqlitePersistenceClient>,
        backend: Arc<MemoryCache>,
        config: PipelineConfig,
    ) -> Self {
        let cache = Arc::new(CacheService::new(
            backend.clone(),
            CacheSettings {
                retry_backoff: Duration::from_millis(1),
                ..CacheSettings::default()
            },
        ));
        let factory = Arc::new(ScriptedFactory {
            client: Arc::new(ScriptedClient::default()),
            configs: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        });
        let sessions = Arc::new(SessionManager::new(
            persist.clone(),
            cache.clone(),
            factory.clone(),
            Arc::new(personas()),
            10,
        ));
        let pipeline = ChatPipeline::new(sessions.clone(), config);

        Self {
            persist,
            backend,
            cache,
            factory,
            sessions,
            pipeline,
        }
    }

    pub fn script(&self, script: Script) {
        self.factory.client.push(script);
    }

    pub fn persist_dyn(&self) -> Arc<dyn PersistenceClient> {
        self.persist.clone()
    }
}

pub fn personas() -> PersonaCatalog {
    PersonaCatalog::new(
        vec![
            Persona {
                name: "assistant".into(),
                content: "You are a helpful assistant.".into(),
            },
            Persona {
                name: "pirate".into(),
                content: "Answer like a pirate.".into(),
            },
        ],
        None,
    )
}

pub fn request(session_id: &str, message: &str) -> SendRequest {
    SendRequest {
        user_id: USER,
        session_id: session_id.into(),
        model_name: MODEL.into(),
        base_url: String::new(),
        persona: String::new(),
        message: message.into(),
    }
}

/// Collect units up to and including the terminal one
pub async fn drain(mut rx: mpsc::Receiver<StreamUnit>) -> Vec<StreamUnit> {
    let mut units = Vec::new();
    while let Some(unit) = rx.recv().await {
        let terminal = unit.is_terminal();
        units.push(unit);
        if terminal {
            break;
        }
    }
    units
}

pub fn chunks(units: &[StreamUnit]) -> String {
    units
        .iter()
        .filter_map(|u| match u {
            StreamUnit::Chunk(c) => Some(c.as_str()),
            _ => None,
        })
        .collect()
}
