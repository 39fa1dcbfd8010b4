mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatline_core::cache::MessageWriter;
use chatline_core::{ChatError, PipelineConfig, StreamUnit};
use chatline_llm::Role;
use chatline_persist::{
    DBMessage, NewMessage, PersistError, PersistenceClient, SqlitePersistenceClient,
};
use common::{chunks, drain, request, Harness, Script, MODEL, USER};

fn roles_and_contents(messages: &[DBMessage]) -> Vec<(Role, &str)> {
    messages.iter().map(|m| (m.role, m.content.as_str())).collect()
}

#[tokio::test]
async fn test_stream_delivers_chunks_and_persists_reply() {
    let h = Harness::new(true).await;
    h.script(Script::Reply(vec!["The ", "answer ", "is ", "42."]));

    let units = drain(h.pipeline.start(request("s1", "question")).await.unwrap()).await;

    assert_eq!(chunks(&units), "The answer is 42.");
    assert_eq!(units.last(), Some(&StreamUnit::Done));

    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(
        roles_and_contents(&messages),
        vec![(Role::User, "question"), (Role::Assistant, "The answer is 42.")]
    );

    // Buffer is gone once the reply is durable
    assert_eq!(h.cache.get_stream("s1").await.unwrap(), None);
    assert_eq!(h.pipeline.recover("s1").await, None);
}

#[tokio::test]
async fn test_buffer_holds_exact_concatenation_after_interruption() {
    let h = Harness::new(true).await;
    let sent = vec!["Once ", "upon ", "", "a ", "time"];
    h.script(Script::FailAfter(sent.clone()));

    let units = drain(h.pipeline.start(request("s1", "story")).await.unwrap()).await;

    assert!(matches!(units.last(), Some(StreamUnit::Error(_))));
    assert_eq!(chunks(&units), sent.concat());
    assert_eq!(h.pipeline.recover("s1").await, Some(sent.concat()));

    // Only the user turn reached the store
    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(roles_and_contents(&messages), vec![(Role::User, "story")]);
}

#[tokio::test]
async fn test_upstream_failure_before_any_chunk() {
    let h = Harness::new(true).await;
    h.script(Script::FailOpen);

    let units = drain(h.pipeline.start(request("s1", "hello")).await.unwrap()).await;

    assert_eq!(units.len(), 1);
    match &units[0] {
        StreamUnit::Error(message) => assert!(message.contains("502")),
        other => panic!("expected error unit, got {:?}", other),
    }

    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(roles_and_contents(&messages), vec![(Role::User, "hello")]);

    // The failed turn was rolled back in memory
    let engine = h.sessions.get("s1").await.unwrap();
    assert!(engine.lock().await.messages().iter().all(|m| m.is_system()));
}

#[tokio::test]
async fn test_next_stream_clears_stale_buffer() {
    let h = Harness::new(true).await;
    h.script(Script::FailAfter(vec!["partial"]));
    drain(h.pipeline.start(request("s1", "first")).await.unwrap()).await;
    assert_eq!(h.pipeline.recover("s1").await.as_deref(), Some("partial"));

    h.script(Script::Reply(vec!["fresh"]));
    let units = drain(h.pipeline.start(request("s1", "second")).await.unwrap()).await;
    assert_eq!(units.last(), Some(&StreamUnit::Done));

    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(messages.last().unwrap().content, "fresh");
}

#[tokio::test]
async fn test_persistence_failure_clears_buffer() {
    let h = Harness::new(true).await;
    h.sessions.get_or_create(USER, "s1", MODEL, "", "").await.unwrap();

    // The session row disappears while the model is answering
    let persist = h.persist.clone();
    h.script(Script::Hooked(
        Box::pin(async move {
            persist.delete_session("s1").await.unwrap();
        }),
        vec!["lost ", "reply"],
    ));

    let units = drain(h.pipeline.start(request("s1", "hello")).await.unwrap()).await;

    assert_eq!(chunks(&units), "lost reply");
    match units.last() {
        Some(StreamUnit::Error(message)) => assert!(message.contains("attempt")),
        other => panic!("expected error unit, got {:?}", other),
    }
    assert_eq!(h.pipeline.recover("s1").await, None);
    assert!(h.persist.get_messages("s1").await.unwrap().is_empty());

    // The unsaved reply does not linger in the upstream context
    let engine = h.sessions.get("s1").await.unwrap();
    let engine = engine.lock().await;
    let last = engine.messages().last().unwrap();
    assert_eq!((last.role, last.content.as_str()), (Role::User, "hello"));
}

#[tokio::test]
async fn test_heartbeats_interleave_slow_stream() {
    let h = Harness::with_config(
        false,
        PipelineConfig {
            stream_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_millis(10),
            save_retries: 3,
        },
    )
    .await;
    h.script(Script::Slow(Duration::from_millis(60), vec!["slow ", "reply"]));

    let units = drain(h.pipeline.start(request("s1", "hi")).await.unwrap()).await;

    assert!(units.contains(&StreamUnit::Heartbeat));
    assert_eq!(chunks(&units), "slow reply");
    assert_eq!(units.last(), Some(&StreamUnit::Done));
}

#[tokio::test]
async fn test_stream_timeout_reports_error() {
    let h = Harness::with_config(
        true,
        PipelineConfig {
            stream_timeout: Duration::from_millis(30),
            heartbeat_interval: Duration::from_secs(5),
            save_retries: 3,
        },
    )
    .await;
    h.script(Script::Slow(Duration::from_millis(500), vec!["never"]));

    let units = drain(h.pipeline.start(request("s1", "hi")).await.unwrap()).await;

    match units.last() {
        Some(StreamUnit::Error(message)) => assert!(message.contains("Timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_releases_engine() {
    let h = Harness::new(false).await;
    h.script(Script::Slow(Duration::from_millis(20), vec!["a", "b", "c", "d", "e"]));

    let mut rx = h.pipeline.start(request("s1", "hi")).await.unwrap();
    assert!(matches!(rx.recv().await, Some(StreamUnit::Chunk(_))));
    drop(rx);

    let engine = h.sessions.get("s1").await.unwrap();
    let guard = tokio::time::timeout(Duration::from_secs(2), engine.lock())
        .await
        .expect("engine stays locked after disconnect");

    // User turn kept, no assistant reply appended or stored
    assert_eq!(guard.messages().last().unwrap().role, Role::User);
    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(roles_and_contents(&messages), vec![(Role::User, "hi")]);
}

#[tokio::test]
async fn test_concurrent_streams_on_one_session_are_serialized() {
    let h = Harness::new(true).await;
    h.script(Script::Slow(Duration::from_millis(5), vec!["one", "!"]));
    h.script(Script::Slow(Duration::from_millis(5), vec!["two", "?"]));

    let first = h.pipeline.start(request("s1", "q1")).await.unwrap();
    let second = h.pipeline.start(request("s1", "q2"));
    let (first, second) = tokio::join!(drain(first), async { drain(second.await.unwrap()).await });

    assert_eq!(first.last(), Some(&StreamUnit::Done));
    assert_eq!(second.last(), Some(&StreamUnit::Done));

    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(
        roles_and_contents(&messages),
        vec![
            (Role::User, "q1"),
            (Role::Assistant, "one!"),
            (Role::User, "q2"),
            (Role::Assistant, "two?"),
        ]
    );
}

#[tokio::test]
async fn test_sync_send_rolls_back_on_upstream_failure() {
    let h = Harness::new(false).await;
    h.script(Script::FailOpen);

    let err = h.pipeline.send(request("s1", "hello")).await.unwrap_err();
    assert!(matches!(err, ChatError::Upstream(_)));

    let engine = h.sessions.get("s1").await.unwrap();
    assert!(engine.lock().await.messages().iter().all(|m| m.is_system()));
}

#[tokio::test]
async fn test_sync_empty_reply_is_not_kept_in_context() {
    let h = Harness::new(true).await;
    h.script(Script::Reply(vec![]));

    let err = h.pipeline.send(request("s1", "hello")).await.unwrap_err();
    assert!(matches!(err, ChatError::Upstream(_)));

    let engine = h.sessions.get("s1").await.unwrap();
    let roles: Vec<Role> = engine
        .lock()
        .await
        .messages()
        .iter()
        .filter(|m| !m.is_system())
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![Role::User]);
    assert_eq!(h.persist.get_messages("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let h = Harness::new(false).await;
    assert!(matches!(
        h.pipeline.start(request("s1", "  ")).await,
        Err(ChatError::Validation(_))
    ));
}

/// Fails the first writes with a transient error, then stores for real
struct FlakyStore {
    inner: Arc<SqlitePersistenceClient>,
    failures: u32,
    attempts: AtomicU32,
}

#[async_trait]
impl MessageWriter for FlakyStore {
    async fn write_message(&self, message: NewMessage) -> chatline_persist::Result<DBMessage> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(PersistError::Connection("database is locked".into()));
        }
        self.inner.save_message(message).await
    }
}

#[tokio::test]
async fn test_save_with_retry_stores_exactly_one_row() {
    let h = Harness::new(false).await;
    h.persist.find_or_create_session("s1", USER, MODEL).await.unwrap();
    let store = FlakyStore {
        inner: h.persist.clone(),
        failures: 2,
        attempts: AtomicU32::new(0),
    };

    let saved = h
        .cache
        .save_with_retry(&store, NewMessage::new("s1", USER, Role::Assistant, "done"), 3)
        .await
        .unwrap();

    assert_eq!(saved.message_order, 1);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    let messages = h.persist.get_messages("s1").await.unwrap();
    assert_eq!(messages.len(), 1);

    let session = h.persist.get_session("s1", USER).await.unwrap().unwrap();
    assert_eq!(session.message_count, 1);
}

#[tokio::test]
async fn test_save_with_retry_does_not_retry_missing_session() {
    let h = Harness::new(false).await;
    let store = FlakyStore {
        inner: h.persist.clone(),
        failures: 0,
        attempts: AtomicU32::new(0),
    };

    let err = h
        .cache
        .save_with_retry(&store, NewMessage::new("missing", USER, Role::User, "x"), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Persistence { attempts: 1, .. }));
    assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
}
