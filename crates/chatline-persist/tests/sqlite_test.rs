use chatline_llm::Role;
use chatline_persist::{
    LinkRejection, NewApiConfig, NewMessage, PersistError, PersistenceClient, SessionPatch,
    SharedLinkPatch, SqlitePersistenceClient, UNLIMITED_VIEWS,
};
use chrono::{Duration, Utc};

async fn client() -> SqlitePersistenceClient {
    SqlitePersistenceClient::connect_in_memory().await.unwrap()
}

async fn session_with_messages(db: &SqlitePersistenceClient, id: &str, n: usize) {
    db.find_or_create_session(id, 1, "deepseek-chat").await.unwrap();
    for i in 0..n {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        db.save_message(NewMessage::new(id, 1, role, format!("m{}", i)))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_find_or_create_is_idempotent() {
    let db = client().await;

    let first = db.find_or_create_session("s1", 1, "deepseek-chat").await.unwrap();
    assert_eq!(first.title, "Chat with deepseek-chat");
    assert_eq!(first.message_count, 0);

    let again = db.find_or_create_session("s1", 1, "other-model").await.unwrap();
    assert_eq!(again.model_name, "deepseek-chat");
    assert_eq!(again.created_at, first.created_at);
}

#[tokio::test]
async fn test_session_id_owned_by_another_user_conflicts() {
    let db = client().await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();

    let err = db.find_or_create_session("s1", 2, "m").await.unwrap_err();
    assert!(matches!(err, PersistError::Conflict(_)));
}

#[tokio::test]
async fn test_save_message_assigns_order_and_counts() {
    let db = client().await;
    session_with_messages(&db, "s1", 3).await;

    let messages = db.get_messages("s1").await.unwrap();
    let orders: Vec<i64> = messages.iter().map(|m| m.message_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    assert_eq!(messages[1].role, Role::Assistant);

    let session = db.get_session("s1", 1).await.unwrap().unwrap();
    assert_eq!(session.message_count, 3);
    assert!(session.last_message_at.is_some());
}

#[tokio::test]
async fn test_save_message_requires_owned_session() {
    let db = client().await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();

    let missing = db
        .save_message(NewMessage::new("nope", 1, Role::User, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(missing, PersistError::SessionNotFound(_)));

    let foreign = db
        .save_message(NewMessage::new("s1", 2, Role::User, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(foreign, PersistError::SessionNotFound(_)));
    assert!(db.get_messages("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_session_cascades() {
    let db = client().await;
    session_with_messages(&db, "s1", 4).await;
    let link = db.create_shared_link("s1", 1, UNLIMITED_VIEWS, None).await.unwrap();

    db.delete_session("s1").await.unwrap();

    assert!(db.get_session("s1", 1).await.unwrap().is_none());
    assert!(db.get_messages("s1").await.unwrap().is_empty());
    assert!(db.get_shared_link(&link.share_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_sessions_paging() {
    let db = client().await;
    for i in 0..5 {
        db.find_or_create_session(&format!("s{}", i), 1, "m").await.unwrap();
    }
    db.find_or_create_session("other", 2, "m").await.unwrap();
    db.save_message(NewMessage::new("s0", 1, Role::User, "bump"))
        .await
        .unwrap();

    let page = db.list_sessions(1, Some(1), Some(2)).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.sessions.len(), 2);
    assert_eq!(page.sessions[0].session_id, "s0");

    let clamped = db.list_sessions(1, Some(0), Some(500)).await.unwrap();
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.page_size, 30);
    assert_eq!(clamped.sessions.len(), 5);
}

#[tokio::test]
async fn test_messages_cursor_paging() {
    let db = client().await;
    session_with_messages(&db, "s1", 5).await;

    let newest = db.get_messages_page("s1", None, Some(2)).await.unwrap();
    let orders: Vec<i64> = newest.messages.iter().map(|m| m.message_order).collect();
    assert_eq!(orders, vec![4, 5]);
    assert!(newest.has_more);

    let oldest = db.get_messages_page("s1", Some(2), Some(2)).await.unwrap();
    assert_eq!(oldest.messages.len(), 1);
    assert!(!oldest.has_more);
}

#[tokio::test]
async fn test_update_session_patch() {
    let db = client().await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();

    let updated = db
        .update_session("s1", 1, SessionPatch::title("Trip planning"))
        .await
        .unwrap();
    assert_eq!(updated.title, "Trip planning");
    assert_eq!(updated.persona_name, None);

    let err = db
        .update_session("s1", 2, SessionPatch::title("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_api_config_lookup_and_conflict() {
    let db = client().await;
    let config = NewApiConfig {
        api_name: "deepseek".into(),
        api_key: "sk-1".into(),
        model_name: "deepseek-chat".into(),
        base_url: "https://api.deepseek.com/v1".into(),
    };

    db.create_api_config(1, config.clone()).await.unwrap();
    let dup = db.create_api_config(1, config.clone()).await.unwrap_err();
    assert!(matches!(dup, PersistError::Conflict(_)));

    // Same name for a different user is fine
    db.create_api_config(2, config).await.unwrap();

    let found = db.get_api_config(1, "deepseek-chat").await.unwrap();
    assert_eq!(found.api_key, "sk-1");

    let missing = db.get_api_config(1, "gpt-4o").await.unwrap_err();
    assert!(matches!(missing, PersistError::ApiConfigNotFound { user_id: 1, .. }));
}

#[tokio::test]
async fn test_shared_link_requires_ownership() {
    let db = client().await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();

    let err = db.create_shared_link("s1", 2, UNLIMITED_VIEWS, None).await.unwrap_err();
    assert!(matches!(err, PersistError::SessionNotFound(_)));

    let err = db.create_shared_link("s1", 1, 0, None).await.unwrap_err();
    assert!(matches!(err, PersistError::Validation(_)));
}

#[tokio::test]
async fn test_access_returns_transcript_and_counts() {
    let db = client().await;
    session_with_messages(&db, "s1", 2).await;
    let link = db.create_shared_link("s1", 1, UNLIMITED_VIEWS, None).await.unwrap();

    let access = db.access_shared_link(&link.share_id).await.unwrap();
    assert_eq!(access.session.session_id, "s1");
    assert_eq!(access.messages.len(), 2);
    assert_eq!(access.link.view_count, 1);
    assert!(access.link.last_access_at.is_some());

    let info = db.get_shared_link(&link.share_id).await.unwrap().unwrap();
    assert_eq!(info.view_count, 1);
}

#[tokio::test]
async fn test_access_rejections() {
    let db = client().await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();

    let missing = db.access_shared_link("share_missing").await.unwrap_err();
    assert!(matches!(missing, PersistError::LinkRejected(LinkRejection::NotFound)));

    let expired = db
        .create_shared_link("s1", 1, UNLIMITED_VIEWS, Some(Utc::now() - Duration::minutes(1)))
        .await
        .unwrap();
    let err = db.access_shared_link(&expired.share_id).await.unwrap_err();
    assert!(matches!(err, PersistError::LinkRejected(LinkRejection::Expired)));

    let private = db.create_shared_link("s1", 1, UNLIMITED_VIEWS, None).await.unwrap();
    let patch = SharedLinkPatch {
        is_public: Some(false),
        ..Default::default()
    };
    db.update_shared_link(&private.share_id, 1, patch).await.unwrap();
    let err = db.access_shared_link(&private.share_id).await.unwrap_err();
    assert!(matches!(err, PersistError::LinkRejected(LinkRejection::Private)));

    let once = db.create_shared_link("s1", 1, 1, None).await.unwrap();
    db.access_shared_link(&once.share_id).await.unwrap();
    let err = db.access_shared_link(&once.share_id).await.unwrap_err();
    assert!(matches!(err, PersistError::LinkRejected(LinkRejection::LimitReached)));

    // Rejections leave the counter alone
    let info = db.get_shared_link(&once.share_id).await.unwrap().unwrap();
    assert_eq!(info.view_count, 1);
}

/// Pool on a database file so concurrent transactions hit separate connections
async fn file_client(dir: &tempfile::TempDir) -> SqlitePersistenceClient {
    let url = format!("sqlite://{}", dir.path().join("chat.db").display());
    SqlitePersistenceClient::connect(&url, 8, std::time::Duration::from_secs(5))
        .await
        .unwrap()
}

async fn assert_access_capped_at_five(db: SqlitePersistenceClient) {
    session_with_messages(&db, "s1", 2).await;
    let link = db.create_shared_link("s1", 1, 5, None).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let db = db.clone();
            let token = link.share_id.clone();
            tokio::spawn(async move { db.access_shared_link(&token).await })
        })
        .collect();

    let mut granted = 0;
    let mut limit_reached = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(PersistError::LinkRejected(LinkRejection::LimitReached)) => limit_reached += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(granted, 5);
    assert_eq!(limit_reached, 15);
    let info = db.get_shared_link(&link.share_id).await.unwrap().unwrap();
    assert_eq!(info.view_count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access_never_exceeds_max_views() {
    assert_access_capped_at_five(client().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access_on_connection_pool() {
    let dir = tempfile::tempdir().unwrap();
    assert_access_capped_at_five(file_client(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_on_connection_pool_get_distinct_orders() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_client(&dir).await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.save_message(NewMessage::new("s1", 1, Role::User, format!("m{}", i)))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let orders: Vec<i64> = db
        .get_messages("s1")
        .await
        .unwrap()
        .iter()
        .map(|m| m.message_order)
        .collect();
    assert_eq!(orders, (1..=40).collect::<Vec<i64>>());
    let session = db.get_session("s1", 1).await.unwrap().unwrap();
    assert_eq!(session.message_count, 40);
}

#[tokio::test]
async fn test_link_update_and_delete_are_owner_only() {
    let db = client().await;
    db.find_or_create_session("s1", 1, "m").await.unwrap();
    let link = db.create_shared_link("s1", 1, 3, None).await.unwrap();

    let patch = SharedLinkPatch {
        max_views: Some(10),
        expires_at: Some(Some(Utc::now() + Duration::days(1))),
        ..Default::default()
    };
    let err = db
        .update_shared_link(&link.share_id, 2, patch.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::SharedLinkNotFound(_)));

    let updated = db.update_shared_link(&link.share_id, 1, patch).await.unwrap();
    assert_eq!(updated.max_views, 10);
    assert!(updated.expires_at.is_some());
    assert!(updated.is_public);

    let cleared = db
        .update_shared_link(
            &link.share_id,
            1,
            SharedLinkPatch {
                expires_at: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.expires_at, None);
    assert_eq!(cleared.max_views, 10);

    assert!(db.delete_shared_link(&link.share_id, 2).await.is_err());
    db.delete_shared_link(&link.share_id, 1).await.unwrap();
    assert!(db.list_shared_links(1).await.unwrap().is_empty());
}
