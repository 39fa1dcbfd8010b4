use sqlx::SqlitePool;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chat_sessions (
        session_id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        model_name TEXT NOT NULL,
        persona_name TEXT,
        message_count INTEGER NOT NULL DEFAULT 0,
        last_message_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_chat_sessions_user
    ON chat_sessions(user_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        message_order INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (session_id, message_order)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_api_configs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        api_name TEXT NOT NULL,
        api_key TEXT NOT NULL,
        model_name TEXT NOT NULL,
        base_url TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        UNIQUE (user_id, api_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shared_links (
        share_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        created_by INTEGER NOT NULL,
        is_public INTEGER NOT NULL,
        max_views INTEGER NOT NULL,
        view_count INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT,
        last_access_at TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_shared_links_creator
    ON shared_links(created_by, created_at DESC)
    "#,
];

/// Create tables and indexes if they don't exist yet
pub(crate) async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
