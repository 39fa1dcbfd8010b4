use chrono::Utc;
use sqlx::SqlitePool;

use crate::dbs::sqlite::models::{into_messages, MessageRow};
use crate::error::{PersistError, Result};
use crate::models::{DBMessage, MessagePage, NewMessage};

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Clone)]
pub(crate) struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message and bump the owning session's counters
    pub async fn save(&self, message: NewMessage) -> Result<DBMessage> {
        message.validate()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before the order is read
        let bumped = sqlx::query(
            r#"
            UPDATE chat_sessions
            SET message_count = message_count + 1, last_message_at = ?, updated_at = ?
            WHERE session_id = ? AND user_id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(&message.session_id)
        .bind(message.user_id)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            return Err(PersistError::SessionNotFound(message.session_id));
        }

        let (message_order,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(message_order), 0) + 1 FROM chat_messages WHERE session_id = ?",
        )
        .bind(&message.session_id)
        .fetch_one(&mut *tx)
        .await?;

        let id = sqlx::query(
            r#"
            INSERT INTO chat_messages (session_id, user_id, role, content, message_order, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.session_id)
        .bind(message.user_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message_order)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(DBMessage {
            id,
            session_id: message.session_id,
            user_id: message.user_id,
            role: message.role,
            content: message.content,
            message_order,
            created_at: now,
        })
    }

    pub async fn list(&self, session_id: &str) -> Result<Vec<DBMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, user_id, role, content, message_order, created_at
            FROM chat_messages
            WHERE session_id = ?
            ORDER BY message_order
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }

    pub async fn page(
        &self,
        session_id: &str,
        before_order: Option<i64>,
        limit: Option<i64>,
    ) -> Result<MessagePage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);

        // One extra row tells whether older history remains
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, user_id, role, content, message_order, created_at
            FROM chat_messages
            WHERE session_id = ? AND message_order < ?
            ORDER BY message_order DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(before_order.unwrap_or(i64::MAX))
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = into_messages(rows)?;
        let has_more = messages.len() as i64 > limit;
        messages.truncate(limit as usize);
        messages.reverse();

        Ok(MessagePage { messages, has_more })
    }
}
