use chrono::Utc;
use sqlx::SqlitePool;

use crate::dbs::sqlite::models::{conflict_on_unique, SessionRow};
use crate::error::{PersistError, Result};
use crate::models::{Session, SessionPage, SessionPatch};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 30;

const SESSION_COLUMNS: &str = "session_id, user_id, title, model_name, persona_name, \
     message_count, last_message_at, created_at, updated_at";

#[derive(Clone)]
pub(crate) struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_or_create(
        &self,
        session_id: &str,
        user_id: i64,
        model_name: &str,
    ) -> Result<Session> {
        if session_id.trim().is_empty() || model_name.trim().is_empty() {
            return Err(PersistError::Validation(
                "session_id and model_name must not be empty".into(),
            ));
        }

        if let Some(existing) = self.get(session_id, user_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let session = Session {
            session_id: session_id.to_string(),
            user_id,
            title: Session::default_title(model_name),
            model_name: model_name.to_string(),
            persona_name: None,
            message_count: 0,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO chat_sessions
                (session_id, user_id, title, model_name, message_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id)
        .bind(&session.title)
        .bind(&session.model_name)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || format!("session {} belongs to another user", session_id))
        })?;

        tracing::info!(session_id = %session_id, user_id, title = %session.title, "created chat session");
        Ok(session)
    }

    pub async fn get(&self, session_id: &str, user_id: i64) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM chat_sessions WHERE session_id = ? AND user_id = ?",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    pub async fn list(
        &self,
        user_id: i64,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<SessionPage> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chat_sessions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {} FROM chat_sessions
            WHERE user_id = ?
            ORDER BY COALESCE(last_message_at, created_at) DESC, session_id
            LIMIT ? OFFSET ?
            "#,
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(SessionPage {
            sessions: rows.into_iter().map(Session::from).collect(),
            total,
            page,
            page_size,
        })
    }

    pub async fn update(
        &self,
        session_id: &str,
        user_id: i64,
        patch: SessionPatch,
    ) -> Result<Session> {
        patch.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE chat_sessions
            SET title = COALESCE(?, title),
                persona_name = COALESCE(?, persona_name),
                updated_at = ?
            WHERE session_id = ? AND user_id = ?
            "#,
        )
        .bind(patch.title)
        .bind(patch.persona_name)
        .bind(Utc::now())
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistError::SessionNotFound(session_id.to_string()));
        }

        self.get(session_id, user_id)
            .await?
            .ok_or_else(|| PersistError::SessionNotFound(session_id.to_string()))
    }

    /// Remove the session, its messages and its shared links in one transaction
    pub async fn delete_cascade(&self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(PersistError::Validation("session_id must not be empty".into()));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM shared_links WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(session_id = %session_id, "deleted chat session");
        Ok(())
    }
}
