use chrono::{DateTime, Utc};
use chatline_llm::Role;

use crate::error::PersistError;
use crate::models::{DBMessage, Session, SharedLink, UserApiConfig};

// SQLite row shapes. Timestamps are stored as RFC 3339 text.

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub session_id: String,
    pub user_id: i64,
    pub title: String,
    pub model_name: String,
    pub persona_name: Option<String>,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub user_id: i64,
    pub role: String,
    pub content: String,
    pub message_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ApiConfigRow {
    pub id: i64,
    pub user_id: i64,
    pub api_name: String,
    pub api_key: String,
    pub model_name: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SharedLinkRow {
    pub share_id: String,
    pub session_id: String,
    pub created_by: i64,
    pub is_public: bool,
    pub max_views: i64,
    pub view_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// Conversions between database-agnostic and SQLite-specific models

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            title: row.title,
            model_name: row.model_name,
            persona_name: row.persona_name,
            message_count: row.message_count,
            last_message_at: row.last_message_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TryFrom<MessageRow> for DBMessage {
    type Error = PersistError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| PersistError::Internal(format!("message {}: {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            role,
            content: row.content,
            message_order: row.message_order,
            created_at: row.created_at,
        })
    }
}

impl From<ApiConfigRow> for UserApiConfig {
    fn from(row: ApiConfigRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            api_name: row.api_name,
            api_key: row.api_key,
            model_name: row.model_name,
            base_url: row.base_url,
            created_at: row.created_at,
        }
    }
}

impl From<SharedLinkRow> for SharedLink {
    fn from(row: SharedLinkRow) -> Self {
        Self {
            share_id: row.share_id,
            session_id: row.session_id,
            created_by: row.created_by,
            is_public: row.is_public,
            max_views: row.max_views,
            view_count: row.view_count,
            expires_at: row.expires_at,
            last_access_at: row.last_access_at,
            created_at: row.created_at,
        }
    }
}

pub(crate) fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<DBMessage>, PersistError> {
    rows.into_iter().map(DBMessage::try_from).collect()
}

/// Map a UNIQUE violation to `Conflict`, leaving other errors as they are
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> PersistError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => PersistError::Conflict(what()),
        _ => PersistError::Database(err),
    }
}
