use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database-agnostic session model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
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

impl Session {
    pub fn default_title(model_name: &str) -> String {
        format!("Chat with {}", model_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}
