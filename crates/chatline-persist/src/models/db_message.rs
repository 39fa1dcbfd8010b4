use chatline_llm::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PersistError, Result};

/// Database-agnostic message model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DBMessage {
    pub id: i64,
    pub session_id: String,
    pub user_id: i64,
    pub role: Role,
    pub content: String,
    /// 1-based position inside the session, assigned by the store
    pub message_order: i64,
    pub created_at: DateTime<Utc>,
}

impl DBMessage {
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }
}

// Conversion: DBMessage → chatline_llm::Message
impl From<DBMessage> for Message {
    fn from(msg: DBMessage) -> Self {
        Message::new(msg.role, msg.content)
    }
}

/// A message about to be appended to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub session_id: String,
    pub user_id: i64,
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    pub fn new(
        session_id: impl Into<String>,
        user_id: i64,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            role,
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(PersistError::Validation("session_id must not be empty".into()));
        }
        if self.content.is_empty() {
            return Err(PersistError::Validation("content must not be empty".into()));
        }
        Ok(())
    }
}

/// One page of a session's history, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<DBMessage>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_validation() {
        assert!(NewMessage::new("s1", 1, Role::User, "hi").validate().is_ok());
        assert!(matches!(
            NewMessage::new("  ", 1, Role::User, "hi").validate(),
            Err(PersistError::Validation(_))
        ));
        assert!(matches!(
            NewMessage::new("s1", 1, Role::Assistant, "").validate(),
            Err(PersistError::Validation(_))
        ));
    }
}
