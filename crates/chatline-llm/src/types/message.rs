use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(anyhow::anyhow!("Unknown message role: {}", other)),
        }
    }
}

/// One role/content pair of a conversation, in OpenAI wire shape
///
/// Serializes as `{"role": "user", "content": "..."}` so the same value can be
/// sent upstream and stored in cache snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create human message
    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create AI message
    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}
