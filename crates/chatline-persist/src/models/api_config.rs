use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PersistError, Result};

/// Upstream credentials a user registered for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserApiConfig {
    pub id: i64,
    pub user_id: i64,
    pub api_name: String,
    pub api_key: String,
    pub model_name: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApiConfig {
    pub api_name: String,
    pub api_key: String,
    pub model_name: String,
    #[serde(default)]
    pub base_url: String,
}

impl NewApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_name.trim().is_empty() {
            return Err(PersistError::Validation("api_name must not be empty".into()));
        }
        if self.api_key.is_empty() {
            return Err(PersistError::Validation("api_key must not be empty".into()));
        }
        if self.model_name.trim().is_empty() {
            return Err(PersistError::Validation("model_name must not be empty".into()));
        }
        Ok(())
    }
}
