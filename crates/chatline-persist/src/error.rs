use thiserror::Error;

use crate::models::LinkRejection;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No API configuration for model '{model_name}' (user {user_id})")]
    ApiConfigNotFound { user_id: i64, model_name: String },

    #[error("Shared link not found: {0}")]
    SharedLinkNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Shared link rejected: {0}")]
    LinkRejected(LinkRejection),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PersistError {
    /// True for errors caused by the caller's input rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::ApiConfigNotFound { .. }
                | Self::SharedLinkNotFound(_)
                | Self::Validation(_)
                | Self::Conflict(_)
                | Self::LinkRejected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;
