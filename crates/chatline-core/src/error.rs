use chatline_persist::{LinkRejection, PersistError};
use thiserror::Error;

/// Failure taxonomy of the chat core
///
/// Cache degradation has no variant: a missing or unreachable cache only
/// changes which tier serves a request, it is never reported to callers.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream model error: {0:#}")]
    Upstream(anyhow::Error),

    #[error("Failed to persist message after {attempts} attempt(s): {source}")]
    Persistence {
        attempts: u32,
        #[source]
        source: PersistError,
    },

    #[error("Shared link rejected: {0}")]
    LinkPolicy(LinkRejection),

    #[error("Client disconnected")]
    Disconnected,

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Persist(PersistError),
}

impl From<PersistError> for ChatError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::SessionNotFound(id) => Self::NotFound(format!("session {}", id)),
            PersistError::SharedLinkNotFound(id) => Self::NotFound(format!("shared link {}", id)),
            PersistError::ApiConfigNotFound { model_name, .. } => {
                Self::NotFound(format!("API configuration for model {}", model_name))
            }
            PersistError::Validation(msg) => Self::Validation(msg),
            PersistError::Conflict(msg) => Self::Conflict(msg),
            PersistError::LinkRejected(reason) => Self::LinkPolicy(reason),
            other => Self::Persist(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_errors_map_to_taxonomy() {
        let err: ChatError = PersistError::ApiConfigNotFound {
            user_id: 7,
            model_name: "gpt-4o".into(),
        }
        .into();
        assert!(matches!(err, ChatError::NotFound(_)));

        let err: ChatError = PersistError::LinkRejected(LinkRejection::Expired).into();
        assert!(matches!(err, ChatError::LinkPolicy(LinkRejection::Expired)));

        let err: ChatError = PersistError::Internal("boom".into()).into();
        assert!(matches!(err, ChatError::Persist(_)));
    }
}
