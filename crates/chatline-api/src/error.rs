use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chatline_core::ChatError;
use chatline_persist::{LinkRejection, PersistError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        Self::Chat(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Chat(err) => match err {
                ChatError::NotFound(_) => StatusCode::NOT_FOUND,
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::Conflict(_) => StatusCode::CONFLICT,
                ChatError::LinkPolicy(reason) => match reason {
                    LinkRejection::NotFound => StatusCode::NOT_FOUND,
                    LinkRejection::Private => StatusCode::FORBIDDEN,
                    LinkRejection::Expired => StatusCode::GONE,
                    LinkRejection::LimitReached => StatusCode::TOO_MANY_REQUESTS,
                },
                ChatError::Upstream(_) | ChatError::Timeout(_) => StatusCode::BAD_GATEWAY,
                ChatError::Persistence { .. }
                | ChatError::Persist(_)
                | ChatError::Disconnected
                | ChatError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "request failed");
            match &self {
                ApiError::Config(_) => "Configuration error".to_string(),
                _ => "Storage error".to_string(),
            }
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
            self.to_string()
        };

        let mut body = json!({ "error": message });
        if let ApiError::Chat(ChatError::LinkPolicy(reason)) = &self {
            body["reason"] = json!(reason);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
