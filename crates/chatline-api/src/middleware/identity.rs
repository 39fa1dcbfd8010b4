use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity, set by the authentication layer in front of this service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", USER_ID_HEADER)))?;

        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId)
            .ok_or_else(|| ApiError::BadRequest(format!("malformed {} header", USER_ID_HEADER)))
    }
}
