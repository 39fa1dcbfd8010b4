use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend cannot be reached; distinct from a key that is simply absent
    #[error("cache unavailable")]
    Unavailable,

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store with per-key expiry
///
/// A miss is `Ok(None)`. Implementations report an unreachable store as
/// [`CacheError::Unavailable`] and must never panic on it.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Whether the store can currently serve requests
    async fn is_available(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Append to a string value, creating it if needed. `ttl` is applied only
    /// when the key is created; later appends keep the original deadline.
    async fn append(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Backend for deployments without a cache; every call reports unavailability
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCache;

#[async_trait]
impl CacheBackend for UnavailableCache {
    async fn is_available(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn append(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }
}
