//! Remote cache tier
//!
//! The cache is an optional acceleration layer. [`CacheBackend`] is the seam to
//! the key/value store; [`CacheService`] layers the three independent regions
//! (session snapshot, stream buffer, model config) and the retrying message
//! persistence helper on top of it.

mod backend;
mod memory;
mod remote;
mod service;

pub use backend::{CacheBackend, CacheError, UnavailableCache};
pub use memory::MemoryCache;
pub use remote::RedisCache;
pub use service::{
    CacheService, CacheSettings, CachedSession, MessageWriter, FULL_SESSION_PREFIX,
    MODEL_CONFIG_PREFIX, STREAM_RESPONSE_PREFIX,
};
