use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};

use super::backend::{CacheBackend, CacheError};

/// Connection attempts made before startup gives up on the server
const CONNECT_RETRIES: usize = 2;

/// Redis-backed cache shared by every API instance
///
/// Survives process restarts, so snapshots and partial stream output stay
/// recoverable. The connection manager reconnects on its own; while the
/// server is down every call reports [`CacheError::Unavailable`].
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new_with_backoff(client, 2, 100, CONNECT_RETRIES)
            .await
            .map_err(classify)?;
        tracing::info!("connected to redis cache");
        Ok(Self { conn })
    }
}

/// Connection-level failures mean the cache is unreachable; anything else is a
/// genuine backend error
fn classify(err: RedisError) -> CacheError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        tracing::debug!(error = %err, "redis unreachable");
        CacheError::Unavailable
    } else {
        CacheError::Backend(err.to_string())
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn is_available(&self) -> bool {
        let mut conn = self.conn.clone();
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "redis ping failed");
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(classify)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
            .await
            .map_err(classify)
    }

    async fn append(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.append(key, value).await.map_err(classify)?;

        // The key was created by this append; later appends keep its deadline
        if len == value.len() {
            let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
            conn.expire::<_, ()>(key, secs).await.map_err(classify)?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(classify)
    }
}
