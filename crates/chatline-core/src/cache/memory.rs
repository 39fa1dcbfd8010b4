use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::backend::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Store {
    entries: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Store {
    /// Drop every expired entry once `interval` has passed since the last sweep
    fn sweep_if_due(&mut self, now: Instant, interval: Duration) {
        if now.duration_since(self.last_sweep) < interval {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        self.last_sweep = now;

        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "expired cache entries swept");
        }
    }
}

/// In-process TTL cache
///
/// Expired entries are dropped when touched, and writes sweep the whole map
/// at most once per sweep interval so idle keys do not accumulate.
/// Reachability can be toggled at runtime to exercise degraded-cache paths.
#[derive(Debug)]
pub struct MemoryCache {
    store: RwLock<Store>,
    sweep_interval: Duration,
    available: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            store: RwLock::new(Store {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            sweep_interval,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.store
            .read()
            .await
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of entries held in memory, expired ones not yet swept included
    pub async fn stored_len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable)
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut store = self.store.write().await;
        match store.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        store.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut store = self.store.write().await;
        store.sweep_if_due(now, self.sweep_interval);
        store.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn append(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut store = self.store.write().await;
        store.sweep_if_due(now, self.sweep_interval);
        if let Some(entry) = store.entries.get_mut(key).filter(|e| e.is_live(now)) {
            entry.value.push_str(value);
            return Ok(());
        }
        store.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.store.write().await.entries.remove(key);
        Ok(())
    }
}
