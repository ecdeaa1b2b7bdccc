//! In-memory LRU-capped [`Cache`] backend, suitable for tests and dev.
//!
//! Modeled on the teacher's `state.rs`, which keeps a capped
//! `bitcoin_slices::SliceCache`/`lru`-shaped cache of recently seen
//! transactions behind a `tokio::sync::Mutex`; this backend follows the
//! same shape but is generic over opaque byte values with an explicit TTL.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use super::Cache;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// A process-wide, capped, last-writer-wins cache. Eviction is LRU once
/// `max_entries` is reached; expired entries are also reclaimed lazily on
/// `get`.
pub struct MemoryCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        MemoryCache {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        match inner.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.pop(key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner.put(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn ping(&self) -> bool {
        true
    }
}
