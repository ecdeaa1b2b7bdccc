//! Persistent [`Cache`] backend over RocksDB.
//!
//! Grounded in the teacher's `threads/index_addresses.rs::Database`, which
//! wraps a plain `rocksdb::DB` and performs its writes off the async
//! executor; this backend follows the same "open once, operate through
//! blocking calls dispatched via `tokio::task::spawn_blocking`" shape. TTL
//! is implemented by prefixing every stored value with an 8-byte
//! little-endian expiry (unix millis), since RocksDB itself has no native
//! per-key TTL in the column family configuration the teacher uses.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rocksdb::{Options, DB};

use super::Cache;

pub struct RocksCache {
    db: Arc<DB>,
}

impl RocksCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(RocksCache { db: Arc::new(db) })
    }

    fn encode(value: Vec<u8>, ttl: Duration) -> Vec<u8> {
        let expires_at_ms = now_ms() + ttl.as_millis() as u64;
        let mut buf = Vec::with_capacity(8 + value.len());
        buf.extend_from_slice(&expires_at_ms.to_le_bytes());
        buf.extend(value);
        buf
    }

    fn decode(raw: Vec<u8>) -> Option<Vec<u8>> {
        if raw.len() < 8 {
            return None;
        }
        let expires_at_ms = u64::from_le_bytes(raw[..8].try_into().ok()?);
        if expires_at_ms <= now_ms() {
            return None;
        }
        Some(raw[8..].to_vec())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[async_trait]
impl Cache for RocksCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let db = self.db.clone();
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || db.get(key.as_bytes())).await;
        match result {
            Ok(Ok(Some(raw))) => Self::decode(raw),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                log::warn!("rocks cache get failed: {e}");
                None
            }
            Err(e) => {
                log::warn!("rocks cache get task panicked: {e}");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let db = self.db.clone();
        let key = key.to_string();
        let encoded = Self::encode(value, ttl);
        let result =
            tokio::task::spawn_blocking(move || db.put(key.as_bytes(), encoded)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("rocks cache put failed, continuing without persistence: {e}"),
            Err(e) => log::warn!("rocks cache put task panicked: {e}"),
        }
    }

    async fn ping(&self) -> bool {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.get(b"__ping__").is_ok())
            .await
            .unwrap_or(false)
    }
}
