//! Pluggable key→value cache with TTL. Two cooperating instances are used
//! by the engine simultaneously: a per-analysis in-process memoization map
//! (never evicts, confined to one trace) and a persistent backend shared
//! across analyses (must bound its own memory and must never surface a
//! `put` failure to the caller).
//!
//! Concrete backends ([`memory::MemoryCache`], [`rocks::RocksCache`]) are
//! interchangeable implementations of the same [`Cache`] trait, selected at
//! startup by [`crate::config::CacheBackend`] rather than by a string switch
//! (see the design notes on avoiding stringly-typed backend selection).

pub mod memory;
pub mod memo;
pub mod rocks;

use std::time::Duration;

use async_trait::async_trait;

/// Capability set implemented by every cache backend. `put` must not error
/// to the caller: a backend under memory pressure, or one that fails to
/// persist, logs and silently no-ops. Correctness of the engine must never
/// depend on a successful `put`.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn ping(&self) -> bool;
}

/// Opaque-key namespacing, per the cache contract: `tx:{chain}:{tx_id}`,
/// `addr:{chain}:{address}`, `report:{chain}:{tx_id}:{depth}`.
pub mod keys {
    pub fn tx(chain: &str, tx_id: &str) -> String {
        format!("tx:{chain}:{tx_id}")
    }

    pub fn addr(chain: &str, address: &str) -> String {
        format!("addr:{chain}:{address}")
    }

    pub fn report(chain: &str, tx_id: &str, depth: u32) -> String {
        format!("report:{chain}:{tx_id}:{depth}")
    }
}
