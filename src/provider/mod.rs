//! Provider Client: translates `(chain, tx_id)` / `(chain, address)`
//! queries into calls against the external blockchain data service,
//! normalizes chain-family-specific responses into the core's
//! [`TxRecord`]/[`AddressMeta`] shapes, and enforces rate limiting, retry,
//! and circuit-breaking.
//!
//! [`BlockchainProvider`] is a closed capability set (per the design notes:
//! no duck-typed polymorphism, no runtime type sniffing) so that a stub
//! implementation can stand in for the real HTTP client in tests.

pub mod circuit_breaker;
pub mod http;
pub mod normalize;
pub mod rate_limiter;
pub mod single_flight;

use async_trait::async_trait;

use crate::error::Error;
use crate::types::{Address, AddressMeta, ChainId, TxId, TxRecord};
use circuit_breaker::CircuitState;

#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub state: CircuitState,
    pub request_count: u64,
    pub latest_block: Option<u64>,
}

/// Capability set every provider implementation exposes to the [`crate::tracer::Tracer`].
#[async_trait]
pub trait BlockchainProvider: Send + Sync {
    async fn get_transaction(&self, chain: &ChainId, tx_id: &TxId) -> Result<TxRecord, Error>;

    /// A provider reporting no tags for an address returns an empty tag
    /// set, not an error.
    async fn get_address_meta(
        &self,
        chain: &ChainId,
        address: &Address,
    ) -> Result<AddressMeta, Error>;

    /// The most recent incoming transactions to `address`, used by the
    /// tracer to derive `address`'s own upstream sources. Chain-agnostic:
    /// each record's `sources()` yields the next layer's candidates.
    async fn get_incoming_transactions(
        &self,
        chain: &ChainId,
        address: &Address,
    ) -> Result<Vec<TxRecord>, Error>;

    /// Never fails; reports the circuit-breaker state and call count.
    async fn health(&self) -> ProviderHealth;
}
