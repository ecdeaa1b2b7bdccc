//! Tracer: bounded BFS upstream from a transaction's source addresses, per
//! the algorithm in the engine design. Concurrency within a layer follows
//! the teacher's `state.rs::preload_prevouts` pattern:
//! `buffer_unordered(fetch_parallelism)`, joined and sorted before the
//! next layer is expanded, never spawn-and-forget.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::cache::{keys, memo::Memo, Cache};
use crate::error::Error;
use crate::metrics;
use crate::provider::BlockchainProvider;
use crate::types::{Address, AddressMeta, ChainId, FlaggedEntity, TraceNode, TxId, TxRecord};

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub max_addresses_visited: usize,
    pub max_api_calls: u64,
    pub fetch_parallelism: usize,
    pub timeout: Duration,
}

/// Everything the Risk Scorer needs, plus the bookkeeping the final report
/// surfaces verbatim (`addresses_analyzed`, `transactions_traced`, …).
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    pub flagged: Vec<FlaggedEntity>,
    pub unflagged_count: usize,
    pub circular_paths: u32,
    pub total_addresses_analyzed: usize,
    pub transactions_traced: usize,
    pub api_calls_used: u64,
    /// Human-readable notes: bounded-traversal reasons and per-node
    /// degradation notices, folded into the final report's `reasons`.
    pub notes: Vec<String>,
}

pub struct Tracer {
    provider: Arc<dyn BlockchainProvider>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
    config: TraceConfig,
}

impl Tracer {
    pub fn new(
        provider: Arc<dyn BlockchainProvider>,
        cache: Arc<dyn Cache>,
        cache_ttl: Duration,
        config: TraceConfig,
    ) -> Self {
        Tracer {
            provider,
            cache,
            cache_ttl,
            config,
        }
    }

    /// Fetches a transaction via the provider, consulting the per-analysis
    /// memo first and the persistent cache second, writing back to both on
    /// a miss. Mirrors `get_address_meta_cached` below.
    async fn get_transaction_cached(
        &self,
        memo: &Memo,
        chain: &ChainId,
        tx_id: &TxId,
    ) -> Result<TxRecord, Error> {
        let key = keys::tx(chain.as_str(), tx_id.as_str());
        if let Some(bytes) = memo.get(&key).await {
            metrics::CACHE_OUTCOMES.with_label_values(&["tx", "hit"]).inc();
            return serde_json::from_slice(&bytes).map_err(Error::from);
        }
        if let Some(bytes) = self.cache.get(&key).await {
            metrics::CACHE_OUTCOMES.with_label_values(&["tx", "hit"]).inc();
            memo.put(key, bytes.clone()).await;
            return serde_json::from_slice(&bytes).map_err(Error::from);
        }
        metrics::CACHE_OUTCOMES.with_label_values(&["tx", "miss"]).inc();
        let record = self.provider.get_transaction(chain, tx_id).await?;
        if let Ok(bytes) = serde_json::to_vec(&record) {
            self.cache.put(&key, bytes.clone(), self.cache_ttl).await;
            memo.put(key, bytes).await;
        }
        Ok(record)
    }

    async fn get_address_meta_cached(
        &self,
        memo: &Memo,
        chain: &ChainId,
        address: &Address,
    ) -> Result<AddressMeta, Error> {
        let key = keys::addr(chain.as_str(), address.as_str());
        if let Some(bytes) = memo.get(&key).await {
            metrics::CACHE_OUTCOMES
                .with_label_values(&["address", "hit"])
                .inc();
            return serde_json::from_slice(&bytes).map_err(Error::from);
        }
        if let Some(bytes) = self.cache.get(&key).await {
            metrics::CACHE_OUTCOMES
                .with_label_values(&["address", "hit"])
                .inc();
            memo.put(key, bytes.clone()).await;
            return serde_json::from_slice(&bytes).map_err(Error::from);
        }
        metrics::CACHE_OUTCOMES
            .with_label_values(&["address", "miss"])
            .inc();
        let meta = self.provider.get_address_meta(chain, address).await?;
        if let Ok(bytes) = serde_json::to_vec(&meta) {
            self.cache.put(&key, bytes.clone(), self.cache_ttl).await;
            memo.put(key, bytes).await;
        }
        Ok(meta)
    }

    pub async fn trace(
        &self,
        chain: &ChainId,
        tx_id: &TxId,
        depth: u32,
    ) -> Result<TraceOutcome, Error> {
        match tokio::time::timeout(self.config.timeout, self.trace_inner(chain, tx_id, depth)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::PartialDegradation(format!(
                "analysis for {tx_id} on {chain} exceeded its {:?} wall-clock budget",
                self.config.timeout
            ))),
        }
    }

    async fn trace_inner(
        &self,
        chain: &ChainId,
        tx_id: &TxId,
        depth: u32,
    ) -> Result<TraceOutcome, Error> {
        let start = Instant::now();
        crate::chains::lookup(chain)?;
        let memo = Memo::new();

        let root = self.get_transaction_cached(&memo, chain, tx_id).await?;
        let mut api_calls_used: u64 = 1;
        let mut transactions_traced: usize = 1;

        let mut visited: HashMap<Address, TraceNode> = HashMap::new();
        let mut flagged: Vec<FlaggedEntity> = Vec::new();
        let mut circular_paths: u32 = 0;
        let mut notes: Vec<String> = Vec::new();

        let mut current_layer = merge_contributions(root.sources());
        let mut d: u32 = 1;

        while d <= depth && !current_layer.is_empty() {
            if visited.len() >= self.config.max_addresses_visited {
                notes.push(format!(
                    "traversal bounded by max_addresses_visited ({})",
                    self.config.max_addresses_visited
                ));
                break;
            }
            if api_calls_used >= self.config.max_api_calls {
                notes.push(format!(
                    "traversal bounded by max_api_calls ({})",
                    self.config.max_api_calls
                ));
                break;
            }
            if start.elapsed() >= self.config.timeout {
                notes.push("traversal bounded by wall-clock timeout".to_string());
                break;
            }

            let mut to_fetch: Vec<(Address, f64)> = Vec::new();
            for (addr, contrib) in current_layer.drain(..) {
                if let Some(node) = visited.get_mut(&addr) {
                    node.contribution += contrib;
                    circular_paths += 1;
                } else {
                    to_fetch.push((addr, contrib));
                }
            }
            let mut to_fetch = merge_contributions(to_fetch);
            to_fetch.sort_by(|a, b| a.0.cmp(&b.0));

            let remaining_capacity = self
                .config
                .max_addresses_visited
                .saturating_sub(visited.len());
            if to_fetch.len() > remaining_capacity {
                notes.push(format!(
                    "traversal bounded by max_addresses_visited ({})",
                    self.config.max_addresses_visited
                ));
                to_fetch.truncate(remaining_capacity);
            }

            let chain_owned = chain.clone();
            let mut fetched: Vec<(Address, f64, Result<AddressMeta, Error>)> = stream::iter(
                to_fetch.into_iter().map(|(addr, contrib)| {
                    let chain = chain_owned.clone();
                    let memo = &memo;
                    async move {
                        let res = self.get_address_meta_cached(memo, &chain, &addr).await;
                        (addr, contrib, res)
                    }
                }),
            )
            .buffer_unordered(self.config.fetch_parallelism)
            .collect()
            .await;
            api_calls_used += fetched.len() as u64;
            fetched.sort_by(|a, b| a.0.cmp(&b.0));

            let mut next_layer: Vec<(Address, f64)> = Vec::new();

            for (addr, contrib, meta_result) in fetched {
                let (tags, label, meta_unavailable): (BTreeSet<_>, Option<String>, bool) =
                    match meta_result {
                        Ok(meta) => (meta.tags, meta.label, false),
                        Err(_) => (BTreeSet::new(), None, true),
                    };
                let terminal_by_tag = tags.iter().any(|t| t.is_definitive());

                visited.insert(
                    addr.clone(),
                    TraceNode {
                        address: addr.clone(),
                        distance: d,
                        contribution: contrib,
                        tags: tags.clone(),
                        terminal: terminal_by_tag || meta_unavailable,
                        meta_unavailable,
                    },
                );

                if meta_unavailable {
                    notes.push(format!(
                        "metadata unavailable for {addr}, treated as terminal"
                    ));
                    continue;
                }

                if terminal_by_tag {
                    if let Some(tag) = tags
                        .iter()
                        .filter(|t| t.is_definitive())
                        .max_by(|a, b| a.weight().partial_cmp(&b.weight()).unwrap())
                    {
                        flagged.push(FlaggedEntity {
                            address: addr.clone(),
                            tag: *tag,
                            distance: d,
                            contribution: contrib,
                            label,
                        });
                    }
                    continue;
                }

                if d == depth {
                    continue;
                }

                match self.provider.get_incoming_transactions(chain, &addr).await {
                    Ok(txs) => {
                        api_calls_used += 1;
                        transactions_traced += txs.len();
                        let sources: Vec<(Address, f64)> =
                            txs.iter().flat_map(|t| t.sources()).collect();
                        let merged = merge_contributions(sources);
                        let total: f64 = merged.iter().map(|(_, v)| v).sum();
                        if total > 0.0 {
                            for (parent, value) in merged {
                                next_layer.push((parent, contrib * (value / total)));
                            }
                        }
                    }
                    Err(_) => {
                        api_calls_used += 1;
                        notes.push(format!(
                            "incoming transactions unavailable for {addr}, treated as terminal"
                        ));
                    }
                }

                if api_calls_used >= self.config.max_api_calls {
                    notes.push(format!(
                        "traversal bounded by max_api_calls ({})",
                        self.config.max_api_calls
                    ));
                    break;
                }
            }

            current_layer = next_layer;
            d += 1;
        }

        let unflagged_count = visited.len().saturating_sub(flagged.len());

        Ok(TraceOutcome {
            flagged,
            unflagged_count,
            circular_paths,
            total_addresses_analyzed: visited.len(),
            transactions_traced,
            api_calls_used,
            notes,
        })
    }
}

fn merge_contributions(entries: impl IntoIterator<Item = (Address, f64)>) -> Vec<(Address, f64)> {
    let mut merged: HashMap<Address, f64> = HashMap::new();
    for (addr, value) in entries {
        *merged.entry(addr).or_insert(0.0) += value;
    }
    merged.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderHealth;
    use crate::types::{RiskTag, TxRecord};
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct StubProvider {
        transactions: StdHashMap<(String, String), TxRecord>,
        incoming: StdHashMap<(String, String), Vec<TxRecord>>,
        metas: StdHashMap<(String, String), AddressMeta>,
        calls: Mutex<u64>,
    }

    impl StubProvider {
        fn new() -> Self {
            StubProvider {
                transactions: StdHashMap::new(),
                incoming: StdHashMap::new(),
                metas: StdHashMap::new(),
                calls: Mutex::new(0),
            }
        }

        fn with_tx(mut self, chain: &str, tx_id: &str, tx: TxRecord) -> Self {
            self.transactions.insert((chain.into(), tx_id.into()), tx);
            self
        }

        fn with_incoming(mut self, chain: &str, addr: &str, txs: Vec<TxRecord>) -> Self {
            self.incoming.insert((chain.into(), addr.into()), txs);
            self
        }

        fn with_meta(mut self, chain: &str, addr: &str, meta: AddressMeta) -> Self {
            self.metas.insert((chain.into(), addr.into()), meta);
            self
        }
    }

    fn empty_meta(chain: &str, addr: &str) -> AddressMeta {
        AddressMeta {
            address: Address::from(addr),
            chain: ChainId::new(chain),
            tags: BTreeSet::new(),
            balance: 0.0,
            tx_count: 0,
            first_seen: None,
            last_seen: None,
            label: None,
        }
    }

    #[async_trait]
    impl BlockchainProvider for StubProvider {
        async fn get_transaction(&self, chain: &ChainId, tx_id: &TxId) -> Result<TxRecord, Error> {
            *self.calls.lock().unwrap() += 1;
            self.transactions
                .get(&(chain.as_str().to_string(), tx_id.as_str().to_string()))
                .cloned()
                .ok_or_else(|| Error::TxNotFound(tx_id.as_str().to_string(), chain.clone()))
        }

        async fn get_address_meta(
            &self,
            chain: &ChainId,
            address: &Address,
        ) -> Result<AddressMeta, Error> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .metas
                .get(&(chain.as_str().to_string(), address.as_str().to_string()))
                .cloned()
                .unwrap_or_else(|| empty_meta(chain.as_str(), address.as_str())))
        }

        async fn get_incoming_transactions(
            &self,
            chain: &ChainId,
            address: &Address,
        ) -> Result<Vec<TxRecord>, Error> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .incoming
                .get(&(chain.as_str().to_string(), address.as_str().to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn health(&self) -> ProviderHealth {
            ProviderHealth {
                state: crate::provider::circuit_breaker::CircuitState::Closed,
                request_count: *self.calls.lock().unwrap(),
                latest_block: None,
            }
        }
    }

    fn default_config() -> TraceConfig {
        TraceConfig {
            max_addresses_visited: 1000,
            max_api_calls: 1000,
            fetch_parallelism: 4,
            timeout: Duration::from_secs(5),
        }
    }

    fn test_cache() -> Arc<dyn Cache> {
        Arc::new(crate::cache::memory::MemoryCache::new(1000))
    }

    fn tracer_with(provider: Arc<dyn BlockchainProvider>, config: TraceConfig) -> Tracer {
        Tracer::new(provider, test_cache(), Duration::from_secs(60), config)
    }

    #[tokio::test]
    async fn stops_expansion_at_a_directly_tagged_source() {
        let root = TxRecord::Account {
            id: TxId::from("0xroot"),
            chain: ChainId::from("ethereum"),
            from: Address::from("0xmixer"),
            to: Address::from("0xvictim"),
            value: 10.0,
            internal: vec![],
        };
        let mut tagged = BTreeSet::new();
        tagged.insert(RiskTag::Mixer);
        let meta = AddressMeta {
            address: Address::from("0xmixer"),
            chain: ChainId::new("ethereum"),
            tags: tagged,
            balance: 0.0,
            tx_count: 1,
            first_seen: None,
            last_seen: None,
            label: Some("Known Mixer".into()),
        };
        let provider = Arc::new(
            StubProvider::new()
                .with_tx("ethereum", "0xroot", root)
                .with_meta("ethereum", "0xmixer", meta),
        );
        let tracer = tracer_with(provider, default_config());
        let outcome = tracer
            .trace(&ChainId::new("ethereum"), &TxId::from("0xroot"), 3)
            .await
            .unwrap();

        assert_eq!(outcome.flagged.len(), 1);
        assert_eq!(outcome.flagged[0].tag, RiskTag::Mixer);
        assert_eq!(outcome.flagged[0].distance, 1);
        assert_eq!(outcome.total_addresses_analyzed, 1);
    }

    #[tokio::test]
    async fn revisiting_an_already_visited_address_increments_circular_paths() {
        // 0xshared is reached directly at distance 1 (as a root source) and
        // again at distance 2 (as 0xb's own source) — the second encounter
        // must merge into the existing node, not re-expand it.
        let root = TxRecord::Account {
            id: TxId::from("0xroot"),
            chain: ChainId::from("ethereum"),
            from: Address::from("0xa"),
            to: Address::from("0xvictim"),
            value: 2.0,
            internal: vec![
                InternalTransferStub::from("0xb", "0xvictim", 2.0),
                InternalTransferStub::from("0xshared", "0xvictim", 1.0),
            ],
        };
        let provider = Arc::new(
            StubProvider::new()
                .with_tx("ethereum", "0xroot", root)
                .with_incoming(
                    "ethereum",
                    "0xb",
                    vec![TxRecord::Account {
                        id: TxId::from("0xtx_b"),
                        chain: ChainId::from("ethereum"),
                        from: Address::from("0xshared"),
                        to: Address::from("0xb"),
                        value: 2.0,
                        internal: vec![],
                    }],
                )
                .with_meta("ethereum", "0xa", empty_meta("ethereum", "0xa"))
                .with_meta("ethereum", "0xb", empty_meta("ethereum", "0xb"))
                .with_meta("ethereum", "0xshared", empty_meta("ethereum", "0xshared")),
        );
        let tracer = tracer_with(provider, default_config());
        let outcome = tracer
            .trace(&ChainId::new("ethereum"), &TxId::from("0xroot"), 3)
            .await
            .unwrap();

        assert_eq!(outcome.circular_paths, 1);
        // 0xa, 0xb, 0xshared only: 0xshared is visited once, not twice.
        assert_eq!(outcome.total_addresses_analyzed, 3);
    }

    #[tokio::test]
    async fn provider_error_on_non_root_fetch_degrades_node_instead_of_aborting() {
        let root = TxRecord::Account {
            id: TxId::from("0xroot"),
            chain: ChainId::from("ethereum"),
            from: Address::from("0xunknown"),
            to: Address::from("0xvictim"),
            value: 1.0,
            internal: vec![],
        };
        // No meta registered for "0xunknown" -> StubProvider::get_address_meta
        // falls back to an empty meta rather than erroring, so instead
        // simulate the degraded case via a provider whose address lookup
        // always errors for this one address.
        struct FlakyProvider(Arc<StubProvider>);

        #[async_trait]
        impl BlockchainProvider for FlakyProvider {
            async fn get_transaction(
                &self,
                chain: &ChainId,
                tx_id: &TxId,
            ) -> Result<TxRecord, Error> {
                self.0.get_transaction(chain, tx_id).await
            }

            async fn get_address_meta(
                &self,
                chain: &ChainId,
                address: &Address,
            ) -> Result<AddressMeta, Error> {
                if address.as_str() == "0xunknown" {
                    return Err(Error::ProviderDown("simulated outage".into()));
                }
                self.0.get_address_meta(chain, address).await
            }

            async fn get_incoming_transactions(
                &self,
                chain: &ChainId,
                address: &Address,
            ) -> Result<Vec<TxRecord>, Error> {
                self.0.get_incoming_transactions(chain, address).await
            }

            async fn health(&self) -> ProviderHealth {
                self.0.health().await
            }
        }

        let inner = Arc::new(StubProvider::new().with_tx("ethereum", "0xroot", root));
        let provider = Arc::new(FlakyProvider(inner));
        let tracer = tracer_with(provider, default_config());
        let outcome = tracer
            .trace(&ChainId::new("ethereum"), &TxId::from("0xroot"), 3)
            .await
            .unwrap();

        assert!(outcome.flagged.is_empty());
        assert_eq!(outcome.total_addresses_analyzed, 1);
        assert!(outcome
            .notes
            .iter()
            .any(|n| n.contains("metadata unavailable")));
    }

    #[tokio::test]
    async fn root_not_found_is_fatal() {
        let provider = Arc::new(StubProvider::new());
        let tracer = tracer_with(provider, default_config());
        let err = tracer
            .trace(&ChainId::new("ethereum"), &TxId::from("0xmissing"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TxNotFound(..)));
    }

    #[tokio::test]
    async fn max_addresses_visited_bounds_traversal_and_notes_it() {
        let root = TxRecord::Account {
            id: TxId::from("0xroot"),
            chain: ChainId::from("ethereum"),
            from: Address::from("0xa"),
            to: Address::from("0xvictim"),
            value: 1.0,
            internal: vec![InternalTransferStub::from("0xb", "0xvictim", 1.0)],
        };
        let provider = Arc::new(
            StubProvider::new()
                .with_tx("ethereum", "0xroot", root)
                .with_meta("ethereum", "0xa", empty_meta("ethereum", "0xa"))
                .with_meta("ethereum", "0xb", empty_meta("ethereum", "0xb")),
        );
        let mut cfg = default_config();
        cfg.max_addresses_visited = 1;
        let tracer = tracer_with(provider, cfg);
        let outcome = tracer
            .trace(&ChainId::new("ethereum"), &TxId::from("0xroot"), 3)
            .await
            .unwrap();

        assert_eq!(outcome.total_addresses_analyzed, 1);
        assert!(outcome
            .notes
            .iter()
            .any(|n| n.contains("max_addresses_visited")));
    }

    /// Small helper so tests can build `InternalTransfer` without importing
    /// it directly into every test's namespace.
    struct InternalTransferStub;
    impl InternalTransferStub {
        fn from(from: &str, to: &str, value: f64) -> crate::types::InternalTransfer {
            crate::types::InternalTransfer {
                from: Address::from(from),
                to: Address::from(to),
                value,
            }
        }
    }
}
