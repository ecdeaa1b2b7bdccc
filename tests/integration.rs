//! End-to-end scenarios against a stub `BlockchainProvider`, no network
//! I/O, in the spirit of the teacher's own `tests/unit.rs` testing
//! combinators in isolation rather than a live node. Composes `Tracer` +
//! `scorer::score` + `report::build` directly, the same pipeline
//! `KytEngine::analyze` runs internally.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kyt_tracer::cache::memory::MemoryCache;
use kyt_tracer::error::Error;
use kyt_tracer::provider::{BlockchainProvider, ProviderHealth};
use kyt_tracer::report;
use kyt_tracer::scorer::{self, ScoreConfig};
use kyt_tracer::tracer::{TraceConfig, Tracer};
use kyt_tracer::types::{
    Address, AddressMeta, ChainId, InternalTransfer, RiskLevel, RiskTag, TxId, TxRecord,
};

struct StubProvider {
    transactions: HashMap<(String, String), TxRecord>,
    incoming: HashMap<(String, String), Vec<TxRecord>>,
    metas: HashMap<(String, String), AddressMeta>,
    calls: Mutex<u64>,
}

impl StubProvider {
    fn new() -> Self {
        StubProvider {
            transactions: HashMap::new(),
            incoming: HashMap::new(),
            metas: HashMap::new(),
            calls: Mutex::new(0),
        }
    }

    fn with_tx(mut self, tx_id: &str, tx: TxRecord) -> Self {
        self.transactions.insert(("ethereum".into(), tx_id.into()), tx);
        self
    }

    fn with_incoming(mut self, addr: &str, txs: Vec<TxRecord>) -> Self {
        self.incoming.insert(("ethereum".into(), addr.into()), txs);
        self
    }

    fn with_meta(mut self, addr: &str, tags: &[RiskTag]) -> Self {
        self.metas.insert(
            ("ethereum".into(), addr.into()),
            AddressMeta {
                address: Address::from(addr),
                chain: ChainId::new("ethereum"),
                tags: tags.iter().copied().collect(),
                balance: 0.0,
                tx_count: 1,
                first_seen: None,
                last_seen: None,
                label: None,
            },
        );
        self
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
            .unwrap_or_else(|| AddressMeta {
                address: address.clone(),
                chain: chain.clone(),
                tags: BTreeSet::new(),
                balance: 0.0,
                tx_count: 0,
                first_seen: None,
                last_seen: None,
                label: None,
            }))
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
            state: kyt_tracer::provider::circuit_breaker::CircuitState::Closed,
            request_count: *self.calls.lock().unwrap(),
            latest_block: None,
        }
    }
}

fn account_tx(id: &str, from: &str, to: &str, value: f64) -> TxRecord {
    TxRecord::Account {
        id: TxId::from(id),
        chain: ChainId::from("ethereum"),
        from: Address::from(from),
        to: Address::from(to),
        value,
        internal: vec![],
    }
}

/// Like [`account_tx`], but also sources each `(from, to, value)` triple as
/// an internal transfer, so the transaction attributes value to more than
/// one distance-1 address.
fn account_tx_with_internal(
    id: &str,
    from: &str,
    to: &str,
    value: f64,
    internal: Vec<(&str, &str, f64)>,
) -> TxRecord {
    TxRecord::Account {
        id: TxId::from(id),
        chain: ChainId::from("ethereum"),
        from: Address::from(from),
        to: Address::from(to),
        value,
        internal: internal
            .into_iter()
            .map(|(from, to, value)| InternalTransfer {
                from: Address::from(from),
                to: Address::from(to),
                value,
            })
            .collect(),
    }
}

fn config() -> TraceConfig {
    TraceConfig {
        max_addresses_visited: 1000,
        max_api_calls: 1000,
        fetch_parallelism: 4,
        timeout: Duration::from_secs(5),
    }
}

fn score_config() -> ScoreConfig {
    ScoreConfig { contribution_k: 3.0 }
}

async fn run(provider: StubProvider, tx_id: &str, depth: u32) -> kyt_tracer::types::RiskReport {
    let provider: Arc<dyn BlockchainProvider> = Arc::new(provider);
    let cache: Arc<dyn kyt_tracer::cache::Cache> = Arc::new(MemoryCache::new(1000));
    let tracer = Tracer::new(provider, cache, Duration::from_secs(60), config());
    let chain = ChainId::new("ethereum");
    let outcome = tracer.trace(&chain, &TxId::from(tx_id), depth).await.unwrap();
    let risk_score = scorer::score(&outcome.flagged, outcome.circular_paths, &score_config());
    report::build(chain, TxId::from(tx_id), depth, &outcome, risk_score)
}

#[tokio::test]
async fn s1_safe_direct_transfer_has_zero_score() {
    let provider = StubProvider::new()
        .with_tx("0xAA", account_tx("0xAA", "A", "B", 1.0))
        .with_incoming("A", vec![account_tx("0xA1", "C", "A", 1.0)])
        .with_meta("A", &[])
        .with_meta("C", &[]);
    let report = run(provider, "0xAA", 3).await;

    assert_eq!(report.risk_score.score, 0);
    assert_eq!(report.risk_score.level, RiskLevel::Safe);
    assert!(report.flagged_entities.is_empty());
    assert_eq!(report.total_addresses_analyzed, 2);
}

#[tokio::test]
async fn s2_direct_mixer_contact_is_terminal_and_low_risk() {
    let provider = StubProvider::new()
        .with_tx("0xAA", account_tx("0xAA", "A", "B", 1.0))
        .with_meta("A", &[RiskTag::Mixer]);
    let report = run(provider, "0xAA", 3).await;

    assert_eq!(report.flagged_entities.len(), 1);
    assert_eq!(report.flagged_entities[0].address, Address::from("A"));
    assert_eq!(report.flagged_entities[0].distance, 1);
    assert_eq!(report.risk_score.score, 23);
    assert_eq!(report.risk_score.level, RiskLevel::Low);
    assert_eq!(report.total_addresses_analyzed, 1);
}

#[tokio::test]
async fn s3_distant_mixer_through_clean_intermediaries_is_safe() {
    let provider = StubProvider::new()
        .with_tx("0xAA", account_tx("0xAA", "A", "B", 1.0))
        .with_incoming("A", vec![account_tx("0xA1", "X", "A", 1.0)])
        .with_incoming("X", vec![account_tx("0xX1", "mixer", "X", 1.0)])
        .with_meta("A", &[])
        .with_meta("X", &[])
        .with_meta("mixer", &[RiskTag::Mixer]);
    let report = run(provider, "0xAA", 3).await;

    assert_eq!(report.flagged_entities.len(), 1);
    assert_eq!(report.flagged_entities[0].distance, 3);
    assert_eq!(report.risk_score.score, 6);
    assert_eq!(report.risk_score.level, RiskLevel::Safe);
    // A, X and mixer are all counted, clean intermediaries included.
    assert_eq!(report.total_addresses_analyzed, 3);
}

#[tokio::test]
async fn s4_exchange_reduces_score_but_never_below_zero() {
    // The root sources two distinct distance-1 addresses: A (exchange,
    // terminal) via `from`, and D (clean) via an internal transfer. D's own
    // parent C is a mixer at distance 2, so the BFS expands past the clean
    // branch rather than getting stopped by the exchange's terminal status.
    let provider = StubProvider::new()
        .with_tx(
            "0xAA",
            account_tx_with_internal("0xAA", "A", "B", 1.0, vec![("D", "B", 1.0)]),
        )
        .with_incoming("D", vec![account_tx("0xD1", "C", "D", 1.0)])
        .with_meta("A", &[RiskTag::Exchange])
        .with_meta("D", &[])
        .with_meta("C", &[RiskTag::Mixer]);
    let report = run(provider, "0xAA", 3).await;

    assert_eq!(report.flagged_entities.len(), 2);
    assert!(report.risk_score.score < 100);
    // Mixer at distance 2 (|W*D| = 1.0*0.5 = 0.5) outweighs exchange at
    // distance 1 (|W*D| = 0.2*1.0 = 0.2) and sorts first.
    assert_eq!(report.flagged_entities[0].address, Address::from("C"));
    assert_eq!(report.flagged_entities[0].tag, RiskTag::Mixer);
    assert_eq!(report.flagged_entities[1].address, Address::from("A"));
    assert_eq!(report.flagged_entities[1].tag, RiskTag::Exchange);
}

#[tokio::test]
async fn s5_circular_path_is_counted_once_and_noted() {
    // A -> B -> C -> A: the root sources A, which sources B, which sources
    // C, which sources A again (already visited).
    let provider = StubProvider::new()
        .with_tx("0xAA", account_tx("0xAA", "A", "root-to", 1.0))
        .with_incoming("A", vec![account_tx("0xA1", "B", "A", 1.0)])
        .with_incoming("B", vec![account_tx("0xB1", "C", "B", 1.0)])
        .with_incoming("C", vec![account_tx("0xC1", "A", "C", 1.0)])
        .with_meta("A", &[])
        .with_meta("B", &[])
        .with_meta("C", &[]);
    let report = run(provider, "0xAA", 5).await;

    assert_eq!(report.total_addresses_analyzed, 3);
    assert_eq!(report.circular_paths, 1);
    assert!(report
        .risk_score
        .reasons
        .iter()
        .any(|r| r.contains("circular path")));
}

#[tokio::test]
async fn root_transaction_not_found_is_a_fatal_error() {
    let provider: Arc<dyn BlockchainProvider> = Arc::new(StubProvider::new());
    let cache: Arc<dyn kyt_tracer::cache::Cache> = Arc::new(MemoryCache::new(10));
    let tracer = Tracer::new(provider, cache, Duration::from_secs(60), config());
    let err = tracer
        .trace(&ChainId::new("ethereum"), &TxId::from("0xmissing"), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TxNotFound(..)));
}
