//! The core data model: chains, transactions, addresses, risk tags, and the
//! trace/report shapes produced by an analysis.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, per-chain chain identifier, e.g. `"bitcoin"`, `"ethereum"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn new(s: impl Into<String>) -> Self {
        ChainId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        ChainId(s.to_string())
    }
}

/// Opaque transaction identifier; format is per-chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self {
        TxId(s.to_string())
    }
}

impl From<String> for TxId {
    fn from(s: String) -> Self {
        TxId(s)
    }
}

/// Opaque address; format is per-chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Account-based (Ethereum-style) vs UTXO-based (Bitcoin-style) chains.
/// Parser selection is by family, never by runtime type sniffing of the
/// provider's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    Account,
    Utxo,
}

/// Static row of the chain registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    pub id: ChainId,
    pub family: ChainFamily,
    pub display_name: &'static str,
    pub decimals: u32,
    pub api_path: &'static str,
    pub native_symbol: &'static str,
}

/// One internal (nested) value transfer inside an account-family
/// transaction, e.g. a contract-internal call that moves value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub from: Address,
    pub to: Address,
    pub value: f64,
}

/// One UTXO input: an attributable spending address and the value it
/// contributed, or `None` for an unattributable (coinbase) input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub address: Option<Address>,
    pub value: f64,
}

/// One UTXO output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Option<Address>,
    pub value: f64,
}

/// A transaction, normalized from the provider's chain-family-specific
/// response into a chain-agnostic shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TxRecord {
    Account {
        id: TxId,
        chain: ChainId,
        from: Address,
        to: Address,
        value: f64,
        internal: Vec<InternalTransfer>,
    },
    Utxo {
        id: TxId,
        chain: ChainId,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        /// Value attributed to unattributable (coinbase) inputs; not
        /// traced further upstream.
        coinbase_value: f64,
    },
}

impl TxRecord {
    pub fn id(&self) -> &TxId {
        match self {
            TxRecord::Account { id, .. } => id,
            TxRecord::Utxo { id, .. } => id,
        }
    }

    pub fn chain(&self) -> &ChainId {
        match self {
            TxRecord::Account { chain, .. } => chain,
            TxRecord::Utxo { chain, .. } => chain,
        }
    }

    /// Source addresses and their attributed value contribution, per the
    /// normalization rules: for ACCOUNT family, `{from} ∪ {internal[i].from}`;
    /// for UTXO family, the distinct addresses of `inputs[]` (coinbase
    /// inputs are counted separately and not attributed to an address).
    pub fn sources(&self) -> Vec<(Address, f64)> {
        match self {
            TxRecord::Account {
                from,
                value,
                internal,
                ..
            } => {
                let mut sources = vec![(from.clone(), *value)];
                for t in internal {
                    sources.push((t.from.clone(), t.value));
                }
                merge_by_address(sources)
            }
            TxRecord::Utxo { inputs, .. } => {
                let sources: Vec<_> = inputs
                    .iter()
                    .filter_map(|i| i.address.clone().map(|a| (a, i.value)))
                    .collect();
                merge_by_address(sources)
            }
        }
    }
}

fn merge_by_address(sources: Vec<(Address, f64)>) -> Vec<(Address, f64)> {
    let mut merged: Vec<(Address, f64)> = Vec::with_capacity(sources.len());
    for (addr, value) in sources {
        if let Some(existing) = merged.iter_mut().find(|(a, _)| *a == addr) {
            existing.1 += value;
        } else {
            merged.push((addr, value));
        }
    }
    merged
}

/// Risk tag attached to an address by the upstream data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTag {
    Mixer,
    Darknet,
    Sanctioned,
    Hack,
    Scam,
    Gambling,
    Exchange,
    Unknown,
}

impl RiskTag {
    /// Signed scoring weight, per the weight table.
    pub fn weight(self) -> f64 {
        match self {
            RiskTag::Mixer => 1.0,
            RiskTag::Darknet => 1.0,
            RiskTag::Sanctioned => 1.0,
            RiskTag::Hack => 0.9,
            RiskTag::Scam => 0.8,
            RiskTag::Gambling => 0.4,
            RiskTag::Exchange => -0.2,
            RiskTag::Unknown => 0.0,
        }
    }

    /// The BFS does not expand past a node carrying any definitive tag.
    pub fn is_definitive(self) -> bool {
        !matches!(self, RiskTag::Unknown)
    }
}

/// Per-address metadata as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressMeta {
    pub address: Address,
    pub chain: ChainId,
    pub tags: BTreeSet<RiskTag>,
    pub balance: f64,
    pub tx_count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub label: Option<String>,
}

impl AddressMeta {
    /// Whether any tag on this address is in the definitive set; a terminal
    /// node is not expanded further upstream.
    pub fn is_terminal(&self) -> bool {
        self.tags.iter().any(|t| t.is_definitive())
    }
}

/// A node discovered during the BFS; lives only for the duration of one
/// analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceNode {
    pub address: Address,
    /// Minimum hop count on which this address was first reached.
    pub distance: u32,
    /// Value attributed to this address, summed across every parent that
    /// re-encounters it (sum-on-merge, see the Open Questions).
    pub contribution: f64,
    pub tags: BTreeSet<RiskTag>,
    pub terminal: bool,
    /// Set when the node's metadata could not be fetched (provider error on
    /// a non-root fetch); such a node is treated as terminal with no score
    /// contribution.
    pub meta_unavailable: bool,
}

/// Categorical risk level derived from `score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=19 => RiskLevel::Safe,
            20..=39 => RiskLevel::Low,
            40..=59 => RiskLevel::Medium,
            60..=79 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

/// One entity surfaced in the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedEntity {
    pub address: Address,
    pub tag: RiskTag,
    pub distance: u32,
    pub contribution: f64,
    pub label: Option<String>,
}

/// The score, level, and the human-readable reasons behind them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: u32,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

/// The final product of one analysis; owned by the caller once produced,
/// cached as an opaque blob keyed by `(chain, tx_id, depth)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub tx_id: TxId,
    pub chain: ChainId,
    pub depth: u32,
    pub risk_score: RiskScore,
    pub flagged_entities: Vec<FlaggedEntity>,
    pub total_addresses_analyzed: usize,
    pub transactions_traced: usize,
    pub api_calls_used: u64,
    pub circular_paths: u32,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_sources_merge_internal_transfers_to_same_address() {
        let tx = TxRecord::Account {
            id: TxId::from("0xaa"),
            chain: ChainId::from("ethereum"),
            from: Address::from("0xfrom"),
            to: Address::from("0xto"),
            value: 1.0,
            internal: vec![
                InternalTransfer {
                    from: Address::from("0xfrom"),
                    to: Address::from("0xinner"),
                    value: 0.5,
                },
                InternalTransfer {
                    from: Address::from("0xother"),
                    to: Address::from("0xinner"),
                    value: 0.25,
                },
            ],
        };
        let mut sources = tx.sources();
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(sources.len(), 2);
        let from_total = sources
            .iter()
            .find(|(a, _)| a.0 == "0xfrom")
            .unwrap()
            .1;
        assert!((from_total - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn utxo_sources_ignore_coinbase_inputs() {
        let tx = TxRecord::Utxo {
            id: TxId::from("deadbeef"),
            chain: ChainId::from("bitcoin"),
            inputs: vec![
                TxInput {
                    address: Some(Address::from("bc1q...")),
                    value: 1.0,
                },
                TxInput {
                    address: None,
                    value: 6.25,
                },
            ],
            outputs: vec![],
            coinbase_value: 6.25,
        };
        let sources = tx.sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].0, Address::from("bc1q..."));
    }

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(19), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(20), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }
}
