//! Normalizes the provider's chain-family-specific JSON responses into the
//! core's chain-agnostic [`TxRecord`]/[`AddressMeta`] shapes. Parser
//! selection is by [`ChainFamily`], never by runtime type sniffing of the
//! decoded JSON (per the design notes).
//!
//! Tolerates minor schema drift: unknown fields are ignored by `serde`
//! (the default behaviour, matching the teacher's `TxJson`/`TxOut` DTOs in
//! `rpc/tx.rs`, which only pick the fields they need off a much larger
//! upstream object); missing optional fields default to empty.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Error;
use crate::types::{
    Address, AddressMeta, ChainFamily, ChainId, InternalTransfer, RiskTag, TxId, TxInput,
    TxOutput, TxRecord,
};

#[derive(Debug, Deserialize, Default)]
pub struct RawTransaction {
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<f64>,
    #[serde(default)]
    pub internal_transactions: Vec<RawInternalTransfer>,
    #[serde(default)]
    pub inputs: Vec<RawTxIo>,
    #[serde(default)]
    pub outputs: Vec<RawTxIo>,
}

#[derive(Debug, Deserialize)]
pub struct RawInternalTransfer {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawTxIo {
    pub address: Option<String>,
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawAddress {
    pub address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub n_tx: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub label: Option<String>,
}

pub fn tx_record(
    raw: RawTransaction,
    chain: &ChainId,
    family: ChainFamily,
    tx_id: &TxId,
) -> Result<TxRecord, Error> {
    match family {
        ChainFamily::Account => {
            let from = raw
                .from
                .ok_or_else(|| Error::DecodeError("missing 'from' on account tx".into()))?;
            let to = raw
                .to
                .ok_or_else(|| Error::DecodeError("missing 'to' on account tx".into()))?;
            Ok(TxRecord::Account {
                id: tx_id.clone(),
                chain: chain.clone(),
                from: Address(from),
                to: Address(to),
                value: raw.value.unwrap_or(0.0),
                internal: raw
                    .internal_transactions
                    .into_iter()
                    .map(|t| InternalTransfer {
                        from: Address(t.from),
                        to: Address(t.to),
                        value: t.value,
                    })
                    .collect(),
            })
        }
        ChainFamily::Utxo => {
            let mut coinbase_value = 0.0;
            let inputs: Vec<TxInput> = raw
                .inputs
                .into_iter()
                .map(|i| {
                    if i.address.is_none() {
                        coinbase_value += i.value;
                    }
                    TxInput {
                        address: i.address.map(Address),
                        value: i.value,
                    }
                })
                .collect();
            let outputs = raw
                .outputs
                .into_iter()
                .map(|o| TxOutput {
                    address: o.address.map(Address),
                    value: o.value,
                })
                .collect();
            Ok(TxRecord::Utxo {
                id: tx_id.clone(),
                chain: chain.clone(),
                inputs,
                outputs,
                coinbase_value,
            })
        }
    }
}

pub fn address_meta(raw: RawAddress, chain: &ChainId, address: &Address) -> AddressMeta {
    let tags: BTreeSet<RiskTag> = raw.tags.iter().filter_map(|t| parse_tag(t)).collect();
    AddressMeta {
        address: address.clone(),
        chain: chain.clone(),
        tags,
        balance: raw.balance,
        tx_count: raw.n_tx,
        first_seen: raw.first_seen,
        last_seen: raw.last_seen,
        label: raw.label,
    }
}

fn parse_tag(s: &str) -> Option<RiskTag> {
    match s.to_ascii_lowercase().as_str() {
        "mixer" | "tumbler" => Some(RiskTag::Mixer),
        "darknet" | "darknet_market" => Some(RiskTag::Darknet),
        "sanctioned" | "sanctions" | "ofac" => Some(RiskTag::Sanctioned),
        "hack" | "hacked" | "theft" => Some(RiskTag::Hack),
        "scam" | "fraud" | "phishing" => Some(RiskTag::Scam),
        "gambling" => Some(RiskTag::Gambling),
        "exchange" => Some(RiskTag::Exchange),
        _ => None,
    }
}
