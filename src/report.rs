//! Assembles the final [`RiskReport`] from a [`crate::tracer::TraceOutcome`]
//! and a [`crate::types::RiskScore`]. Serialization shape matches the
//! external-interfaces table: `chrono`'s `to_rfc3339()` stands in for the
//! teacher's hand-rolled `rpc::ts_to_date_time_utc` formatter.
//!
//! `flagged_entities` is reordered by `(|W*D| desc, distance asc, address
//! asc)`, independent of the discovery order the BFS produced `outcome.flagged`
//! in.

use chrono::Utc;

use crate::scorer;
use crate::tracer::TraceOutcome;
use crate::types::{ChainId, RiskReport, RiskScore, TxId};

pub fn build(
    chain: ChainId,
    tx_id: TxId,
    depth: u32,
    outcome: &TraceOutcome,
    mut risk_score: RiskScore,
) -> RiskReport {
    if !outcome.notes.is_empty() {
        risk_score.reasons.extend(outcome.notes.iter().cloned());
    }

    let mut flagged_entities = outcome.flagged.clone();
    flagged_entities.sort_by(|a, b| {
        let wd_a = (a.tag.weight() * scorer::decay(a.distance)).abs();
        let wd_b = (b.tag.weight() * scorer::decay(b.distance)).abs();
        wd_b.partial_cmp(&wd_a)
            .unwrap()
            .then_with(|| a.distance.cmp(&b.distance))
            .then_with(|| a.address.0.cmp(&b.address.0))
    });

    RiskReport {
        tx_id,
        chain,
        depth,
        risk_score,
        flagged_entities,
        total_addresses_analyzed: outcome.total_addresses_analyzed,
        transactions_traced: outcome.transactions_traced,
        api_calls_used: outcome.api_calls_used,
        circular_paths: outcome.circular_paths,
        generated_at: Utc::now(),
    }
}
