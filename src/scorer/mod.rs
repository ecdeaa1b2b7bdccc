//! Risk Scorer: pure functions of `(flagged[], unflagged_count,
//! circular_paths)`, no I/O. Formulas and thresholds are verbatim from the
//! engine design.

use crate::types::{FlaggedEntity, RiskLevel, RiskScore};

#[derive(Debug, Clone, Copy)]
pub struct ScoreConfig {
    pub contribution_k: f64,
}

/// `score(flagged, circular_paths)`, reasons ordered by
/// `(W*D desc, distance asc)`, visibility threshold `W*D >= 0.1`.
pub fn score(flagged: &[FlaggedEntity], circular_paths: u32, config: &ScoreConfig) -> RiskScore {
    let mut weighted: Vec<(f64, &FlaggedEntity)> = flagged
        .iter()
        .map(|f| (f.tag.weight() * decay(f.distance), f))
        .collect();

    let raw: f64 = weighted
        .iter()
        .map(|(wd, f)| wd * contribution_term(f.contribution, config.contribution_k))
        .sum();
    let clamped = raw.clamp(0.0, 1.0);
    let score_value = (100.0 * clamped).round() as u32;
    let level = RiskLevel::from_score(score_value);

    weighted.sort_by(|(wd_a, f_a), (wd_b, f_b)| {
        wd_b.partial_cmp(wd_a)
            .unwrap()
            .then_with(|| f_a.distance.cmp(&f_b.distance))
            .then_with(|| f_b.contribution.partial_cmp(&f_a.contribution).unwrap())
            .then_with(|| f_a.address.0.cmp(&f_b.address.0))
    });

    let mut reasons: Vec<String> = weighted
        .iter()
        .filter(|(wd, _)| *wd >= 0.1)
        .map(|(wd, f)| reason_sentence(f, *wd))
        .collect();

    reasons.push(summary_sentence(flagged.len(), score_value, &level));
    if circular_paths > 0 {
        reasons.push(format!(
            "{circular_paths} circular path(s) detected during tracing; affected addresses were counted once."
        ));
    }

    RiskScore {
        score: score_value,
        level,
        reasons,
    }
}

pub(crate) fn decay(distance: u32) -> f64 {
    0.5f64.powi(distance as i32 - 1)
}

fn contribution_term(contribution: f64, k: f64) -> f64 {
    (contribution.ln_1p() / k).min(1.0)
}

fn reason_sentence(entity: &FlaggedEntity, weighted_decay: f64) -> String {
    let label = entity
        .label
        .as_deref()
        .map(|l| format!(" ({l})"))
        .unwrap_or_default();
    format!(
        "Address {}{label} is tagged {:?} at distance {}, contributing {weighted_decay:.2} to the risk score.",
        entity.address, entity.tag, entity.distance
    )
}

fn summary_sentence(flagged_count: usize, score_value: u32, level: &RiskLevel) -> String {
    format!(
        "{flagged_count} flagged entit{suffix} found upstream; overall score {score_value}/100 ({level:?}).",
        suffix = if flagged_count == 1 { "y" } else { "ies" }
    )
}
