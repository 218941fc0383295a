//! Mutation tiers and tier selection.
//!
//! Tiers are ordered by risk: parametric edits keep the graph intact,
//! structural edits rewire it, logic edits rewrite a factor's expression.
//!
//! Selection is either a weighted draw over the configured tier weights or a
//! deterministic band of the strategy's risk score:
//! - `[0.0, 0.3)` → parametric
//! - `[0.3, 0.7)` → structural
//! - `[0.7, 1.0]` → logic
//!
//! The score rises with recent mutation success and falls as the strategy
//! grows, so pressure shifts toward safer edits when confidence drops.
//! A band whose tier has zero weight resolves to the next enabled tier in
//! its fallback order.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{MutationConfig, SelectionMode, TierWeights};
use crate::profile::StrategyProfile;
use crate::stats::MutationStats;

/// Recent success rate assumed before any history exists.
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

const SUCCESS_WEIGHT: f64 = 0.7;
const SIZE_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Parametric,
    Structural,
    Logic,
}

impl Tier {
    /// Lowest risk first.
    pub const ALL: [Tier; 3] = [Self::Parametric, Self::Structural, Self::Logic];

    /// Tier for a risk score; out-of-range scores are clamped.
    pub fn for_score(score: f64) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        if score < 0.3 {
            Self::Parametric
        } else if score < 0.7 {
            Self::Structural
        } else {
            Self::Logic
        }
    }

    pub fn weight(self, weights: &TierWeights) -> f64 {
        match self {
            Self::Parametric => weights.parametric,
            Self::Structural => weights.structural,
            Self::Logic => weights.logic,
        }
    }

    /// `self` first, then the remaining tiers lowest risk first.
    pub fn fallback_order(self) -> Vec<Tier> {
        let mut order = vec![self];
        order.extend(Self::ALL.into_iter().filter(|t| *t != self));
        order
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parametric => "parametric",
            Self::Structural => "structural",
            Self::Logic => "logic",
        };
        f.write_str(s)
    }
}

/// Risk score in `[0, 1]`.
pub fn risk_score(profile: &StrategyProfile, stats: &MutationStats, max_factors: usize) -> f64 {
    let success = stats.recent_success_rate().unwrap_or(NEUTRAL_SUCCESS_RATE);
    let size = profile.factor_count as f64 / max_factors.max(1) as f64;
    (SUCCESS_WEIGHT * success + SIZE_WEIGHT * (1.0 - size.min(1.0))).clamp(0.0, 1.0)
}

/// Pick the primary tier for one attempt.
pub fn select_tier<R: Rng>(
    config: &MutationConfig,
    profile: &StrategyProfile,
    stats: &MutationStats,
    rng: &mut R,
) -> Tier {
    match config.selection {
        SelectionMode::RiskScore => {
            let banded = Tier::for_score(risk_score(profile, stats, config.structural.max_factors));
            banded
                .fallback_order()
                .into_iter()
                .find(|t| t.weight(&config.tiers) > 0.0)
                .unwrap_or(banded)
        }
        SelectionMode::Weighted => weighted_tier(&config.tiers, rng),
    }
}

fn weighted_tier<R: Rng>(weights: &TierWeights, rng: &mut R) -> Tier {
    let total = weights.sum();
    if total <= 0.0 {
        return Tier::Parametric;
    }
    let mut pick = rng.gen::<f64>() * total;
    for tier in Tier::ALL {
        pick -= tier.weight(weights);
        if pick < 0.0 {
            return tier;
        }
    }
    Tier::ALL
        .into_iter()
        .rev()
        .find(|t| t.weight(weights) > 0.0)
        .unwrap_or(Tier::Parametric)
}
