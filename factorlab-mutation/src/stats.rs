//! Caller-owned mutation statistics.
//!
//! The engine never keeps counters of its own. Callers pass a
//! [`MutationStats`] by `&mut` into each `mutate` call and merge per-worker
//! accumulators afterwards, so concurrent mutation needs no shared state.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use factorlab_core::ReasonCode;

use crate::tier::Tier;

/// Outcomes kept for the recent-success window.
pub const RECENT_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub attempts: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationStats {
    /// `mutate` calls.
    pub calls: usize,
    /// Calls that returned an accepted mutant.
    pub successes: usize,
    /// Individual attempts across all calls.
    pub attempts: usize,
    pub per_tier: BTreeMap<Tier, TierStats>,
    /// Rejection tallies by reason.
    pub reasons: BTreeMap<ReasonCode, usize>,
    /// Most recent call outcomes, oldest first.
    pub recent: VecDeque<bool>,
}

impl MutationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One attempt: accepted, or rejected with `reason`.
    pub fn record_attempt(&mut self, tier: Tier, rejection: Option<ReasonCode>) {
        self.attempts += 1;
        let entry = self.per_tier.entry(tier).or_default();
        entry.attempts += 1;
        match rejection {
            None => entry.accepted += 1,
            Some(code) => *self.reasons.entry(code).or_default() += 1,
        }
    }

    /// A reason that ended a call without an attempt behind it.
    pub fn record_reason(&mut self, code: ReasonCode) {
        *self.reasons.entry(code).or_default() += 1;
    }

    /// The outcome of one whole `mutate` call.
    pub fn record_outcome(&mut self, success: bool) {
        self.calls += 1;
        if success {
            self.successes += 1;
        }
        self.recent.push_back(success);
        while self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        (self.calls > 0).then(|| self.successes as f64 / self.calls as f64)
    }

    /// Success rate over the recent window; `None` before any call.
    pub fn recent_success_rate(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let hits = self.recent.iter().filter(|s| **s).count();
        Some(hits as f64 / self.recent.len() as f64)
    }

    /// Fold another accumulator into this one. `other`'s recent outcomes are
    /// treated as newer.
    pub fn merge(&mut self, other: &MutationStats) {
        self.calls += other.calls;
        self.successes += other.successes;
        self.attempts += other.attempts;
        for (tier, s) in &other.per_tier {
            let entry = self.per_tier.entry(*tier).or_default();
            entry.attempts += s.attempts;
            entry.accepted += s.accepted;
        }
        for (code, n) in &other.reasons {
            *self.reasons.entry(*code).or_default() += n;
        }
        self.recent.extend(other.recent.iter().copied());
        while self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }
}
