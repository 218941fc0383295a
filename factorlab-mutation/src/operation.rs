//! Concrete mutation operations and their exhaustion keys.
//!
//! Each tier enumerates the operations applicable to a strategy as
//! [`Candidate`]s. An operation's [`OpKey`] names its tier, kind and target
//! but not its random draw, so the retry loop can refuse to repeat an
//! operation that already failed even though a repeat would roll new values.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use factorlab_core::factor::composite::CombineMode;
use factorlab_core::logic::LogicEdit;
use factorlab_core::{FactorId, Strategy};

use crate::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Perturb,
    AddFactor,
    RemoveFactor,
    ReplaceFactor,
    SubstituteOperator,
    CombineSignals,
}

impl OpKind {
    pub fn tier(self) -> Tier {
        match self {
            Self::Perturb => Tier::Parametric,
            Self::AddFactor | Self::RemoveFactor | Self::ReplaceFactor => Tier::Structural,
            Self::SubstituteOperator | Self::CombineSignals => Tier::Logic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perturb => "perturb",
            Self::AddFactor => "add_factor",
            Self::RemoveFactor => "remove_factor",
            Self::ReplaceFactor => "replace_factor",
            Self::SubstituteOperator => "substitute_operator",
            Self::CombineSignals => "combine_signals",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(tier, operation, target)`: identity of an operation for exhaustion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpKey {
    pub tier: Tier,
    pub op: OpKind,
    pub target: String,
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.tier, self.op, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Rescale one parameter within its registered range.
    Perturb { factor: FactorId, param: String },
    /// Insert a factor of `kind` and bind it to an open slot of the output factor.
    AddFactor { kind: String, slot: String },
    RemoveFactor { factor: FactorId },
    /// Swap in a same-category kind, inheriting output bindings.
    ReplaceFactor { factor: FactorId, kind: String },
    /// Rewrite one comparison or connective of a logic factor.
    SubstituteOperator { factor: FactorId, edit: LogicEdit },
    /// Merge the current entry signal with another directional signal.
    CombineSignals {
        left: FactorId,
        right: FactorId,
        mode: CombineMode,
    },
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Perturb { .. } => OpKind::Perturb,
            Self::AddFactor { .. } => OpKind::AddFactor,
            Self::RemoveFactor { .. } => OpKind::RemoveFactor,
            Self::ReplaceFactor { .. } => OpKind::ReplaceFactor,
            Self::SubstituteOperator { .. } => OpKind::SubstituteOperator,
            Self::CombineSignals { .. } => OpKind::CombineSignals,
        }
    }

    pub fn tier(&self) -> Tier {
        self.kind().tier()
    }

    pub fn key(&self) -> OpKey {
        let target = match self {
            Self::Perturb { factor, param } => format!("{factor}.{param}"),
            Self::AddFactor { kind, slot } => format!("{slot}<-{kind}"),
            Self::RemoveFactor { factor } => factor.to_string(),
            Self::ReplaceFactor { factor, kind } => format!("{factor}->{kind}"),
            Self::SubstituteOperator { factor, edit } => {
                format!("{factor}@{}:{}", edit.site, edit.replacement)
            }
            Self::CombineSignals { left, right, mode } => {
                format!("{left}+{right}:{mode:?}")
            }
        };
        OpKey {
            tier: self.tier(),
            op: self.kind(),
            target,
        }
    }
}

/// An applicable operation with its selection weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub op: Operation,
    pub weight: f64,
}

impl Candidate {
    pub fn new(op: Operation, weight: f64) -> Self {
        Self { op, weight }
    }
}

/// Weighted draw; zero-weight candidates are only picked when every weight is zero.
pub fn pick<'a, R: Rng>(rng: &mut R, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
    let total: f64 = candidates.iter().map(|c| c.weight.max(0.0)).sum();
    if total <= 0.0 {
        return (!candidates.is_empty()).then(|| &candidates[rng.gen_range(0..candidates.len())]);
    }
    let mut remaining = rng.gen::<f64>() * total;
    for candidate in candidates {
        remaining -= candidate.weight.max(0.0);
        if remaining < 0.0 {
            return Some(candidate);
        }
    }
    candidates.iter().rev().find(|c| c.weight > 0.0)
}

// ─── Naming helpers ──────────────────────────────────────────────────

/// `base`, or `base_2`, `base_3`, ... if a factor already writes `base`.
pub(crate) fn fresh_matrix_name(strategy: &Strategy, base: &str) -> String {
    let taken = |name: &str| {
        strategy.producer_of(name).is_some() || strategy.raw_inputs().iter().any(|r| r == name)
    };
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|name| !taken(name))
        .unwrap_or_else(|| base.to_string())
}

/// `id`, or `id#2`, `id#3`, ... if the strategy already holds `id`.
pub(crate) fn fresh_id(strategy: &Strategy, id: FactorId) -> FactorId {
    if !strategy.contains(&id) {
        return id;
    }
    (2..)
        .map(|n| FactorId::new(format!("{id}#{n}")))
        .find(|candidate| !strategy.contains(candidate))
        .unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::logic::{CmpOp, SiteOp};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn keys_ignore_random_draws_but_separate_targets() {
        let a = Operation::Perturb {
            factor: FactorId::new("momentum(lookback=20)"),
            param: "lookback".into(),
        };
        assert_eq!(a.key(), a.clone().key());
        assert_eq!(a.key().to_string(), "parametric/perturb:momentum(lookback=20).lookback");

        let edit = |replacement| Operation::SubstituteOperator {
            factor: FactorId::new("r"),
            edit: LogicEdit {
                site: 0,
                replacement,
            },
        };
        assert_ne!(
            edit(SiteOp::Compare(CmpOp::Le)).key(),
            edit(SiteOp::Compare(CmpOp::Gt)).key()
        );
        assert_eq!(edit(SiteOp::Compare(CmpOp::Le)).tier(), Tier::Logic);
    }

    #[test]
    fn pick_follows_weights() {
        let candidates = vec![
            Candidate::new(
                Operation::RemoveFactor {
                    factor: FactorId::new("heavy"),
                },
                99.0,
            ),
            Candidate::new(
                Operation::RemoveFactor {
                    factor: FactorId::new("light"),
                },
                1.0,
            ),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let heavy = (0..1_000)
            .filter(|_| {
                pick(&mut rng, &candidates).unwrap().op.key().target == "heavy"
            })
            .count();
        assert!(heavy > 950, "heavy picked {heavy} times");
        assert!(pick(&mut rng, &[]).is_none());
    }

    #[test]
    fn all_zero_weights_still_pick() {
        let candidates = vec![Candidate::new(
            Operation::RemoveFactor {
                factor: FactorId::new("x"),
            },
            0.0,
        )];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick(&mut rng, &candidates).is_some());
    }
}
