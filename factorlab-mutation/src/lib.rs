//! FactorLab Mutation — three-tier strategy mutation with bounded retry.
//!
//! This crate builds on `factorlab-core` to provide:
//! - Mutation configuration loaded from TOML, with validation
//! - Strategy profiling (category counts, open slots, missing exits)
//! - Tier selection by weighted draw or risk-score band
//! - Parametric, structural and logic-level mutation operations
//! - Three-stage validation (syntax, semantics on smoke data, ranges)
//! - The validate-and-retry engine with an exhaustion set of tried operations
//! - Caller-owned statistics and parallel population mutation

pub mod config;
pub mod engine;
pub mod error;
pub mod logic;
pub mod operation;
pub mod parametric;
pub mod population;
pub mod profile;
pub mod result;
pub mod stats;
pub mod structural;
pub mod tier;
pub mod validate;

pub use config::{
    ConfigError, LogicConfig, MutationConfig, ParametricConfig, SelectionMode, StructuralConfig,
    TierWeights,
};
pub use engine::{mutate, MutationEngine};
pub use error::{FatalMutationError, MutationError, Stage};
pub use operation::{Candidate, OpKey, OpKind, Operation};
pub use population::{mutate_population, PopulationResult};
pub use profile::{ExitProfile, StrategyProfile};
pub use result::{AttemptOutcome, AttemptRecord, MutationResult, MutationSummary};
pub use stats::{MutationStats, TierStats};
pub use tier::{risk_score, select_tier, Tier};
pub use validate::Validator;

#[cfg(test)]
pub(crate) mod testutil {
    use factorlab_core::{FactorId, FactorRegistry, FactorSpec, Strategy};

    fn build(registry: &FactorRegistry, spec: FactorSpec) -> factorlab_core::Factor {
        registry.build(&spec).unwrap()
    }

    fn position(registry: &FactorRegistry, bindings: &[(&str, &str)]) -> factorlab_core::Factor {
        let mut spec = FactorSpec::new("position");
        for (slot, matrix) in bindings {
            spec.inputs.insert(slot.to_string(), matrix.to_string());
        }
        build(registry, spec)
    }

    fn rule(registry: &FactorRegistry, source: &str) -> factorlab_core::Factor {
        build(
            registry,
            FactorSpec {
                logic: Some(source.to_string()),
                ..FactorSpec::new("rule")
            },
        )
    }

    /// momentum(20) → position, no exit.
    pub fn momentum_position(registry: &FactorRegistry) -> Strategy {
        let mut s = Strategy::new("momentum_position");
        let momentum = build(registry, FactorSpec::new("momentum"));
        let id = momentum.id().clone();
        s.add_factor(momentum, &[]).unwrap();
        s.add_factor(position(registry, &[("entry", "momentum_signal")]), &[id])
            .unwrap();
        s
    }

    /// momentum(20) + trailing_stop(0.1, 20) → position.
    pub fn momentum_trail(registry: &FactorRegistry) -> Strategy {
        let mut s = Strategy::new("momentum_trail");
        s.add_factor(build(registry, FactorSpec::new("momentum")), &[])
            .unwrap();
        s.add_factor(build(registry, FactorSpec::new("trailing_stop")), &[])
            .unwrap();
        s.add_factor(
            position(
                registry,
                &[("entry", "momentum_signal"), ("exit", "exit_signal")],
            ),
            &[
                FactorId::new("momentum(lookback=20)"),
                FactorId::new("trailing_stop(lookback=20,trail_pct=0.1)"),
            ],
        )
        .unwrap();
        s
    }

    /// A two-clause rule as the entry signal.
    pub fn rule_position(registry: &FactorRegistry) -> Strategy {
        let mut s = Strategy::new("rule_position");
        let rule = rule(registry, "close > sma(close, 20) and volume > sma(volume, 20)");
        let id = rule.id().clone();
        s.add_factor(rule, &[]).unwrap();
        s.add_factor(position(registry, &[("entry", "rule_signal")]), &[id])
            .unwrap();
        s
    }

    /// momentum entry plus an unwired trend rule.
    pub fn momentum_rule(registry: &FactorRegistry) -> Strategy {
        let mut s = momentum_position(registry);
        s.add_factor(rule(registry, "close > sma(close, 50)"), &[])
            .unwrap();
        s
    }
}
