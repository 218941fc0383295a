//! Tier 3 — logic-level mutation.
//!
//! Operates below the graph, on the expression source of `rule` factors:
//!
//! 1. operator substitution: rewrite one comparison or connective at an edit
//!    site, render the tree back to source and re-parse it before rebuilding
//!    the factor through the registry
//! 2. signal combination: merge the output factor's entry signal with another
//!    directional signal through a `signal_combiner`
//!
//! An edited factor must read the same matrices and write the same outputs as
//! before; any drift is rejected before the factor goes back into the graph.

use rand::Rng;

use factorlab_core::factor::composite::CombineMode;
use factorlab_core::logic::{self, LogicEdit, SiteOp};
use factorlab_core::{
    Diagnostic, Factor, FactorCategory, FactorId, FactorRegistry, FactorSpec, GraphError,
    ReasonCode, RegistryError, Strategy,
};

use crate::config::LogicConfig;
use crate::error::{MutationError, Stage};
use crate::operation::{fresh_id, fresh_matrix_name, Candidate, Operation};
use crate::profile::{StrategyProfile, POSITION_KIND};

const COMBINER_KIND: &str = "signal_combiner";
const SIGNAL_SLOT: &str = "signal";

pub fn candidates(
    strategy: &Strategy,
    profile: &StrategyProfile,
    config: &LogicConfig,
) -> Vec<Candidate> {
    let mut out = Vec::new();

    // ── substitute ──
    let mut edits = Vec::new();
    for id in &profile.logic_factors {
        let Some(expr) = strategy
            .factor(id)
            .and_then(Factor::logic)
            .and_then(|source| logic::parse(source).ok())
        else {
            continue;
        };
        for (site, op) in expr.edit_sites().into_iter().enumerate() {
            let replacements: Vec<SiteOp> = match op {
                SiteOp::Compare(cmp) => cmp
                    .substitutes()
                    .iter()
                    .map(|c| SiteOp::Compare(*c))
                    .collect(),
                SiteOp::Connective(c) => vec![SiteOp::Connective(c.flipped())],
            };
            for replacement in replacements {
                edits.push(Operation::SubstituteOperator {
                    factor: id.clone(),
                    edit: LogicEdit { site, replacement },
                });
            }
        }
    }
    let n = edits.len() as f64;
    out.extend(
        edits
            .into_iter()
            .map(|op| Candidate::new(op, config.substitute_weight / n)),
    );

    // ── combine ──
    let combines = combine_pairs(strategy)
        .into_iter()
        .flat_map(|(left, right)| {
            config.combinators.iter().map(move |mode| Operation::CombineSignals {
                left: left.clone(),
                right: right.clone(),
                mode: *mode,
            })
        })
        .collect::<Vec<_>>();
    let n = combines.len() as f64;
    out.extend(
        combines
            .into_iter()
            .map(|op| Candidate::new(op, config.combine_weight / n)),
    );
    out
}

/// `(entry producer, other signal)` pairs the output factor could combine.
fn combine_pairs(strategy: &Strategy) -> Vec<(FactorId, FactorId)> {
    let Some(position) = output_position(strategy) else {
        return Vec::new();
    };
    let Some(left) = position
        .input("entry")
        .and_then(|matrix| strategy.producer_of(matrix))
        .filter(|f| f.output(SIGNAL_SLOT).is_some())
    else {
        return Vec::new();
    };
    strategy
        .factors()
        .filter(|f| matches!(f.category(), FactorCategory::Entry | FactorCategory::Logic))
        .filter(|f| f.id() != left.id() && f.output(SIGNAL_SLOT).is_some())
        .map(|f| (left.id().clone(), f.id().clone()))
        .collect()
}

fn output_position(strategy: &Strategy) -> Option<&Factor> {
    strategy
        .producer_of(strategy.output())
        .filter(|f| f.kind() == POSITION_KIND)
}

pub fn apply<R: Rng>(
    strategy: &Strategy,
    op: &Operation,
    registry: &FactorRegistry,
    _rng: &mut R,
) -> Result<Strategy, MutationError> {
    match op {
        Operation::SubstituteOperator { factor, edit } => {
            substitute(strategy, factor, *edit, registry)
        }
        Operation::CombineSignals { left, right, mode } => {
            combine(strategy, left, right, *mode, registry)
        }
        other => Err(RegistryError::ConstraintViolation {
            kind: other.kind().to_string(),
            detail: "not a logic operation".into(),
        }
        .into()),
    }
}

fn substitute(
    strategy: &Strategy,
    id: &FactorId,
    edit: LogicEdit,
    registry: &FactorRegistry,
) -> Result<Strategy, MutationError> {
    let factor = strategy
        .factor(id)
        .ok_or_else(|| GraphError::FactorNotFound(id.clone()))?;
    let source = factor
        .logic()
        .ok_or_else(|| RegistryError::MissingLogic(factor.kind().to_string()))?;

    let edited = logic::parse(source)?.apply_edit(edit)?;
    let rendered = edited.to_string();
    if logic::parse(&rendered)? != edited {
        return Err(MutationError::rejected(
            Stage::Syntax,
            Diagnostic::new(
                ReasonCode::SyntaxError,
                format!("'{rendered}' does not re-parse to the edited expression"),
            )
            .with_factor(id.clone()),
        ));
    }

    let identifiers = edited.identifiers();
    let mut spec = FactorSpec::from_factor(factor, Vec::new());
    spec.logic = Some(rendered);
    spec.inputs.retain(|slot, _| identifiers.contains(slot));
    let rebuilt = registry.build(&spec)?;
    check_declarations(factor, &rebuilt)?;

    let mut mutant = strategy.clone();
    mutant.replace_factor(id, rebuilt)?;
    tracing::trace!(factor = %id, site = edit.site, to = %edit.replacement, "substituted operator");
    Ok(mutant)
}

/// The rebuilt factor must read and write exactly what the original did.
fn check_declarations(before: &Factor, after: &Factor) -> Result<(), MutationError> {
    let sorted = |mut names: Vec<String>| {
        names.sort();
        names
    };
    let declared = sorted(before.required_inputs());
    let derived = sorted(after.required_inputs());
    if declared != derived || before.output_bindings() != after.output_bindings() {
        return Err(MutationError::DeclarationDrift {
            factor: before.id().clone(),
            declared,
            derived,
        });
    }
    Ok(())
}

fn combine(
    strategy: &Strategy,
    left: &FactorId,
    right: &FactorId,
    mode: CombineMode,
    registry: &FactorRegistry,
) -> Result<Strategy, MutationError> {
    let position = output_position(strategy)
        .ok_or_else(|| GraphError::FactorNotFound(FactorId::new(strategy.output())))?;
    let position_id = position.id().clone();
    let signal_of = |id: &FactorId| -> Result<String, MutationError> {
        let factor = strategy
            .factor(id)
            .ok_or_else(|| GraphError::FactorNotFound(id.clone()))?;
        factor
            .output(SIGNAL_SLOT)
            .map(str::to_string)
            .ok_or_else(|| {
                RegistryError::UnknownSlot {
                    kind: factor.kind().to_string(),
                    slot: SIGNAL_SLOT.to_string(),
                }
                .into()
            })
    };
    let left_signal = signal_of(left)?;
    let right_signal = signal_of(right)?;

    let combined = fresh_matrix_name(strategy, "combined_signal");
    let mut spec = FactorSpec::new(COMBINER_KIND);
    spec.params.insert("mode".into(), mode.code());
    spec.inputs.insert("left".into(), left_signal.clone());
    spec.inputs.insert("right".into(), right_signal);
    spec.outputs.insert(SIGNAL_SLOT.into(), combined.clone());
    let mut combiner = registry.build(&spec)?;
    let unique = fresh_id(strategy, combiner.id().clone());
    if &unique != combiner.id() {
        spec.id = Some(unique);
        combiner = registry.build(&spec)?;
    }

    let mut rebind = FactorSpec::from_factor(position, Vec::new());
    rebind.inputs.insert("entry".into(), combined);
    let rebound = registry.build(&rebind)?;
    let still_reads_left = rebound
        .input_bindings()
        .iter()
        .any(|(_, m)| *m == left_signal);

    let mut mutant = strategy.clone();
    mutant.replace_factor(&position_id, rebound)?;
    mutant.insert_before(combiner, &[left.clone(), right.clone()], &position_id)?;
    if !still_reads_left {
        mutant.remove_dependency(&position_id, left)?;
    }
    tracing::trace!(%left, %right, ?mode, "combined signals");
    Ok(mutant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{momentum_rule, rule_position};
    use factorlab_core::logic::{CmpOp, Connective};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run(strategy: &Strategy, op: Operation) -> Result<Strategy, MutationError> {
        let registry = FactorRegistry::standard();
        apply(strategy, &op, &registry, &mut StdRng::seed_from_u64(0))
    }

    fn rule_id(strategy: &Strategy) -> FactorId {
        strategy.factors_in(FactorCategory::Logic)[0].id().clone()
    }

    #[test]
    fn substitution_rewrites_source_and_keeps_id() {
        let registry = FactorRegistry::standard();
        let strategy = rule_position(&registry);
        let id = rule_id(&strategy);
        let mutant = run(
            &strategy,
            Operation::SubstituteOperator {
                factor: id.clone(),
                edit: LogicEdit {
                    site: 1,
                    replacement: SiteOp::Compare(CmpOp::Ge),
                },
            },
        )
        .unwrap();

        let source = mutant.factor(&id).unwrap().logic().unwrap();
        assert_eq!(source, "close >= sma(close, 20) and volume > sma(volume, 20)");
        assert_eq!(mutant.edges(), strategy.edges());
        assert_ne!(mutant.full_hash(), strategy.full_hash());
        mutant.to_pipeline().unwrap();
    }

    #[test]
    fn connective_flip() {
        let registry = FactorRegistry::standard();
        let strategy = rule_position(&registry);
        let id = rule_id(&strategy);
        let mutant = run(
            &strategy,
            Operation::SubstituteOperator {
                factor: id.clone(),
                edit: LogicEdit {
                    site: 0,
                    replacement: SiteOp::Connective(Connective::Or),
                },
            },
        )
        .unwrap();
        assert!(mutant.factor(&id).unwrap().logic().unwrap().contains(" or "));
    }

    #[test]
    fn mismatched_site_is_a_logic_error() {
        let registry = FactorRegistry::standard();
        let strategy = rule_position(&registry);
        let err = run(
            &strategy,
            Operation::SubstituteOperator {
                factor: rule_id(&strategy),
                edit: LogicEdit {
                    site: 0,
                    replacement: SiteOp::Compare(CmpOp::Lt),
                },
            },
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::Logic(_)));
    }

    #[test]
    fn drift_is_detected() {
        let registry = FactorRegistry::standard();
        let a = registry
            .build(&FactorSpec {
                logic: Some("close > 1".into()),
                ..FactorSpec::new("rule")
            })
            .unwrap();
        let b = registry
            .build(&FactorSpec {
                logic: Some("volume > 1".into()),
                ..FactorSpec::new("rule")
            })
            .unwrap();
        assert!(check_declarations(&a, &a).is_ok());
        assert!(matches!(
            check_declarations(&a, &b),
            Err(MutationError::DeclarationDrift { .. })
        ));
    }

    #[test]
    fn candidates_enumerate_every_site() {
        let registry = FactorRegistry::standard();
        let strategy = rule_position(&registry);
        let profile = StrategyProfile::detect(&strategy, &registry);
        let cands = candidates(&strategy, &profile, &LogicConfig::default());
        // one flip for `and`, two substitutes for each `>`
        assert_eq!(cands.len(), 5);
        let total: f64 = cands.iter().map(|c| c.weight).sum();
        assert!((total - LogicConfig::default().substitute_weight).abs() < 1e-9);
    }

    #[test]
    fn combine_rebinds_entry() {
        let registry = FactorRegistry::standard();
        let strategy = momentum_rule(&registry);
        let profile = StrategyProfile::detect(&strategy, &registry);
        let combines: Vec<Candidate> = candidates(&strategy, &profile, &LogicConfig::default())
            .into_iter()
            .filter(|c| matches!(c.op, Operation::CombineSignals { .. }))
            .collect();
        assert_eq!(combines.len(), CombineMode::ALL.len());

        let mut mutant = run(&strategy, combines[1].op.clone()).unwrap();
        let position = FactorId::new("position(allow_short=1)");
        let combiner = FactorId::new("signal_combiner(mode=1)");
        assert_eq!(
            mutant.factor(&position).unwrap().input("entry"),
            Some("combined_signal")
        );
        assert_eq!(mutant.depends_on(&position).unwrap(), &[combiner.clone()]);
        assert_eq!(mutant.depends_on(&combiner).unwrap().len(), 2);

        let mut container = factorlab_core::smoke::default_container();
        let out = mutant.execute(&mut container).unwrap();
        assert!(!out.has_infinite());
    }

    #[test]
    fn single_signal_has_nothing_to_combine() {
        let registry = FactorRegistry::standard();
        let strategy = rule_position(&registry);
        let profile = StrategyProfile::detect(&strategy, &registry);
        assert!(!candidates(&strategy, &profile, &LogicConfig::default())
            .iter()
            .any(|c| matches!(c.op, Operation::CombineSignals { .. })));
    }
}
