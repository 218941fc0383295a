//! Tier 2 — structural mutation.
//!
//! Three operations, each producing a new graph that is recompiled by the
//! validator:
//! 1. add: insert a registry factor ahead of the output `position` factor and
//!    bind it to one of its open optional slots (exit, filter, scale)
//! 2. remove: detach optional bindings that read the factor, then remove it
//!    under the configured [`RemovalPolicy`]
//! 3. replace: swap a factor for another kind of the same category, keeping
//!    its output matrix names so downstream bindings still resolve

use rand::Rng;

use factorlab_core::{
    Factor, FactorCategory, FactorId, FactorRegistry, FactorSpec, GraphError, RegistryError,
    RemovalPolicy, Strategy,
};

use crate::config::StructuralConfig;
use crate::error::MutationError;
use crate::operation::{fresh_id, fresh_matrix_name, Candidate, Operation};
use crate::profile::{StrategyProfile, POSITION_KIND, POSITION_SLOTS};

/// Weight multiplier for exit kinds the strategy does not carry yet.
pub const MISSING_EXIT_BIAS: f64 = 2.0;

const REPLACEABLE: [FactorCategory; 4] = [
    FactorCategory::Entry,
    FactorCategory::Exit,
    FactorCategory::Filter,
    FactorCategory::Risk,
];

pub fn candidates(
    strategy: &Strategy,
    profile: &StrategyProfile,
    registry: &FactorRegistry,
    config: &StructuralConfig,
) -> Vec<Candidate> {
    let mut out = Vec::new();

    // ── add ──
    if strategy.len() < config.max_factors && profile.output_factor.is_some() {
        let mut adds: Vec<(Operation, f64)> = Vec::new();
        for slot in &profile.open_slots {
            let found = POSITION_SLOTS.iter().find(|(s, _)| *s == slot.as_str());
            let Some((_, category)) = found else {
                continue;
            };
            for kind in registry.list_by_category(*category) {
                let bias = if *category == FactorCategory::Exit && profile.exits.is_missing(kind) {
                    MISSING_EXIT_BIAS
                } else {
                    1.0
                };
                adds.push((
                    Operation::AddFactor {
                        kind: kind.to_string(),
                        slot: slot.clone(),
                    },
                    bias,
                ));
            }
        }
        let total: f64 = adds.iter().map(|(_, b)| b).sum();
        out.extend(
            adds.into_iter()
                .map(|(op, bias)| Candidate::new(op, config.add_weight * bias / total)),
        );
    }

    // ── remove ──
    let removable: Vec<&FactorId> = strategy
        .factors()
        .map(|f| f.id())
        .filter(|id| profile.output_factor.as_ref() != Some(*id))
        .collect();
    let n = removable.len() as f64;
    out.extend(removable.into_iter().map(|id| {
        Candidate::new(
            Operation::RemoveFactor { factor: id.clone() },
            config.remove_weight / n,
        )
    }));

    // ── replace ──
    let mut replaces = Vec::new();
    for factor in strategy.factors() {
        if !REPLACEABLE.contains(&factor.category()) {
            continue;
        }
        for kind in registry.list_by_category(factor.category()) {
            if kind != factor.kind() {
                replaces.push(Operation::ReplaceFactor {
                    factor: factor.id().clone(),
                    kind: kind.to_string(),
                });
            }
        }
    }
    let n = replaces.len() as f64;
    out.extend(
        replaces
            .into_iter()
            .map(|op| Candidate::new(op, config.replace_weight / n)),
    );
    out
}

pub fn apply<R: Rng>(
    strategy: &Strategy,
    op: &Operation,
    registry: &FactorRegistry,
    config: &StructuralConfig,
    _rng: &mut R,
) -> Result<Strategy, MutationError> {
    match op {
        Operation::AddFactor { kind, slot } => add(strategy, kind, slot, registry),
        Operation::RemoveFactor { factor } => {
            remove(strategy, factor, registry, config.removal_policy)
        }
        Operation::ReplaceFactor { factor, kind } => replace(strategy, factor, kind, registry),
        other => Err(RegistryError::ConstraintViolation {
            kind: other.kind().to_string(),
            detail: "not a structural operation".into(),
        }
        .into()),
    }
}

/// Build `spec`, re-keying its id if the strategy already holds it.
fn build_unique(
    strategy: &Strategy,
    registry: &FactorRegistry,
    mut spec: FactorSpec,
) -> Result<Factor, MutationError> {
    let factor = registry.build(&spec)?;
    let id = fresh_id(strategy, factor.id().clone());
    if &id == factor.id() {
        return Ok(factor);
    }
    spec.id = Some(id);
    Ok(registry.build(&spec)?)
}

fn add(
    strategy: &Strategy,
    kind: &str,
    slot: &str,
    registry: &FactorRegistry,
) -> Result<Strategy, MutationError> {
    let position = strategy
        .producer_of(strategy.output())
        .filter(|f| f.kind() == POSITION_KIND)
        .ok_or_else(|| GraphError::FactorNotFound(FactorId::new(strategy.output())))?;
    let position_id = position.id().clone();

    let descriptor = registry.descriptor(kind)?;
    let out_slot = descriptor
        .outputs
        .first()
        .ok_or_else(|| RegistryError::Corrupt {
            kind: kind.to_string(),
            detail: "no output slots".into(),
        })?;
    let matrix = fresh_matrix_name(strategy, out_slot.default.unwrap_or(kind));

    let mut spec = FactorSpec::new(kind);
    spec.outputs.insert(out_slot.name.to_string(), matrix.clone());
    let factor = build_unique(strategy, registry, spec)?;

    let mut rebind = FactorSpec::from_factor(position, Vec::new());
    rebind.inputs.insert(slot.to_string(), matrix);
    let rebound = registry.build(&rebind)?;

    let mut mutant = strategy.clone();
    mutant.replace_factor(&position_id, rebound)?;
    mutant.insert_before(factor, &[], &position_id)?;
    Ok(mutant)
}

fn remove(
    strategy: &Strategy,
    id: &FactorId,
    registry: &FactorRegistry,
    policy: RemovalPolicy,
) -> Result<Strategy, MutationError> {
    let target = strategy
        .factor(id)
        .ok_or_else(|| GraphError::FactorNotFound(id.clone()))?;
    let produced = target.produced_outputs();

    let mut mutant = strategy.clone();
    for dependent_id in strategy.dependents(id) {
        let Some(dependent) = strategy.factor(&dependent_id) else {
            continue;
        };
        let descriptor = registry.descriptor(dependent.kind())?;
        let reads = |(_, matrix): &&(String, String)| produced.contains(matrix);
        let detachable: Vec<&str> = dependent
            .input_bindings()
            .iter()
            .filter(reads)
            .filter(|(slot, _)| descriptor.input_slot(slot).is_some_and(|s| s.optional))
            .map(|(slot, _)| slot.as_str())
            .collect();
        if detachable.is_empty() {
            continue;
        }

        let mut spec = FactorSpec::from_factor(dependent, Vec::new());
        for slot in &detachable {
            spec.inputs.remove(*slot);
        }
        let rebuilt = registry.build(&spec)?;
        let still_reads = rebuilt.input_bindings().iter().any(|(_, m)| produced.contains(m));
        mutant.replace_factor(&dependent_id, rebuilt)?;
        if !still_reads {
            mutant.remove_dependency(&dependent_id, id)?;
        }
    }

    let removed = mutant.remove_factor(id, policy)?;
    tracing::trace!(factor = %id, removed = removed.len(), "structural remove");
    Ok(mutant)
}

fn replace(
    strategy: &Strategy,
    id: &FactorId,
    kind: &str,
    registry: &FactorRegistry,
) -> Result<Strategy, MutationError> {
    let old = strategy
        .factor(id)
        .ok_or_else(|| GraphError::FactorNotFound(id.clone()))?;
    let descriptor = registry.descriptor(kind)?;
    if descriptor.category != old.category() {
        return Err(RegistryError::ConstraintViolation {
            kind: kind.to_string(),
            detail: format!(
                "cannot replace {} factor '{}' with a {} factor",
                old.category(),
                id,
                descriptor.category
            ),
        }
        .into());
    }

    let mut spec = FactorSpec::new(kind);
    for (slot, matrix) in old.output_bindings() {
        spec.outputs.insert(slot.clone(), matrix.clone());
    }
    let replacement = build_unique(strategy, registry, spec)?;

    let mut mutant = strategy.clone();
    mutant.replace_factor(id, replacement)?;
    Ok(mutant)
}
