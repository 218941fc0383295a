//! Tier 1 — parametric mutation.
//!
//! Rescales one parameter by a factor drawn from
//! `[scale_min, scale_max]`, snaps it back into its registered range, and
//! rebuilds the factor through the registry under the same id. Inputs,
//! outputs and edges never change.

use rand::Rng;

use factorlab_core::factor::ParamRange;
use factorlab_core::{FactorId, FactorRegistry, GraphError, RegistryError, Strategy};

use crate::config::ParametricConfig;
use crate::error::MutationError;
use crate::operation::{Candidate, Operation};
use crate::profile::is_tunable;

/// One candidate per tunable parameter of every factor.
pub fn candidates(strategy: &Strategy, registry: &FactorRegistry) -> Vec<Candidate> {
    let mut out = Vec::new();
    for factor in strategy.factors() {
        let Ok(descriptor) = registry.descriptor(factor.kind()) else {
            continue;
        };
        for spec in descriptor.params.iter().filter(|p| is_tunable(&p.range)) {
            out.push(Candidate::new(
                Operation::Perturb {
                    factor: factor.id().clone(),
                    param: spec.name.to_string(),
                },
                1.0,
            ));
        }
    }
    out
}

/// Draw a new in-range value different from `current`.
pub fn perturb_value<R: Rng>(
    range: &ParamRange,
    current: f64,
    config: &ParametricConfig,
    rng: &mut R,
) -> Option<f64> {
    match range {
        ParamRange::Choice(values) => {
            let others: Vec<f64> = values.iter().copied().filter(|v| *v != current).collect();
            (!others.is_empty()).then(|| others[rng.gen_range(0..others.len())])
        }
        ParamRange::Continuous { min, max } | ParamRange::Integer { min, max } => {
            // Zero cannot be rescaled; start from a small step into the range.
            let base = if current == 0.0 {
                (max - min) * 0.05
            } else {
                current
            };
            let scale = if config.scale_max > config.scale_min {
                rng.gen_range(config.scale_min..=config.scale_max)
            } else {
                config.scale_min
            };
            let up = range.clamp(base * scale);
            let down = range.clamp(base / scale);
            let mut next = if up != current { up } else { down };
            if next == current && matches!(range, ParamRange::Integer { .. }) {
                // Rounding swallowed the step; move one unit instead.
                let step = if scale >= 1.0 { 1.0 } else { -1.0 };
                next = range.clamp(current + step);
                if next == current {
                    next = range.clamp(current - step);
                }
            }
            (next != current).then_some(next)
        }
    }
}

/// Apply a `Perturb` operation, returning the mutant.
pub fn apply<R: Rng>(
    strategy: &Strategy,
    factor_id: &FactorId,
    param: &str,
    registry: &FactorRegistry,
    config: &ParametricConfig,
    rng: &mut R,
) -> Result<Strategy, MutationError> {
    let factor = strategy
        .factor(factor_id)
        .ok_or_else(|| GraphError::FactorNotFound(factor_id.clone()))?;
    let descriptor = registry.descriptor(factor.kind())?;
    let spec = descriptor
        .param_spec(param)
        .ok_or_else(|| RegistryError::UnknownParameter {
            kind: factor.kind().to_string(),
            param: param.to_string(),
        })?;
    let current = factor.param(param).unwrap_or(spec.default);
    let value = perturb_value(&spec.range, current, config, rng).ok_or_else(|| {
        MutationError::Stuck {
            factor: factor_id.clone(),
            param: param.to_string(),
            value: current,
        }
    })?;

    let mut params = factor.params().clone();
    params.insert(param.to_string(), value);
    let rebuilt = registry.reparameterize(factor, &params)?;

    let mut mutant = strategy.clone();
    mutant.replace_factor(factor_id, rebuilt)?;
    tracing::trace!(factor = %factor_id, param, from = current, to = value, "perturbed");
    Ok(mutant)
}
