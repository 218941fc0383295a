//! Validate-and-retry mutation loop.
//!
//! One `mutate` call:
//! 1. validates the input strategy and detects its profile
//! 2. selects a tier (weighted draw or risk-score band)
//! 3. draws one untried operation from that tier, falling back to the
//!    other tiers lowest risk first when it has none left
//! 4. applies it and runs the three-stage validator on the mutant
//! 5. on rejection, records the attempt and goes back to 2, at most
//!    `max_retries` times
//!
//! Every attempt's `(tier, operation, target)` key enters an exhaustion set,
//! so no operation is tried twice within one call. Running out of attempts
//! or operations is a failed [`MutationResult`], never an error; only a
//! corrupt registry or a broken tier-1 invariant escapes as
//! [`FatalMutationError`].

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, info};

use factorlab_core::rng::RngHierarchy;
use factorlab_core::{Diagnose, Diagnostic, FactorRegistry, ReasonCode, Strategy};

use crate::config::MutationConfig;
use crate::error::{FatalMutationError, MutationError};
use crate::operation::{pick, Candidate, OpKey, Operation};
use crate::profile::StrategyProfile;
use crate::result::{AttemptOutcome, AttemptRecord, MutationResult};
use crate::stats::MutationStats;
use crate::tier::{select_tier, Tier};
use crate::validate::Validator;
use crate::{logic, parametric, structural};

/// Stateless mutation engine over a shared registry.
///
/// The engine holds no counters; callers own a [`MutationStats`] and pass it
/// into each call, so one engine can serve many worker threads.
#[derive(Debug, Clone)]
pub struct MutationEngine<'r> {
    registry: &'r FactorRegistry,
    config: MutationConfig,
    validator: Validator,
}

impl<'r> MutationEngine<'r> {
    /// Verify the registry and configuration up front.
    pub fn new(
        registry: &'r FactorRegistry,
        config: MutationConfig,
    ) -> Result<Self, FatalMutationError> {
        registry
            .verify()
            .map_err(FatalMutationError::RegistryCorrupt)?;
        config.validate()?;
        Ok(Self {
            registry,
            config,
            validator: Validator::default(),
        })
    }

    /// Validate mutants against a different smoke container.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    pub fn registry(&self) -> &FactorRegistry {
        self.registry
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Mutate `strategy`, making at most `max_retries` attempts.
    pub fn mutate<R: Rng>(
        &self,
        strategy: &Strategy,
        max_retries: usize,
        rng: &mut R,
        stats: &mut MutationStats,
    ) -> Result<MutationResult, FatalMutationError> {
        let parent_hash = strategy.full_hash();

        // A broken parent is the caller's problem; report it without retrying.
        if let Err(err) = self.validator.validate(strategy, self.registry) {
            let diagnostic = err.diagnostic();
            debug!(
                parent = parent_hash.short(),
                reason = %diagnostic.code,
                "input strategy rejected"
            );
            stats.record_reason(diagnostic.code);
            stats.record_outcome(false);
            return Ok(MutationResult::failed(parent_hash, vec![diagnostic]));
        }

        let profile = StrategyProfile::detect(strategy, self.registry);
        let mut tried: HashSet<OpKey> = HashSet::new();
        let mut result = MutationResult::failed(parent_hash, Vec::new());

        for attempt in 1..=max_retries {
            let primary = select_tier(&self.config, &profile, stats, rng);
            let next = self.next_operation(strategy, &profile, primary, &tried, rng);
            let Some((tier, candidate)) = next else {
                let diagnostic = Diagnostic::new(
                    ReasonCode::NoApplicableMutation,
                    format!("no untried mutation applies after {} attempt(s)", attempt - 1),
                );
                return Ok(self.fail(result, diagnostic, stats));
            };

            let key = candidate.op.key();
            tried.insert(key.clone());
            result.attempts = attempt;
            result.tier_used = Some(tier);

            match self.apply(strategy, &candidate.op, rng) {
                Ok(mutant) => {
                    if tier == Tier::Parametric {
                        check_structure_preserved(strategy, &mutant, &key)?;
                    }
                    let child_hash = mutant.full_hash();
                    info!(
                        parent = result.parent_hash.short(),
                        child = child_hash.short(),
                        %tier,
                        op = %key,
                        attempt,
                        "mutation accepted"
                    );
                    stats.record_attempt(tier, None);
                    stats.record_outcome(true);
                    result.log.push(AttemptRecord {
                        attempt,
                        tier,
                        op: key,
                        outcome: AttemptOutcome::Accepted,
                    });
                    result.success = true;
                    result.child_hash = Some(child_hash);
                    result.mutated = Some(mutant);
                    return Ok(result);
                }
                Err(err) => {
                    let diagnostic = err.diagnostic();
                    debug!(
                        attempt,
                        %tier,
                        op = %key,
                        reason = %diagnostic.code,
                        detail = %diagnostic.detail,
                        "mutation rejected"
                    );
                    stats.record_attempt(tier, Some(diagnostic.code));
                    result.log.push(AttemptRecord {
                        attempt,
                        tier,
                        op: key,
                        outcome: AttemptOutcome::Rejected {
                            diagnostic: diagnostic.clone(),
                        },
                    });
                    result.diagnostics.push(diagnostic);
                }
            }
        }

        let diagnostic = Diagnostic::new(
            ReasonCode::RetriesExhausted,
            format!("no valid mutant within {max_retries} attempt(s)"),
        )
        .with_context("max_retries", serde_json::json!(max_retries));
        Ok(self.fail(result, diagnostic, stats))
    }

    fn fail(
        &self,
        mut result: MutationResult,
        diagnostic: Diagnostic,
        stats: &mut MutationStats,
    ) -> MutationResult {
        debug!(
            parent = result.parent_hash.short(),
            attempts = result.attempts,
            reason = %diagnostic.code,
            "mutation failed"
        );
        stats.record_reason(diagnostic.code);
        stats.record_outcome(false);
        result.diagnostics.push(diagnostic);
        result
    }

    /// Applicable operations of one tier.
    pub fn candidates(
        &self,
        strategy: &Strategy,
        profile: &StrategyProfile,
        tier: Tier,
    ) -> Vec<Candidate> {
        match tier {
            Tier::Parametric => parametric::candidates(strategy, self.registry),
            Tier::Structural => {
                structural::candidates(strategy, profile, self.registry, &self.config.structural)
            }
            Tier::Logic => logic::candidates(strategy, profile, &self.config.logic),
        }
    }

    /// Draw an untried operation from `primary`, else from the fallback tiers.
    /// Zero-weight operations are disabled.
    fn next_operation<R: Rng>(
        &self,
        strategy: &Strategy,
        profile: &StrategyProfile,
        primary: Tier,
        tried: &HashSet<OpKey>,
        rng: &mut R,
    ) -> Option<(Tier, Candidate)> {
        for tier in primary.fallback_order() {
            // Tiers weighted out of the configuration never run.
            if tier.weight(&self.config.tiers) <= 0.0 {
                continue;
            }
            let open: Vec<Candidate> = self
                .candidates(strategy, profile, tier)
                .into_iter()
                .filter(|c| c.weight > 0.0 && !tried.contains(&c.op.key()))
                .collect();
            if let Some(candidate) = pick(rng, &open) {
                if tier != primary {
                    debug!(%primary, fallback = %tier, "tier exhausted, falling back");
                }
                return Some((tier, candidate.clone()));
            }
        }
        None
    }

    /// Apply one operation and validate the mutant.
    fn apply<R: Rng>(
        &self,
        strategy: &Strategy,
        op: &Operation,
        rng: &mut R,
    ) -> Result<Strategy, MutationError> {
        let mutant = match op {
            Operation::Perturb { factor, param } => parametric::apply(
                strategy,
                factor,
                param,
                self.registry,
                &self.config.parametric,
                rng,
            )?,
            Operation::AddFactor { .. }
            | Operation::RemoveFactor { .. }
            | Operation::ReplaceFactor { .. } => {
                structural::apply(strategy, op, self.registry, &self.config.structural, rng)?
            }
            Operation::SubstituteOperator { .. } | Operation::CombineSignals { .. } => {
                logic::apply(strategy, op, self.registry, rng)?
            }
        };
        self.validator.validate(&mutant, self.registry)?;
        Ok(mutant)
    }
}

/// A parametric mutant must keep every factor id and edge.
fn check_structure_preserved(
    parent: &Strategy,
    mutant: &Strategy,
    op: &OpKey,
) -> Result<(), FatalMutationError> {
    if parent.factor_ids() != mutant.factor_ids()
        || parent.edges() != mutant.edges()
        || parent.structure_hash() != mutant.structure_hash()
    {
        return Err(FatalMutationError::InvariantViolated(format!(
            "parametric mutation {op} changed the graph structure"
        )));
    }
    Ok(())
}

/// One-shot entry point: build an engine and mutate with an RNG seeded from
/// `config.seed` and the strategy's full hash.
pub fn mutate(
    strategy: &Strategy,
    registry: &FactorRegistry,
    config: &MutationConfig,
    max_retries: usize,
) -> Result<MutationResult, FatalMutationError> {
    let engine = MutationEngine::new(registry, config.clone())?;
    let mut rng = RngHierarchy::new(config.seed).rng_for(&strategy.full_hash(), 0);
    let mut stats = MutationStats::new();
    engine.mutate(strategy, max_retries, &mut rng, &mut stats)
}
