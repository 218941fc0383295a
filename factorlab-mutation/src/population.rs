//! Parallel mutation of a strategy population.
//!
//! Each strategy gets its own RNG from the seed hierarchy, keyed by its full
//! hash and a slot combining the round and its population index, and its own
//! statistics accumulator. Accumulators are merged in population order
//! afterwards, so results and statistics are identical with or without the
//! rayon pool.

use rayon::prelude::*;

use factorlab_core::rng::RngHierarchy;
use factorlab_core::Strategy;

use crate::engine::MutationEngine;
use crate::error::FatalMutationError;
use crate::result::MutationResult;
use crate::stats::MutationStats;

#[derive(Debug)]
pub struct PopulationResult {
    /// One result per input strategy, in input order.
    pub results: Vec<MutationResult>,
    pub stats: MutationStats,
}

impl PopulationResult {
    /// Accepted mutants, in input order.
    pub fn mutants(&self) -> impl Iterator<Item = &Strategy> {
        self.results.iter().filter_map(|r| r.mutated.as_ref())
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// RNG slot for population member `index` in `round`.
fn slot(round: u32, index: usize) -> u64 {
    (u64::from(round) << 32) | (index as u64 & 0xFFFF_FFFF)
}

/// Mutate every strategy once with `engine.config().max_retries` attempts.
pub fn mutate_population(
    engine: &MutationEngine<'_>,
    strategies: &[Strategy],
    round: u32,
    parallel: bool,
) -> Result<PopulationResult, FatalMutationError> {
    let hierarchy = RngHierarchy::new(engine.config().seed);
    let max_retries = engine.config().max_retries;

    let mutate_one = |(index, strategy): (usize, &Strategy)| -> Result<_, FatalMutationError> {
        let mut rng = hierarchy.rng_for(&strategy.full_hash(), slot(round, index));
        let mut stats = MutationStats::new();
        let result = engine.mutate(strategy, max_retries, &mut rng, &mut stats)?;
        Ok((result, stats))
    };

    let outcomes: Vec<(MutationResult, MutationStats)> = if parallel {
        strategies
            .par_iter()
            .enumerate()
            .map(mutate_one)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        strategies
            .iter()
            .enumerate()
            .map(mutate_one)
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut stats = MutationStats::new();
    let mut results = Vec::with_capacity(outcomes.len());
    for (result, worker) in outcomes {
        stats.merge(&worker);
        results.push(result);
    }
    tracing::debug!(
        round,
        population = strategies.len(),
        accepted = stats.successes,
        "population mutated"
    );
    Ok(PopulationResult { results, stats })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_separate_rounds_and_indices() {
        assert_ne!(slot(0, 1), slot(1, 0));
        assert_ne!(slot(0, 1), slot(0, 2));
        assert_eq!(slot(0, 7), 7);
    }
}
