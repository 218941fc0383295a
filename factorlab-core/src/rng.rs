//! Deterministic RNG hierarchy.
//!
//! A master seed generates sub-seeds for each `(strategy, slot)` pair, where
//! the strategy is identified by its full hash and the slot is a population
//! index or mutation round. Derivation hashes its inputs with BLAKE3, so
//! seeds do not depend on the order in which workers ask for them, and
//! results are identical regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::fingerprint::FullHash;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one strategy at one slot.
    pub fn sub_seed(&self, strategy: &FullHash, slot: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(strategy.0.as_bytes());
        hasher.update(&slot.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn rng_for(&self, strategy: &FullHash, slot: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(strategy, slot))
    }
}
