//! Deterministic random number generation.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! The only stochastic step is the lottery-based support scheme, and
//! its draws flow through a StageRng derived from the scenario seed.
//!
//! Each stage gets its own RNG stream, seeded from (seed XOR slot index),
//! so adding a stream never perturbs an existing one.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const UNIT_53: f64 = 1.0 / (1u64 << 53) as f64;

/// A named, deterministic RNG for a single pipeline stage.
pub struct StageRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StageRng {
    /// Create a stage RNG from the scenario seed and a stable slot index.
    /// The index must never change once assigned.
    pub fn new(seed: u64, slot_index: u64) -> Self {
        let derived_seed = seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Uniform draw in [0, 1) from the top 53 bits of the stream.
    pub fn next_f64(&mut self) -> f64 {
        (self.inner.next_u64() >> 11) as f64 * UNIT_53
    }
}

/// All stage RNGs for a single scenario run.
pub struct RngBank {
    seed: u64,
}

impl RngBank {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn for_stage(&self, slot: StageSlot) -> StageRng {
        StageRng::new(self.seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stream assignments.
/// NEVER reorder or remove entries, only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    SupportLottery = 0,
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SupportLottery => "support_lottery",
        }
    }
}
