//! Weight initialization strategies. Xavier is the default; a seeded variant
//! exists for reproducible networks. Per SPEC_FULL.md §4.1, the draw order
//! (weight-then-bias, per neuron, per layer) lives in `Network::generate_random_weights`
//! — this module only owns the distributions.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Produces initial weights and biases for a network. Implementations may
/// keep per-instance generator state; they are not required to be `Sync`.
pub trait WeightInitializer {
    fn random_weight(&mut self, weights_per_neuron: u32) -> f32;
    fn random_bias(&mut self) -> f32;
}

/// The default seed used by the reference implementation this engine
/// reproduces bit-for-bit (see SPEC_FULL.md §11).
pub const DEFAULT_SEED: u64 = 5489;

/// Xavier/Glorot initialization: weights ~ N(0, 1/sqrt(n)), biases ~ N(0, 1).
pub struct XavierInitializer {
    rng: StdRng,
}

impl XavierInitializer {
    /// Uses the default seed, matching the reference implementation's
    /// behavior when no seed is supplied.
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Seeds from OS entropy; reproducibility is then the caller's problem.
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }
}

impl Default for XavierInitializer {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightInitializer for XavierInitializer {
    fn random_weight(&mut self, weights_per_neuron: u32) -> f32 {
        let std_dev = 1.0 / (weights_per_neuron.max(1) as f32).sqrt();
        let dist = Normal::new(0.0f32, std_dev).expect("finite std dev");
        dist.sample(&mut self.rng)
    }

    fn random_bias(&mut self) -> f32 {
        let dist = Normal::new(0.0f32, 1.0f32).expect("finite std dev");
        dist.sample(&mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_initializer_is_deterministic() {
        let mut a = XavierInitializer::with_seed(42);
        let mut b = XavierInitializer::with_seed(42);
        for _ in 0..10 {
            assert_eq!(a.random_weight(8), b.random_weight(8));
            assert_eq!(a.random_bias(), b.random_bias());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = XavierInitializer::with_seed(1);
        let mut b = XavierInitializer::with_seed(2);
        assert_ne!(a.random_weight(8), b.random_weight(8));
    }
}
