//! Variance-scaled weight initialization.
//!
//! Weights draw from a normal distribution whose standard deviation is
//! `sqrt(scale / (fan_in + shift))`, a fan-in-based denominator inside a
//! square root with a configurable additive term. Degenerate statistical
//! parameters (zero or negative scale) are substituted with a small
//! positive epsilon instead of raising, keeping training numerically
//! alive.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use neurso_core::Tensor;

/// Floor substituted for degenerate (zero/negative) scales.
const SCALE_EPSILON: f32 = 1e-4;

/// Variance-scaling rule for weight initialization.
#[derive(Debug, Clone, Copy)]
pub struct VarianceScaling {
    /// Numerator inside the square root (2.0 = He-style for ReLU nets).
    pub scale: f32,
    /// Additive term on the fan-in denominator.
    pub shift: f32,
}

impl Default for VarianceScaling {
    fn default() -> Self {
        Self {
            scale: 2.0,
            shift: 0.0,
        }
    }
}

impl VarianceScaling {
    /// Standard deviation for a given fan-in.
    pub fn std_dev(&self, fan_in: usize) -> f32 {
        let scale = if self.scale > 0.0 {
            self.scale
        } else {
            SCALE_EPSILON
        };
        let denom = fan_in as f32 + self.shift;
        let denom = if denom > 0.0 { denom } else { SCALE_EPSILON };
        (scale / denom).sqrt()
    }

    /// Fill a tensor's data with scaled normal draws.
    pub fn fill(&self, tensor: &mut Tensor, fan_in: usize, rng: &mut StdRng) {
        let std = self.std_dev(fan_in);
        // A zero-std Normal is still well-formed; fall back to the floor
        // only if the distribution itself is rejected.
        let dist = Normal::new(0.0f32, std)
            .unwrap_or_else(|_| Normal::new(0.0f32, SCALE_EPSILON).expect("epsilon std"));
        for v in tensor.data.iter_mut() {
            *v = dist.sample(rng);
        }
    }
}

/// Deterministic RNG for a layer seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
