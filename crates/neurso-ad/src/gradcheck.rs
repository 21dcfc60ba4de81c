//! Numerical gradient checking.
//!
//! Central-difference comparison of analytical derivatives against
//! `(f(x+h) - f(x-h)) / 2h`, used by the property-test suites to pin the
//! activation backward maps and the tape rules to their forward maps.

use std::fmt;

use crate::activation::Activation;

/// Configuration for a gradient check sweep.
#[derive(Debug, Clone, Copy)]
pub struct GradCheckConfig {
    /// Central-difference step size.
    pub step: f32,
    /// Maximum tolerated |analytical - numerical|.
    pub tolerance: f32,
    /// Number of evenly spaced sample points across the input range.
    pub samples: usize,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            step: 1e-3,
            tolerance: 1e-3,
            samples: 24,
        }
    }
}

/// A detected mismatch between analytical and numerical derivatives.
#[derive(Debug, Clone, Copy)]
pub struct GradCheckMismatch {
    pub input: f32,
    pub analytical: f32,
    pub numerical: f32,
}

impl fmt::Display for GradCheckMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "derivative mismatch at x={}: analytical={}, numerical={}",
            self.input, self.analytical, self.numerical
        )
    }
}

impl std::error::Error for GradCheckMismatch {}

/// Central-difference derivative of a scalar map.
pub fn numerical_derivative<F: Fn(f32) -> f32>(f: F, x: f32, h: f32) -> f32 {
    (f(x + h) - f(x - h)) / (2.0 * h)
}

/// Check one elementwise activation's derivative across its characteristic
/// input range.
///
/// Sample points sit slightly off integer positions so kinked activations
/// (ReLU family) are never probed exactly at their non-differentiable
/// point.
pub fn check_activation(
    kind: Activation,
    config: &GradCheckConfig,
) -> Result<(), GradCheckMismatch> {
    debug_assert!(kind.is_elementwise());
    let (lo, hi) = kind.sample_range();
    let span = hi - lo;
    for i in 0..config.samples {
        let t = (i as f32 + 0.5) / config.samples as f32;
        let x = lo + t * span + 0.0137;
        let analytical = kind.derivative(x);
        let numerical = numerical_derivative(|v| kind.apply(v), x, config.step);
        if (analytical - numerical).abs() > config.tolerance {
            return Err(GradCheckMismatch {
                input: x,
                analytical,
                numerical,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_elementwise_activations_pass() {
        let config = GradCheckConfig::default();
        for kind in [
            Activation::Identity,
            Activation::Relu,
            Activation::LeakyRelu,
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::Softplus,
        ] {
            check_activation(kind, &config)
                .unwrap_or_else(|e| panic!("{:?} failed gradcheck: {}", kind, e));
        }
    }

    #[test]
    fn test_numerical_derivative_quadratic() {
        // d(x²)/dx at 3 is 6
        let d = numerical_derivative(|x| x * x, 3.0, 1e-3);
        assert!((d - 6.0).abs() < 1e-2);
    }
}
