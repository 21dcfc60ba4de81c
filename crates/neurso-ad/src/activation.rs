//! Elementwise activation maps.
//!
//! Activations are a closed set of stateless forward/backward pairs. The
//! tape records the activation kind alongside its operand ids, so backward
//! re-derives the local slope from the saved pre-activation input.
//!
//! Softmax is the one non-elementwise member: its forward normalizes the
//! whole vector, and its tape derivative is a documented pass-through
//! (`1.0`), pairing with the softmax cross-entropy loss that seeds the
//! simplified `a - t` delta.

use serde::{Deserialize, Serialize};

const LEAKY_SLOPE: f32 = 0.01;

/// Closed activation set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// f(x) = x
    Identity,
    /// f(x) = max(0, x)
    Relu,
    /// f(x) = x for x > 0, 0.01·x otherwise
    LeakyRelu,
    /// f(x) = 1 / (1 + e^-x)
    Sigmoid,
    /// f(x) = tanh(x)
    Tanh,
    /// f(x) = ln(1 + e^x)
    Softplus,
    /// Vector-normalizing exponential; pass-through derivative on the tape.
    Softmax,
}

impl Activation {
    /// True for activations that act element-by-element.
    pub fn is_elementwise(&self) -> bool {
        !matches!(self, Activation::Softmax)
    }

    /// Elementwise forward map.
    ///
    /// `Softmax` falls back to identity here; use [`Activation::forward_slice`]
    /// for the vector form.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Identity | Activation::Softmax => x,
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_SLOPE * x
                }
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Softplus => (1.0 + x.exp()).ln(),
        }
    }

    /// Local derivative at the pre-activation input `x`.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_SLOPE
                }
            }
            Activation::Sigmoid => {
                let s = 1.0 / (1.0 + (-x).exp());
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Softplus => 1.0 / (1.0 + (-x).exp()),
            // Paired with the simplified softmax cross-entropy delta.
            Activation::Softmax => 1.0,
        }
    }

    /// Vector forward map; handles the softmax normalization.
    pub fn forward_slice(&self, input: &[f32], out: &mut [f32]) {
        debug_assert_eq!(input.len(), out.len());
        match self {
            Activation::Softmax => {
                // Shift by the max for numeric stability.
                let max = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for (o, &x) in out.iter_mut().zip(input) {
                    let e = (x - max).exp();
                    *o = e;
                    sum += e;
                }
                if sum > 0.0 {
                    for o in out.iter_mut() {
                        *o /= sum;
                    }
                }
            }
            _ => {
                for (o, &x) in out.iter_mut().zip(input) {
                    *o = self.apply(x);
                }
            }
        }
    }

    /// A characteristic input range for derivative sampling.
    pub fn sample_range(&self) -> (f32, f32) {
        match self {
            Activation::Sigmoid | Activation::Tanh => (-6.0, 6.0),
            _ => (-4.0, 4.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_forward() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::Relu.apply(3.0), 3.0);
        assert_eq!(Activation::Relu.derivative(-2.0), 0.0);
        assert_eq!(Activation::Relu.derivative(3.0), 1.0);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        let a = Activation::Sigmoid;
        assert!((a.apply(0.0) - 0.5).abs() < 1e-6);
        assert!((a.apply(3.0) + a.apply(-3.0) - 1.0).abs() < 1e-6);
        // Derivative peaks at 0 with value 0.25
        assert!((a.derivative(0.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_normalizes() {
        let input = [1.0, 2.0, 3.0];
        let mut out = [0.0; 3];
        Activation::Softmax.forward_slice(&input, &mut out);
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_softmax_stability_large_inputs() {
        let input = [1000.0, 1000.0];
        let mut out = [0.0; 2];
        Activation::Softmax.forward_slice(&input, &mut out);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_softplus_derivative_is_sigmoid() {
        let x = 0.7;
        let d = Activation::Softplus.derivative(x);
        let s = Activation::Sigmoid.apply(x);
        assert!((d - s).abs() < 1e-6);
    }
}
