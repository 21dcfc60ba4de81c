//! Loss functions.
//!
//! Losses are the closed tagged set [`Loss`]. `measure` reports the
//! scalar loss; `backward` accumulates the elementwise `dL/da` into the
//! output tensor's gradient buffer, seeding the tape walk. Non-finite
//! values are passed through untouched; gradient clipping in the
//! optimizer is the sole numeric safeguard.

use neurso_core::{CoreError, Tensor};
use serde::{Deserialize, Serialize};

/// Probabilities are clamped away from 0 and 1 before taking logs.
const PROB_EPSILON: f32 = 1e-7;

/// Closed set of loss functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    /// `0.5 * Σ (a - t)²`; the default regression loss.
    SumSquares,
    /// Binary cross-entropy over per-element probabilities.
    CrossEntropy,
    /// Categorical cross-entropy assuming a softmax-normalized output;
    /// its gradient is the simplified `a - t` delta.
    SoftmaxCrossEntropy,
    /// `Σ (0.5 d² + 0.25 d⁴)`; the quartic term sharpens the penalty on
    /// outlier residuals.
    Quartic,
}

impl Loss {
    /// Scalar loss over a prediction/target pair.
    pub fn measure(&self, actual: &[f32], target: &[f32]) -> Result<f32, CoreError> {
        check_lengths(actual, target)?;
        let total = actual
            .iter()
            .zip(target)
            .map(|(&a, &t)| match self {
                Loss::SumSquares => {
                    let d = a - t;
                    0.5 * d * d
                }
                Loss::CrossEntropy => {
                    let a = clamp_prob(a);
                    -(t * a.ln() + (1.0 - t) * (1.0 - a).ln())
                }
                Loss::SoftmaxCrossEntropy => {
                    let a = clamp_prob(a);
                    -t * a.ln()
                }
                Loss::Quartic => {
                    let d = a - t;
                    0.5 * d * d + 0.25 * d * d * d * d
                }
            })
            .sum();
        Ok(total)
    }

    /// Accumulate `dL/da` into `actual.grad` (`+=`, matching the tape's
    /// fan-in convention).
    pub fn backward(&self, actual: &mut Tensor, target: &[f32]) -> Result<(), CoreError> {
        check_lengths(&actual.data, target)?;
        let deltas: Vec<f32> = actual
            .data
            .iter()
            .zip(target)
            .map(|(&a, &t)| match self {
                Loss::SumSquares => a - t,
                Loss::CrossEntropy => {
                    let a = clamp_prob(a);
                    (a - t) / (a * (1.0 - a))
                }
                // Simplified delta: the softmax layer's tape derivative
                // is a pass-through, so the full chain rule collapses
                // to this.
                Loss::SoftmaxCrossEntropy => a - t,
                Loss::Quartic => {
                    let d = a - t;
                    d + d * d * d
                }
            })
            .collect();
        actual.accumulate_grad(&deltas);
        Ok(())
    }
}

fn clamp_prob(p: f32) -> f32 {
    p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

fn check_lengths(actual: &[f32], target: &[f32]) -> Result<(), CoreError> {
    if actual.len() != target.len() {
        return Err(CoreError::LengthMismatch {
            left: actual.len(),
            right: target.len(),
            context: "loss prediction vs target",
        });
    }
    Ok(())
}
