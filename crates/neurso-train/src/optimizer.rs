//! Per-parameter optimizers.
//!
//! All kinds share one elementwise pipeline, applied in order:
//!
//! 1. L1/L2 regularization added to the raw gradient
//! 2. gain scaling (`grad_gain`, used by the trainer to average a batch)
//! 3. symmetric clip to `[-grad_clip, grad_clip]`
//! 4. the kind-specific delta, using the tensor's scratch caches
//! 5. in-place parameter write, then that element's gradient is zeroed
//!
//! Step 5 is the engine's single gradient reset point: gradients
//! accumulate across backward passes until the optimizer consumes them.
//! Non-finite gradients are never rejected; the clip is the only numeric
//! safeguard.

use neurso_core::{CoreError, TensorRef};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Closed set of update rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Gradient descent with optional momentum; `cache` holds the
    /// previous delta.
    Sgd,
    /// Accumulated squared gradients; `cache` only grows.
    Adagrad,
    /// Decaying averages of squared gradients (`cache`) and squared
    /// deltas (`cache2`); needs no learning rate.
    Adadelta,
    /// Adam variant with an infinity-norm second moment; `cache` is the
    /// first moment, `cache2` the running max.
    Adamax,
    /// Decaying average of squared gradients.
    RmsProp,
}

/// Optimizer hyperparameters, builder style.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub learning_rate: f32,
    pub momentum: f32,
    pub grad_clip: f32,
    pub l1: f32,
    pub l2: f32,
    pub grad_gain: f32,
    pub decay_rate: f32,
    pub epsilon: f32,
    pub beta1: f32,
    pub beta2: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Sgd,
            learning_rate: 0.01,
            momentum: 0.0,
            grad_clip: 5.0,
            l1: 0.0,
            l2: 0.0,
            grad_gain: 1.0,
            decay_rate: 0.9,
            epsilon: 1e-8,
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

impl OptimizerConfig {
    pub fn sgd(learning_rate: f32) -> Self {
        Self {
            kind: OptimizerKind::Sgd,
            learning_rate,
            ..Self::default()
        }
    }

    pub fn adagrad(learning_rate: f32) -> Self {
        Self {
            kind: OptimizerKind::Adagrad,
            learning_rate,
            ..Self::default()
        }
    }

    /// Adadelta derives its step size from the delta history; the
    /// learning rate field is unused.
    pub fn adadelta() -> Self {
        Self {
            kind: OptimizerKind::Adadelta,
            decay_rate: 0.95,
            ..Self::default()
        }
    }

    pub fn adamax(learning_rate: f32) -> Self {
        Self {
            kind: OptimizerKind::Adamax,
            learning_rate,
            ..Self::default()
        }
    }

    pub fn rmsprop(learning_rate: f32) -> Self {
        Self {
            kind: OptimizerKind::RmsProp,
            learning_rate,
            ..Self::default()
        }
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_grad_clip(mut self, grad_clip: f32) -> Self {
        self.grad_clip = grad_clip;
        self
    }

    pub fn with_l1(mut self, l1: f32) -> Self {
        self.l1 = l1;
        self
    }

    pub fn with_l2(mut self, l2: f32) -> Self {
        self.l2 = l2;
        self
    }

    pub fn with_grad_gain(mut self, grad_gain: f32) -> Self {
        self.grad_gain = grad_gain;
        self
    }

    pub fn build(self) -> Optimizer {
        Optimizer::new(self)
    }
}

/// Applies an [`OptimizerConfig`] to a parameter list.
///
/// Scratch caches live inside the tensors themselves, so the parameter
/// list must keep the same length across calls; a changed length is a
/// hard error rather than silently re-paired state.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    param_count: Option<usize>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            param_count: None,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Adjust the gain for the next step; the trainer sets this to
    /// `1 / batch_len` to average accumulated batch gradients.
    pub fn set_grad_gain(&mut self, grad_gain: f32) {
        self.config.grad_gain = grad_gain;
    }

    /// Consume accumulated gradients and update every parameter.
    pub fn step(&mut self, params: &[TensorRef]) -> Result<(), CoreError> {
        match self.param_count {
            None => self.param_count = Some(params.len()),
            Some(expected) if expected != params.len() => {
                return Err(CoreError::ParameterCountMismatch {
                    expected,
                    got: params.len(),
                });
            }
            Some(_) => {}
        }
        let config = self.config;
        // Tensors are disjoint buffers behind their own locks.
        params.par_iter().for_each(|param| {
            update_tensor(param, &config);
        });
        Ok(())
    }
}

fn update_tensor(param: &TensorRef, config: &OptimizerConfig) {
    let mut tensor = param.write();
    let (data, grad, cache, cache2) = tensor.update_buffers();
    for i in 0..data.len() {
        let mut g = grad[i];
        if config.l1 != 0.0 {
            g += config.l1 * data[i].signum();
        }
        if config.l2 != 0.0 {
            g += config.l2 * data[i];
        }
        g *= config.grad_gain;
        if config.grad_clip > 0.0 {
            g = g.clamp(-config.grad_clip, config.grad_clip);
        }
        let delta = match config.kind {
            OptimizerKind::Sgd => {
                let delta = config.learning_rate * g + config.momentum * cache[i];
                cache[i] = delta;
                delta
            }
            OptimizerKind::Adagrad => {
                cache[i] += g * g;
                config.learning_rate * g / (cache[i].sqrt() + config.epsilon)
            }
            OptimizerKind::Adadelta => {
                cache[i] = config.decay_rate * cache[i] + (1.0 - config.decay_rate) * g * g;
                let delta = g * (cache2[i] + config.epsilon).sqrt()
                    / (cache[i] + config.epsilon).sqrt();
                cache2[i] =
                    config.decay_rate * cache2[i] + (1.0 - config.decay_rate) * delta * delta;
                delta
            }
            OptimizerKind::Adamax => {
                cache[i] = config.beta1 * cache[i] + (1.0 - config.beta1) * g;
                cache2[i] = (config.beta2 * cache2[i]).max(g.abs());
                config.learning_rate * cache[i] / (cache2[i] + config.epsilon)
            }
            OptimizerKind::RmsProp => {
                cache[i] = config.decay_rate * cache[i] + (1.0 - config.decay_rate) * g * g;
                config.learning_rate * g / (cache[i].sqrt() + config.epsilon)
            }
        };
        data[i] -= delta;
        grad[i] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurso_core::{shared, Tensor};

    fn param(data: Vec<f32>, grad: Vec<f32>) -> TensorRef {
        let mut t = Tensor::from_vec(data);
        t.accumulate_grad(&grad);
        shared(t)
    }

    #[test]
    fn test_plain_sgd_moves_by_lr_times_grad() {
        let p = param(vec![1.0, -2.0], vec![0.5, -1.5]);
        let mut opt = OptimizerConfig::sgd(0.1).with_grad_clip(0.0).build();
        opt.step(&[p.clone()]).unwrap();
        let t = p.read();
        assert_eq!(t.data, vec![1.0 - 0.1 * 0.5, -2.0 + 0.1 * 1.5]);
        assert_eq!(t.grad, vec![0.0, 0.0]);
    }

    #[test]
    fn test_clip_bounds_effective_gradient() {
        let p = param(vec![0.0], vec![1000.0]);
        let mut opt = OptimizerConfig::sgd(1.0).with_grad_clip(2.0).build();
        opt.step(&[p.clone()]).unwrap();
        assert_eq!(p.read().data, vec![-2.0]);
    }

    #[test]
    fn test_momentum_compounds_across_steps() {
        let p = param(vec![0.0], vec![1.0]);
        let mut opt = OptimizerConfig::sgd(0.1).with_momentum(0.5).build();
        opt.step(&[p.clone()]).unwrap();
        assert!((p.read().data[0] - -0.1).abs() < 1e-7);
        p.write().accumulate_grad(&[1.0]);
        opt.step(&[p.clone()]).unwrap();
        // Second delta: 0.1 * 1.0 + 0.5 * 0.1
        assert!((p.read().data[0] - -0.25).abs() < 1e-7);
    }

    #[test]
    fn test_grad_gain_averages_batch() {
        let p = param(vec![0.0], vec![4.0]);
        let mut opt = OptimizerConfig::sgd(1.0)
            .with_grad_clip(0.0)
            .with_grad_gain(0.25)
            .build();
        opt.step(&[p.clone()]).unwrap();
        assert_eq!(p.read().data, vec![-1.0]);
    }

    #[test]
    fn test_l2_pulls_toward_zero() {
        let p = param(vec![2.0], vec![0.0]);
        let mut opt = OptimizerConfig::sgd(0.1).with_l2(0.5).build();
        opt.step(&[p.clone()]).unwrap();
        assert!(p.read().data[0] < 2.0);
    }

    #[test]
    fn test_adagrad_shrinks_effective_step() {
        let p = param(vec![0.0], vec![1.0]);
        let mut opt = OptimizerConfig::adagrad(0.1).build();
        opt.step(&[p.clone()]).unwrap();
        let first = -p.read().data[0];
        p.write().accumulate_grad(&[1.0]);
        let before = p.read().data[0];
        opt.step(&[p.clone()]).unwrap();
        let second = before - p.read().data[0];
        assert!(second < first);
    }

    #[test]
    fn test_param_count_change_is_rejected() {
        let a = param(vec![0.0], vec![0.0]);
        let b = param(vec![0.0], vec![0.0]);
        let mut opt = OptimizerConfig::sgd(0.1).build();
        opt.step(&[a.clone(), b]).unwrap();
        assert!(matches!(
            opt.step(&[a]),
            Err(CoreError::ParameterCountMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_step_after_drop_training_state_is_safe() {
        let p = param(vec![1.0, -1.0], vec![0.0, 0.0]);
        p.write().drop_training_state();
        let mut opt = OptimizerConfig::sgd(0.1).build();
        opt.step(&[p.clone()]).unwrap();
        // Restored gradient is zero, so the parameters hold still.
        let t = p.read();
        assert_eq!(t.data, vec![1.0, -1.0]);
        assert_eq!(t.grad, vec![0.0, 0.0]);
    }

    #[test]
    fn test_retraining_after_drop_applies_new_gradients() {
        let p = param(vec![0.0], vec![0.0]);
        p.write().drop_training_state();
        p.write().accumulate_grad(&[2.0]);
        let mut opt = OptimizerConfig::sgd(0.5).with_grad_clip(0.0).build();
        opt.step(&[p.clone()]).unwrap();
        assert_eq!(p.read().data, vec![-1.0]);
    }

    #[test]
    fn test_non_finite_gradient_is_clipped_not_rejected() {
        let p = param(vec![0.0], vec![f32::INFINITY]);
        let mut opt = OptimizerConfig::sgd(1.0).with_grad_clip(1.0).build();
        opt.step(&[p.clone()]).unwrap();
        assert_eq!(p.read().data, vec![-1.0]);
    }
}
