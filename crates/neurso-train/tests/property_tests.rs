//! Property-based tests for the optimizer pipeline
//!
//! Uses proptest to verify update-rule invariants across random inputs

use proptest::prelude::*;

use neurso_core::{shared, Tensor, TensorRef};
use neurso_train::{OptimizerConfig, OptimizerKind};

fn param(data: Vec<f32>, grad: Vec<f32>) -> TensorRef {
    let mut t = Tensor::from_vec(data);
    t.accumulate_grad(&grad);
    shared(t)
}

const KINDS: [OptimizerKind; 5] = [
    OptimizerKind::Sgd,
    OptimizerKind::Adagrad,
    OptimizerKind::Adadelta,
    OptimizerKind::Adamax,
    OptimizerKind::RmsProp,
];

fn config_for(kind: OptimizerKind) -> OptimizerConfig {
    match kind {
        OptimizerKind::Sgd => OptimizerConfig::sgd(0.01),
        OptimizerKind::Adagrad => OptimizerConfig::adagrad(0.01),
        OptimizerKind::Adadelta => OptimizerConfig::adadelta(),
        OptimizerKind::Adamax => OptimizerConfig::adamax(0.01),
        OptimizerKind::RmsProp => OptimizerConfig::rmsprop(0.01),
    }
}

proptest! {
    /// With clip c, a plain SGD step never moves any weight by more than
    /// lr * c, no matter how large the raw gradient is.
    #[test]
    fn test_clip_bounds_every_update(
        grads in prop::collection::vec(-1e6f32..1e6, 1..32),
        clip in 0.5f32..10.0,
        lr in 0.001f32..0.1,
    ) {
        let before: Vec<f32> = vec![0.0; grads.len()];
        let p = param(before.clone(), grads);
        let mut opt = OptimizerConfig::sgd(lr).with_grad_clip(clip).build();
        opt.step(&[p.clone()]).unwrap();

        let bound = lr * clip + 1e-6;
        for (b, a) in before.iter().zip(&p.read().data) {
            prop_assert!((a - b).abs() <= bound, "moved {} > bound {}", (a - b).abs(), bound);
        }
    }

    /// Every optimizer kind consumes the gradient: after a step, all
    /// gradient entries are zero.
    #[test]
    fn test_step_is_the_gradient_reset_point(
        kind_index in 0usize..KINDS.len(),
        grads in prop::collection::vec(-10.0f32..10.0, 1..32),
    ) {
        let p = param(vec![1.0; grads.len()], grads);
        let mut opt = config_for(KINDS[kind_index]).build();
        opt.step(&[p.clone()]).unwrap();
        prop_assert!(p.read().grad.iter().all(|g| *g == 0.0));
    }

    /// Parameters stay finite under any finite gradient for every kind.
    #[test]
    fn test_updates_stay_finite(
        kind_index in 0usize..KINDS.len(),
        grads in prop::collection::vec(-1e4f32..1e4, 1..16),
    ) {
        let p = param(vec![0.5; grads.len()], grads);
        let mut opt = config_for(KINDS[kind_index]).build();
        opt.step(&[p.clone()]).unwrap();
        prop_assert!(p.read().data.iter().all(|v| v.is_finite()));
    }

    /// grad_gain scales a plain SGD step multiplicatively (below the
    /// clip threshold).
    #[test]
    fn test_grad_gain_scales_step(
        grad in -1.0f32..1.0,
        gain in 0.1f32..1.0,
    ) {
        let full = param(vec![0.0], vec![grad]);
        let mut opt = OptimizerConfig::sgd(0.1).with_grad_clip(0.0).build();
        opt.step(&[full.clone()]).unwrap();

        let scaled = param(vec![0.0], vec![grad]);
        let mut opt = OptimizerConfig::sgd(0.1)
            .with_grad_clip(0.0)
            .with_grad_gain(gain)
            .build();
        opt.step(&[scaled.clone()]).unwrap();

        let expected = full.read().data[0] * gain;
        prop_assert!((scaled.read().data[0] - expected).abs() < 1e-6);
    }
}
