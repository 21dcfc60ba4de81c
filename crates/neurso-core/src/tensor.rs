//! Flat tensor values: data, gradient, and optimizer scratch.
//!
//! A [`Tensor`] is the unit of differentiable state in the engine. It holds
//! four parallel `f32` buffers over one [`Shape`]:
//!
//! - `data`: the forward values
//! - `grad`: the accumulated gradient (`+=` across graph fan-out)
//! - `cache` / `cache2`: first/second-moment style optimizer scratch,
//!   sized lazily on first touch
//!
//! Invariant: `data.len() == grad.len() == shape.volume()`. Reading data
//! never mutates the gradient. Gradients are zeroed only by the optimizer's
//! update as a documented post-condition, nowhere else.
//!
//! # Examples
//!
//! ```
//! use neurso_core::{Shape, Tensor};
//!
//! // 1-D shape inferred from a flat sequence
//! let t = Tensor::from_vec(vec![1.0, 2.0, 3.0]);
//! assert_eq!(t.shape().dims(), &[3]);
//! assert_eq!(t.grad.len(), 3);
//!
//! // explicit shape pre-sizes every buffer
//! let z = Tensor::zeros(Shape::d2(2, 3));
//! assert_eq!(z.len(), 6);
//! ```

use parking_lot::RwLock;
use std::sync::Arc;

use crate::shape::Shape;

/// Shared tensor handle.
///
/// Trainable parameters are owned by layers and simultaneously referenced
/// by graph tapes and the optimizer; a lock-guarded shared handle keeps
/// those call sites honest. Tape walks are single-threaded, so locks are
/// uncontended there; the optimizer locks distinct tensors from distinct
/// rayon workers.
pub type TensorRef = Arc<RwLock<Tensor>>;

/// Wrap a tensor in a shared handle.
pub fn shared(tensor: Tensor) -> TensorRef {
    Arc::new(RwLock::new(tensor))
}

/// Flat data + gradient + optimizer scratch over one shape.
#[derive(Clone, Debug)]
pub struct Tensor {
    shape: Shape,
    /// Forward values, row-major.
    pub data: Vec<f32>,
    /// Accumulated gradient, parallel to `data`.
    pub grad: Vec<f32>,
    /// First-moment style optimizer scratch (lazily sized).
    pub cache: Vec<f32>,
    /// Second-moment style optimizer scratch (lazily sized).
    pub cache2: Vec<f32>,
}

impl Tensor {
    /// Construct from a flat sequence, inferring a 1-D shape.
    pub fn from_vec(data: Vec<f32>) -> Self {
        let shape = Shape::d1(data.len());
        let n = data.len();
        Self {
            shape,
            data,
            grad: vec![0.0; n],
            cache: Vec::new(),
            cache2: Vec::new(),
        }
    }

    /// Construct a zero-filled tensor with an explicit shape; data and
    /// gradient buffers are pre-sized to the shape's volume.
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.volume();
        Self {
            shape,
            data: vec![0.0; n],
            grad: vec![0.0; n],
            cache: Vec::new(),
            cache2: Vec::new(),
        }
    }

    /// Construct from flat data with an explicit shape.
    ///
    /// # Panics
    ///
    /// Debug-asserts the length invariant; release builds trust callers
    /// that validated shapes upstream.
    pub fn with_shape(data: Vec<f32>, shape: Shape) -> Self {
        debug_assert_eq!(data.len(), shape.volume());
        let n = data.len();
        Self {
            shape,
            data,
            grad: vec![0.0; n],
            cache: Vec::new(),
            cache2: Vec::new(),
        }
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length tensor (never produced by valid shapes).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Re-tag the tensor with a new shape of identical volume.
    pub fn reshaped(mut self, shape: Shape) -> Self {
        debug_assert_eq!(self.data.len(), shape.volume());
        self.shape = shape;
        self
    }

    /// Ensure the gradient and both optimizer scratch buffers are sized
    /// to the element count, then return them alongside data for an
    /// in-place update sweep. A tensor slimmed by
    /// [`Self::drop_training_state`] is quietly restored here instead of
    /// faulting.
    pub fn update_buffers(&mut self) -> (&mut [f32], &mut [f32], &mut [f32], &mut [f32]) {
        self.restore_training_state();
        let n = self.data.len();
        if self.cache.len() != n {
            self.cache.resize(n, 0.0);
        }
        if self.cache2.len() != n {
            self.cache2.resize(n, 0.0);
        }
        (
            &mut self.data,
            &mut self.grad,
            &mut self.cache,
            &mut self.cache2,
        )
    }

    /// Accumulate a gradient contribution (`+=`); supports fan-out across
    /// multiple graph paths. Restores the gradient buffer first, so a
    /// slimmed tensor can re-enter training.
    pub fn accumulate_grad(&mut self, contribution: &[f32]) {
        self.restore_training_state();
        debug_assert_eq!(contribution.len(), self.grad.len());
        for (g, c) in self.grad.iter_mut().zip(contribution) {
            *g += c;
        }
    }

    /// Discard training-only scratch, shrinking the tensor to its forward
    /// payload. Used by layers' `only_use` to slim a trained network.
    pub fn drop_training_state(&mut self) {
        self.grad = Vec::new();
        self.cache = Vec::new();
        self.cache2 = Vec::new();
    }

    /// Restore the gradient buffer after [`Self::drop_training_state`].
    /// Called by [`Self::update_buffers`] and [`Self::accumulate_grad`]
    /// so a slimmed network can be trained again.
    pub fn restore_training_state(&mut self) {
        if self.grad.len() != self.data.len() {
            self.grad = vec![0.0; self.data.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_infers_1d() {
        let t = Tensor::from_vec(vec![0.5; 8]);
        assert_eq!(t.shape().dims(), &[8]);
        assert_eq!(t.data.len(), t.grad.len());
        assert!(t.cache.is_empty());
    }

    #[test]
    fn test_zeros_presizes_buffers() {
        let t = Tensor::zeros(Shape::d3(2, 3, 4));
        assert_eq!(t.len(), 24);
        assert_eq!(t.grad.len(), 24);
    }

    #[test]
    fn test_update_buffers_lazily_sizes_scratch() {
        let mut t = Tensor::from_vec(vec![1.0, 2.0]);
        assert!(t.cache.is_empty());
        {
            let (_, _, cache, cache2) = t.update_buffers();
            assert_eq!(cache.len(), 2);
            assert_eq!(cache2.len(), 2);
        }
        // Idempotent
        let (_, _, cache, _) = t.update_buffers();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_grad_accumulates() {
        let mut t = Tensor::from_vec(vec![0.0; 3]);
        t.accumulate_grad(&[1.0, 2.0, 3.0]);
        t.accumulate_grad(&[0.5, 0.5, 0.5]);
        assert_eq!(t.grad, vec![1.5, 2.5, 3.5]);
        // data untouched
        assert_eq!(t.data, vec![0.0; 3]);
    }

    #[test]
    fn test_drop_and_restore_training_state() {
        let mut t = Tensor::from_vec(vec![1.0; 4]);
        t.update_buffers();
        t.drop_training_state();
        assert!(t.grad.is_empty());
        assert!(t.cache.is_empty());
        t.restore_training_state();
        assert_eq!(t.grad.len(), 4);
    }

    #[test]
    fn test_update_buffers_restores_slimmed_tensor() {
        let mut t = Tensor::from_vec(vec![1.0; 4]);
        t.drop_training_state();
        let (data, grad, cache, cache2) = t.update_buffers();
        assert_eq!(grad.len(), data.len());
        assert_eq!(cache.len(), 4);
        assert_eq!(cache2.len(), 4);
        assert!(grad.iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_accumulate_grad_after_drop() {
        let mut t = Tensor::from_vec(vec![1.0; 3]);
        t.drop_training_state();
        t.accumulate_grad(&[1.0, 2.0, 3.0]);
        assert_eq!(t.grad, vec![1.0, 2.0, 3.0]);
    }
}
