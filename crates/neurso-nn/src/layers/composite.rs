//! Composite/utility layers.
//!
//! These layers own no trainable tensors; each delegates its shape
//! bookkeeping to an internally owned [`PassThrough`] primitive instead of
//! duplicating the input/output plumbing.

use neurso_ad::{Activation, Graph, NodeId};
use neurso_core::{CoreError, Shape};

/// Primitive shape bookkeeping shared by the composite layers: a
/// configured input shape and the derived output shape.
#[derive(Debug, Clone, Default)]
pub struct PassThrough {
    input: Option<Shape>,
    output: Option<Shape>,
}

impl PassThrough {
    fn configure(&mut self, input: Shape, output: Shape) -> Result<(), CoreError> {
        if input.volume() == 0 {
            return Err(CoreError::EmptyShape);
        }
        self.input = Some(input);
        self.output = Some(output);
        Ok(())
    }

    fn input_shape(&self) -> Option<&Shape> {
        self.input.as_ref()
    }

    fn output_shape(&self) -> Option<Shape> {
        self.output.clone()
    }

    fn expect_configured(&self) -> Result<(), CoreError> {
        if self.input.is_none() {
            return Err(CoreError::UnconfiguredLayer);
        }
        Ok(())
    }
}

/// Activation applied to the whole input; shape is unchanged.
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    kind: Activation,
    plan: PassThrough,
}

impl ActivationLayer {
    pub fn new(kind: Activation) -> Self {
        Self {
            kind,
            plan: PassThrough::default(),
        }
    }

    pub fn kind(&self) -> Activation {
        self.kind
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.plan.input_shape()
    }

    pub fn output_shape(&self) -> Option<Shape> {
        self.plan.output_shape()
    }

    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        self.plan.configure(shape.clone(), shape)
    }

    pub fn forward(&self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        self.plan.expect_configured()?;
        graph.activate(input, self.kind)
    }
}

/// Copy/broadcast: the input repeated `copies` times.
#[derive(Debug, Clone)]
pub struct Broadcast {
    copies: usize,
    plan: PassThrough,
}

impl Broadcast {
    pub fn new(copies: usize) -> Self {
        Self {
            copies,
            plan: PassThrough::default(),
        }
    }

    pub fn copies(&self) -> usize {
        self.copies
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.plan.input_shape()
    }

    pub fn output_shape(&self) -> Option<Shape> {
        self.plan.output_shape()
    }

    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        if self.copies == 0 {
            return Err(CoreError::InvalidConfig("broadcast needs ≥1 copy".into()));
        }
        let output = Shape::d2(self.copies, shape.volume());
        self.plan.configure(shape, output)
    }

    pub fn forward(&self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        self.plan.expect_configured()?;
        let parts = vec![input; self.copies];
        graph.concat(&parts)
    }
}

/// Pooling-style duplication: every element repeated `factor` times.
#[derive(Debug, Clone)]
pub struct Upsample {
    factor: usize,
    plan: PassThrough,
}

impl Upsample {
    pub fn new(factor: usize) -> Self {
        Self {
            factor,
            plan: PassThrough::default(),
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.plan.input_shape()
    }

    pub fn output_shape(&self) -> Option<Shape> {
        self.plan.output_shape()
    }

    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        if self.factor == 0 {
            return Err(CoreError::InvalidConfig("upsample factor must be ≥1".into()));
        }
        // Explicit widening: the duplication axis is appended, never
        // implied.
        let output = shape.expand(self.factor);
        self.plan.configure(shape, output)
    }

    pub fn forward(&self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        self.plan.expect_configured()?;
        graph.duplicate(input, self.factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurso_core::{shared, Tensor};

    #[test]
    fn test_activation_layer_keeps_shape() {
        let mut layer = ActivationLayer::new(Activation::Softmax);
        layer.set_input_shape(Shape::d1(5)).unwrap();
        assert_eq!(layer.output_shape().unwrap().dims(), &[5]);
    }

    #[test]
    fn test_broadcast_shape_and_forward() {
        let mut layer = Broadcast::new(3);
        layer.set_input_shape(Shape::d1(2)).unwrap();
        assert_eq!(layer.output_shape().unwrap().dims(), &[3, 2]);

        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, 2.0])));
        let y = layer.forward(&mut graph, x).unwrap();
        assert_eq!(
            graph.value(y).read().data,
            vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_broadcast_gradient_fans_in() {
        let mut layer = Broadcast::new(2);
        layer.set_input_shape(Shape::d1(2)).unwrap();

        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, 2.0])));
        let y = layer.forward(&mut graph, x).unwrap();
        graph.value(y).write().accumulate_grad(&[1.0; 4]);
        graph.backward();
        assert_eq!(graph.value(x).read().grad, vec![2.0, 2.0]);
    }

    #[test]
    fn test_upsample_widens_explicitly() {
        let mut layer = Upsample::new(2);
        layer.set_input_shape(Shape::d2(2, 2)).unwrap();
        assert_eq!(layer.output_shape().unwrap().dims(), &[2, 2, 2]);
    }

    #[test]
    fn test_unconfigured_forward_fails() {
        let layer = Upsample::new(2);
        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0])));
        assert!(matches!(
            layer.forward(&mut graph, x),
            Err(CoreError::UnconfiguredLayer)
        ));
    }
}
