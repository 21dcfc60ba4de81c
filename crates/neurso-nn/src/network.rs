//! Ordered layer container.
//!
//! A [`Network`] is a `Vec<Layer>` with shape inference at append time:
//! the first layer is added with an explicit input shape, every later
//! layer inherits the previous layer's output shape. Incompatible
//! geometry is therefore rejected while the model is being built, not
//! midway through training.

use neurso_ad::{Graph, NodeId};
use neurso_core::{shared, CoreError, Shape, Tensor, TensorRef};

use crate::layers::Layer;

/// A feed-forward stack of layers.
#[derive(Debug, Clone, Default)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the first layer, configuring it with an explicit input shape.
    pub fn add_first_layer(
        &mut self,
        layer: impl Into<Layer>,
        input_shape: Shape,
    ) -> Result<(), CoreError> {
        let mut layer = layer.into();
        layer.set_input_shape(input_shape)?;
        self.layers.push(layer);
        Ok(())
    }

    /// Add a layer, inferring its input shape from the current output
    /// shape. Fails on an empty network; use
    /// [`add_first_layer`](Network::add_first_layer) for the head.
    pub fn add_layer(&mut self, layer: impl Into<Layer>) -> Result<(), CoreError> {
        let inferred = self.output_shape().ok_or(CoreError::UnconfiguredLayer)?;
        let mut layer = layer.into();
        layer.set_input_shape(inferred)?;
        self.layers.push(layer);
        Ok(())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.layers.first().and_then(Layer::input_shape)
    }

    pub fn output_shape(&self) -> Option<Shape> {
        self.layers.last().and_then(Layer::output_shape)
    }

    /// Total number of trainable scalars.
    pub fn trainable_parameters(&self) -> usize {
        self.layers.iter().map(Layer::trainable_parameters).sum()
    }

    /// All trainable tensors in stable layer-then-slot order. Optimizer
    /// scratch is positional, so this order must not change between
    /// calls while training.
    pub fn parameters(&self) -> Vec<TensorRef> {
        self.layers.iter().flat_map(Layer::parameters).collect()
    }

    /// Fold the layers over an already-inserted graph node.
    pub fn forward(&mut self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        let mut node = input;
        for layer in &mut self.layers {
            node = layer.forward(graph, node)?;
        }
        Ok(node)
    }

    /// Wrap a raw tensor as a graph leaf and fold the layers over it.
    pub fn forward_tensor(
        &mut self,
        graph: &mut Graph,
        input: Tensor,
    ) -> Result<NodeId, CoreError> {
        let leaf = graph.leaf(shared(input));
        self.forward(graph, leaf)
    }

    /// Inference-only forward: no tape, no gradients, output cloned out.
    pub fn predict(&mut self, input: Tensor) -> Result<Tensor, CoreError> {
        let mut graph = Graph::inference();
        let out = self.forward_tensor(&mut graph, input)?;
        let tensor = graph.value(out).read().clone();
        Ok(tensor)
    }

    /// Clear recurrent state in every layer.
    pub fn reset_state(&mut self) {
        for layer in &mut self.layers {
            layer.reset_state();
        }
    }

    /// Discard training-only scratch in every layer.
    pub fn only_use(&mut self) {
        for layer in &mut self.layers {
            layer.only_use();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Dense, Upsample};
    use neurso_ad::Activation;

    fn two_layer() -> Network {
        let mut net = Network::new();
        net.add_first_layer(
            Dense::new(4, Activation::Relu).with_seed(7),
            Shape::d1(2),
        )
        .unwrap();
        net.add_layer(Dense::new(3, Activation::Identity).with_seed(8))
            .unwrap();
        net
    }

    #[test]
    fn test_shape_inference_chains() {
        let net = two_layer();
        assert_eq!(net.input_shape().unwrap().dims(), &[2]);
        assert_eq!(net.output_shape().unwrap().dims(), &[3]);
        // (4×2 + 4) + (3×4 + 3)
        assert_eq!(net.trainable_parameters(), 12 + 15);
        assert_eq!(net.parameters().len(), 4);
    }

    #[test]
    fn test_add_layer_on_empty_network_fails() {
        let mut net = Network::new();
        assert!(matches!(
            net.add_layer(Dense::new(3, Activation::Relu)),
            Err(CoreError::UnconfiguredLayer)
        ));
    }

    #[test]
    fn test_predict_output_length() {
        let mut net = two_layer();
        let out = net.predict(Tensor::from_vec(vec![0.5, -0.5])).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_predict_records_nothing() {
        let mut net = two_layer();
        let before: Vec<Vec<f32>> = net
            .parameters()
            .iter()
            .map(|p| p.read().grad.clone())
            .collect();
        net.predict(Tensor::from_vec(vec![1.0, 1.0])).unwrap();
        let after: Vec<Vec<f32>> = net
            .parameters()
            .iter()
            .map(|p| p.read().grad.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_gradients_flow_through_stack() {
        let mut net = two_layer();
        let mut graph = Graph::recording();
        let out = net
            .forward_tensor(&mut graph, Tensor::from_vec(vec![0.9, 0.1]))
            .unwrap();
        graph.value(out).write().accumulate_grad(&[1.0, 1.0, 1.0]);
        graph.backward();

        let first_weight = net.parameters()[0].read().grad.clone();
        assert!(first_weight.iter().any(|g| *g != 0.0));
    }

    #[test]
    fn test_composite_layer_in_stack() {
        let mut net = Network::new();
        net.add_first_layer(
            Dense::new(3, Activation::Tanh).with_seed(2),
            Shape::d1(2),
        )
        .unwrap();
        net.add_layer(Upsample::new(2)).unwrap();
        assert_eq!(net.output_shape().unwrap().dims(), &[3, 2]);

        let out = net.predict(Tensor::from_vec(vec![0.1, 0.2])).unwrap();
        assert_eq!(out.len(), 6);
    }
}
