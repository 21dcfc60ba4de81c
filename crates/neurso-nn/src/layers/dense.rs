//! Fully connected feedforward layer.

use neurso_ad::{Activation, Graph, NodeId};
use neurso_core::{shared, CoreError, Shape, Tensor, TensorRef};

use crate::init::{seeded_rng, VarianceScaling};

/// `y = act(W·x + b)` with a variance-scaled weight matrix.
///
/// The weight matrix is allocated when the input shape is configured
/// (directly or by network chaining); until then the layer only knows its
/// output width.
#[derive(Debug, Clone)]
pub struct Dense {
    outputs: usize,
    activation: Activation,
    init: VarianceScaling,
    seed: u64,
    input_shape: Option<Shape>,
    weight: Option<TensorRef>,
    bias: Option<TensorRef>,
}

impl Dense {
    /// Create a dense layer producing `outputs` values.
    pub fn new(outputs: usize, activation: Activation) -> Self {
        Self {
            outputs,
            activation,
            init: VarianceScaling::default(),
            seed: 0x5eed_0001,
            input_shape: None,
            weight: None,
            bias: None,
        }
    }

    /// Override the initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Override the variance-scaling rule.
    pub fn with_init(mut self, init: VarianceScaling) -> Self {
        self.init = init;
        self
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    pub fn output_shape(&self) -> Option<Shape> {
        self.input_shape.as_ref().map(|_| Shape::d1(self.outputs))
    }

    /// Configure the input shape; (re)allocates weights and bias for the
    /// new fan-in.
    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        let fan_in = shape.volume();
        if fan_in == 0 {
            return Err(CoreError::EmptyShape);
        }
        let mut rng = seeded_rng(self.seed);
        let mut weight = Tensor::zeros(Shape::d2(self.outputs, fan_in));
        self.init.fill(&mut weight, fan_in, &mut rng);
        self.weight = Some(shared(weight));
        self.bias = Some(shared(Tensor::zeros(Shape::d1(self.outputs))));
        self.input_shape = Some(shape);
        Ok(())
    }

    /// Trainable scalar count.
    pub fn trainable_parameters(&self) -> usize {
        self.weight
            .as_ref()
            .map(|w| w.read().len() + self.outputs)
            .unwrap_or(0)
    }

    /// Stable-ordered parameter handles: weight, then bias.
    pub fn parameters(&self) -> Vec<TensorRef> {
        match (&self.weight, &self.bias) {
            (Some(w), Some(b)) => vec![w.clone(), b.clone()],
            _ => Vec::new(),
        }
    }

    /// Run the affine + activation pair through the graph.
    pub fn forward(&self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        let weight = self.weight.as_ref().ok_or(CoreError::UnconfiguredLayer)?;
        let bias = self.bias.as_ref().ok_or(CoreError::UnconfiguredLayer)?;
        let w = graph.leaf(weight.clone());
        let b = graph.leaf(bias.clone());
        let pre = graph.affine(input, w, b)?;
        graph.activate(pre, self.activation)
    }

    /// Drop training-only scratch from the owned tensors.
    pub fn only_use(&mut self) {
        for param in self.parameters() {
            param.write().drop_training_state();
        }
    }

    /// Import an externally trained weight matrix and bias vector.
    ///
    /// `weights` is row-major `(outputs, inputs)`; the layer adopts the
    /// implied input shape.
    pub fn import_linear(&mut self, weights: Vec<f32>, bias: Vec<f32>) -> Result<(), CoreError> {
        if bias.len() != self.outputs {
            return Err(CoreError::LengthMismatch {
                left: bias.len(),
                right: self.outputs,
                context: "imported bias",
            });
        }
        if weights.is_empty() || weights.len() % self.outputs != 0 {
            return Err(CoreError::LengthMismatch {
                left: weights.len(),
                right: self.outputs,
                context: "imported weight matrix",
            });
        }
        let fan_in = weights.len() / self.outputs;
        self.weight = Some(shared(Tensor::with_shape(
            weights,
            Shape::d2(self.outputs, fan_in),
        )));
        self.bias = Some(shared(Tensor::with_shape(bias, Shape::d1(self.outputs))));
        self.input_shape = Some(Shape::d1(fan_in));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_inference() {
        let mut layer = Dense::new(3, Activation::Relu);
        assert!(layer.output_shape().is_none());
        layer.set_input_shape(Shape::d1(5)).unwrap();
        assert_eq!(layer.output_shape().unwrap().dims(), &[3]);
        assert_eq!(layer.trainable_parameters(), 5 * 3 + 3);
    }

    #[test]
    fn test_forward_before_configure_fails() {
        let layer = Dense::new(2, Activation::Identity);
        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0])));
        assert!(matches!(
            layer.forward(&mut graph, x),
            Err(CoreError::UnconfiguredLayer)
        ));
    }

    #[test]
    fn test_import_linear() {
        let mut layer = Dense::new(2, Activation::Identity);
        layer
            .import_linear(vec![1.0, 0.0, 0.0, 1.0], vec![0.5, -0.5])
            .unwrap();
        assert_eq!(layer.input_shape().unwrap().dims(), &[2]);

        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::from_vec(vec![3.0, 4.0])));
        let y = layer.forward(&mut graph, x).unwrap();
        assert_eq!(graph.value(y).read().data, vec![3.5, 3.5]);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let mut a = Dense::new(4, Activation::Tanh).with_seed(99);
        let mut b = Dense::new(4, Activation::Tanh).with_seed(99);
        a.set_input_shape(Shape::d1(6)).unwrap();
        b.set_input_shape(Shape::d1(6)).unwrap();
        assert_eq!(
            a.parameters()[0].read().data,
            b.parameters()[0].read().data
        );
    }
}
