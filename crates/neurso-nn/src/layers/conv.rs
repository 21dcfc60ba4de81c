//! 2-D convolution layer (valid, stride 1).

use neurso_ad::{Activation, ConvDims, Graph, NodeId};
use neurso_core::{shared, CoreError, Shape, Tensor, TensorRef};

use crate::init::{seeded_rng, VarianceScaling};

/// Convolution over a `(channels, height, width)` input.
#[derive(Debug, Clone)]
pub struct Conv2d {
    filters: usize,
    kernel_height: usize,
    kernel_width: usize,
    activation: Activation,
    init: VarianceScaling,
    seed: u64,
    dims: Option<ConvDims>,
    input_shape: Option<Shape>,
    weight: Option<TensorRef>,
    bias: Option<TensorRef>,
}

impl Conv2d {
    /// Create a convolution layer with `filters` output channels and a
    /// `kernel_height × kernel_width` window.
    pub fn new(
        filters: usize,
        kernel_height: usize,
        kernel_width: usize,
        activation: Activation,
    ) -> Self {
        Self {
            filters,
            kernel_height,
            kernel_width,
            activation,
            init: VarianceScaling::default(),
            seed: 0x5eed_0003,
            dims: None,
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

    pub fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    /// Output shape is a pure function of the input geometry and the
    /// kernel configuration.
    pub fn output_shape(&self) -> Option<Shape> {
        self.dims
            .map(|d| Shape::d3(d.out_channels, d.out_height(), d.out_width()))
    }

    /// Configure the input shape (must be rank 3: channels, height,
    /// width); allocates kernels and per-channel bias.
    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        if shape.rank() != 3 {
            return Err(CoreError::InvalidConfig(format!(
                "conv2d expects a rank-3 input shape, got rank {}",
                shape.rank()
            )));
        }
        let (c, h, w) = (shape.dim(0)?, shape.dim(1)?, shape.dim(2)?);
        if h < self.kernel_height || w < self.kernel_width {
            return Err(CoreError::InvalidConfig(format!(
                "kernel {}x{} larger than input {}x{}",
                self.kernel_height, self.kernel_width, h, w
            )));
        }
        let dims = ConvDims {
            in_channels: c,
            in_height: h,
            in_width: w,
            out_channels: self.filters,
            kernel_height: self.kernel_height,
            kernel_width: self.kernel_width,
        };
        let fan_in = c * self.kernel_height * self.kernel_width;
        let mut rng = seeded_rng(self.seed);
        let mut weight = Tensor::zeros(Shape::d4(
            self.filters,
            c,
            self.kernel_height,
            self.kernel_width,
        ));
        self.init.fill(&mut weight, fan_in, &mut rng);
        self.weight = Some(shared(weight));
        self.bias = Some(shared(Tensor::zeros(Shape::d1(self.filters))));
        self.dims = Some(dims);
        self.input_shape = Some(shape);
        Ok(())
    }

    pub fn trainable_parameters(&self) -> usize {
        self.weight
            .as_ref()
            .map(|w| w.read().len() + self.filters)
            .unwrap_or(0)
    }

    /// Stable-ordered parameter handles: kernels, then bias.
    pub fn parameters(&self) -> Vec<TensorRef> {
        match (&self.weight, &self.bias) {
            (Some(w), Some(b)) => vec![w.clone(), b.clone()],
            _ => Vec::new(),
        }
    }

    pub fn forward(&self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        let dims = self.dims.ok_or(CoreError::UnconfiguredLayer)?;
        let weight = self.weight.as_ref().ok_or(CoreError::UnconfiguredLayer)?;
        let bias = self.bias.as_ref().ok_or(CoreError::UnconfiguredLayer)?;
        let k = graph.leaf(weight.clone());
        let b = graph.leaf(bias.clone());
        let pre = graph.conv2d(input, k, b, dims)?;
        graph.activate(pre, self.activation)
    }

    pub fn only_use(&mut self) {
        for param in self.parameters() {
            param.write().drop_training_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_is_pure_function() {
        let mut layer = Conv2d::new(8, 3, 3, Activation::Relu);
        layer.set_input_shape(Shape::d3(1, 28, 28)).unwrap();
        assert_eq!(layer.output_shape().unwrap().dims(), &[8, 26, 26]);
        assert_eq!(layer.trainable_parameters(), 8 * 9 + 8);
    }

    #[test]
    fn test_rejects_flat_input_shape() {
        let mut layer = Conv2d::new(4, 3, 3, Activation::Relu);
        assert!(layer.set_input_shape(Shape::d1(784)).is_err());
    }

    #[test]
    fn test_rejects_oversized_kernel() {
        let mut layer = Conv2d::new(4, 5, 5, Activation::Relu);
        assert!(layer.set_input_shape(Shape::d3(1, 4, 4)).is_err());
    }

    #[test]
    fn test_forward_output_volume() {
        let mut layer = Conv2d::new(2, 2, 2, Activation::Identity).with_seed(3);
        layer.set_input_shape(Shape::d3(1, 3, 3)).unwrap();

        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::with_shape(
            vec![0.5; 9],
            Shape::d3(1, 3, 3),
        )));
        let y = layer.forward(&mut graph, x).unwrap();
        assert_eq!(graph.value(y).read().len(), 2 * 2 * 2);
    }
}
