//! Gated recurrent (LSTM) layer with persisted state.
//!
//! Hidden and cell tensors are owned by the layer instance and carry over
//! between sequential `forward` calls on the same instance. That is the
//! intended design for streaming/online sequence use, where callers should
//! not have to thread state explicitly. [`Lstm::reset_state`] is the one explicit
//! way to clear them.

use neurso_ad::{Activation, Graph, NodeId};
use neurso_core::{shared, CoreError, Shape, Tensor, TensorRef};

use crate::init::{seeded_rng, VarianceScaling};

/// One LSTM cell over flat inputs.
///
/// Four gates (forget, input, output, candidate) each apply an affine map
/// to `concat(x, h_prev)`. Within one graph, consecutive timesteps chain
/// through the persisted state tensors, so a sequence driven through a
/// single recording graph backpropagates across all of its steps.
#[derive(Debug, Clone)]
pub struct Lstm {
    units: usize,
    init: VarianceScaling,
    seed: u64,
    input_shape: Option<Shape>,
    // Gate order: forget, input, output, candidate.
    weights: Vec<TensorRef>,
    biases: Vec<TensorRef>,
    hidden: Option<TensorRef>,
    cell: Option<TensorRef>,
}

impl Lstm {
    /// Create an LSTM layer with `units` hidden units.
    pub fn new(units: usize) -> Self {
        Self {
            units,
            init: VarianceScaling::default(),
            seed: 0x5eed_0002,
            input_shape: None,
            weights: Vec::new(),
            biases: Vec::new(),
            hidden: None,
            cell: None,
        }
    }

    /// Override the initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    pub fn output_shape(&self) -> Option<Shape> {
        self.input_shape.as_ref().map(|_| Shape::d1(self.units))
    }

    /// Configure the input shape; allocates the four gate matrices over
    /// `concat(x, h)` and zeroed state tensors.
    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        let fan_in = shape.volume() + self.units;
        if fan_in == 0 {
            return Err(CoreError::EmptyShape);
        }
        let mut rng = seeded_rng(self.seed);
        self.weights.clear();
        self.biases.clear();
        for gate in 0..4 {
            let mut w = Tensor::zeros(Shape::d2(self.units, fan_in));
            self.init.fill(&mut w, fan_in, &mut rng);
            self.weights.push(shared(w));

            let mut b = Tensor::zeros(Shape::d1(self.units));
            if gate == 0 {
                // Forget gate starts open.
                b.data.fill(1.0);
            }
            self.biases.push(shared(b));
        }
        self.hidden = Some(shared(Tensor::zeros(Shape::d1(self.units))));
        self.cell = Some(shared(Tensor::zeros(Shape::d1(self.units))));
        self.input_shape = Some(shape);
        Ok(())
    }

    /// Clear persisted hidden/cell state back to zeros.
    pub fn reset_state(&mut self) {
        if self.input_shape.is_some() {
            self.hidden = Some(shared(Tensor::zeros(Shape::d1(self.units))));
            self.cell = Some(shared(Tensor::zeros(Shape::d1(self.units))));
        }
    }

    pub fn trainable_parameters(&self) -> usize {
        self.weights
            .iter()
            .map(|w| w.read().len())
            .chain(self.biases.iter().map(|b| b.read().len()))
            .sum()
    }

    /// Stable-ordered parameter handles: the four gate weights, then the
    /// four gate biases. State tensors are not parameters.
    pub fn parameters(&self) -> Vec<TensorRef> {
        self.weights
            .iter()
            .chain(self.biases.iter())
            .cloned()
            .collect()
    }

    /// One timestep. Consumes the persisted state and replaces it with
    /// this step's cell/hidden outputs.
    pub fn forward(&mut self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        let shape = self
            .input_shape
            .as_ref()
            .ok_or(CoreError::UnconfiguredLayer)?;
        let expected = shape.volume();
        let got = graph.value(input).read().len();
        if got != expected {
            return Err(CoreError::ShapeMismatch { expected, got });
        }
        let hidden = self.hidden.clone().ok_or(CoreError::UnconfiguredLayer)?;
        let cell = self.cell.clone().ok_or(CoreError::UnconfiguredLayer)?;

        let h_prev = graph.leaf(hidden);
        let c_prev = graph.leaf(cell);
        let z = graph.concat(&[input, h_prev])?;

        let mut gates = Vec::with_capacity(4);
        for (w, b) in self.weights.iter().zip(&self.biases) {
            let w_id = graph.leaf(w.clone());
            let b_id = graph.leaf(b.clone());
            gates.push(graph.affine(z, w_id, b_id)?);
        }
        let forget = graph.activate(gates[0], Activation::Sigmoid)?;
        let input_gate = graph.activate(gates[1], Activation::Sigmoid)?;
        let output_gate = graph.activate(gates[2], Activation::Sigmoid)?;
        let candidate = graph.activate(gates[3], Activation::Tanh)?;

        let keep = graph.hadamard(forget, c_prev)?;
        let write = graph.hadamard(input_gate, candidate)?;
        let c_next = graph.add(keep, write)?;
        let c_squashed = graph.activate(c_next, Activation::Tanh)?;
        let h_next = graph.hadamard(output_gate, c_squashed)?;

        self.cell = Some(graph.value(c_next));
        self.hidden = Some(graph.value(h_next));
        Ok(h_next)
    }

    /// Drop training-only scratch; also clears persisted state.
    pub fn only_use(&mut self) {
        for param in self.parameters() {
            param.write().drop_training_state();
        }
        self.reset_state();
    }
}
