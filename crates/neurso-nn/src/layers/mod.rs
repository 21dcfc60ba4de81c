//! The closed layer set.
//!
//! Layer kinds are fixed at build time, so [`Layer`] is a tagged enum and
//! every contract call is a `match` over the variants. The shared contract
//! per layer:
//!
//! - `set_input_shape` (re)configures the layer and recomputes its output
//!   shape
//! - `output_shape()` is a pure function of input shape + configuration
//! - `forward` runs through the autodiff graph; shape mismatches surface
//!   here, on first use
//! - `parameters()` returns trainable tensors in a stable order
//! - `only_use()` discards training-only scratch after training
//! - `reset_state()` clears recurrent state (no-op for stateless kinds)

mod composite;
mod conv;
mod dense;
mod embedding;
mod recurrent;

pub use composite::{ActivationLayer, Broadcast, Upsample};
pub use conv::Conv2d;
pub use dense::Dense;
pub use embedding::Embedding;
pub use recurrent::Lstm;

use neurso_ad::{Graph, NodeId};
use neurso_core::{CoreError, Shape, TensorRef};

/// Closed set of layer kinds.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    Lstm(Lstm),
    Conv2d(Conv2d),
    Embedding(Embedding),
    Activation(ActivationLayer),
    Broadcast(Broadcast),
    Upsample(Upsample),
}

impl Layer {
    /// Short tag used by snapshots and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Dense(_) => "dense",
            Layer::Lstm(_) => "lstm",
            Layer::Conv2d(_) => "conv2d",
            Layer::Embedding(_) => "embedding",
            Layer::Activation(_) => "activation",
            Layer::Broadcast(_) => "broadcast",
            Layer::Upsample(_) => "upsample",
        }
    }

    /// Configure the input shape, recomputing the output shape.
    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        match self {
            Layer::Dense(l) => l.set_input_shape(shape),
            Layer::Lstm(l) => l.set_input_shape(shape),
            Layer::Conv2d(l) => l.set_input_shape(shape),
            Layer::Embedding(l) => l.set_input_shape(shape),
            Layer::Activation(l) => l.set_input_shape(shape),
            Layer::Broadcast(l) => l.set_input_shape(shape),
            Layer::Upsample(l) => l.set_input_shape(shape),
        }
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        match self {
            Layer::Dense(l) => l.input_shape(),
            Layer::Lstm(l) => l.input_shape(),
            Layer::Conv2d(l) => l.input_shape(),
            Layer::Embedding(l) => l.input_shape(),
            Layer::Activation(l) => l.input_shape(),
            Layer::Broadcast(l) => l.input_shape(),
            Layer::Upsample(l) => l.input_shape(),
        }
    }

    pub fn output_shape(&self) -> Option<Shape> {
        match self {
            Layer::Dense(l) => l.output_shape(),
            Layer::Lstm(l) => l.output_shape(),
            Layer::Conv2d(l) => l.output_shape(),
            Layer::Embedding(l) => l.output_shape(),
            Layer::Activation(l) => l.output_shape(),
            Layer::Broadcast(l) => l.output_shape(),
            Layer::Upsample(l) => l.output_shape(),
        }
    }

    /// Number of trainable scalars.
    pub fn trainable_parameters(&self) -> usize {
        match self {
            Layer::Dense(l) => l.trainable_parameters(),
            Layer::Lstm(l) => l.trainable_parameters(),
            Layer::Conv2d(l) => l.trainable_parameters(),
            Layer::Embedding(l) => l.trainable_parameters(),
            _ => 0,
        }
    }

    /// Trainable tensor handles, stable order. Recurrent state is owned
    /// mutable state, not a parameter, and is never included.
    pub fn parameters(&self) -> Vec<TensorRef> {
        match self {
            Layer::Dense(l) => l.parameters(),
            Layer::Lstm(l) => l.parameters(),
            Layer::Conv2d(l) => l.parameters(),
            Layer::Embedding(l) => l.parameters(),
            _ => Vec::new(),
        }
    }

    /// Run one forward step through the graph.
    pub fn forward(&mut self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        match self {
            Layer::Dense(l) => l.forward(graph, input),
            Layer::Lstm(l) => l.forward(graph, input),
            Layer::Conv2d(l) => l.forward(graph, input),
            Layer::Embedding(l) => l.forward(graph, input),
            Layer::Activation(l) => l.forward(graph, input),
            Layer::Broadcast(l) => l.forward(graph, input),
            Layer::Upsample(l) => l.forward(graph, input),
        }
    }

    /// Clear persisted recurrent state; stateless layers ignore this.
    pub fn reset_state(&mut self) {
        if let Layer::Lstm(l) = self {
            l.reset_state();
        }
    }

    /// Discard training-only scratch to shrink a trained layer.
    pub fn only_use(&mut self) {
        match self {
            Layer::Dense(l) => l.only_use(),
            Layer::Lstm(l) => l.only_use(),
            Layer::Conv2d(l) => l.only_use(),
            Layer::Embedding(l) => l.only_use(),
            _ => {}
        }
    }
}

impl From<Dense> for Layer {
    fn from(l: Dense) -> Self {
        Layer::Dense(l)
    }
}

impl From<Lstm> for Layer {
    fn from(l: Lstm) -> Self {
        Layer::Lstm(l)
    }
}

impl From<Conv2d> for Layer {
    fn from(l: Conv2d) -> Self {
        Layer::Conv2d(l)
    }
}

impl From<Embedding> for Layer {
    fn from(l: Embedding) -> Self {
        Layer::Embedding(l)
    }
}

impl From<ActivationLayer> for Layer {
    fn from(l: ActivationLayer) -> Self {
        Layer::Activation(l)
    }
}

impl From<Broadcast> for Layer {
    fn from(l: Broadcast) -> Self {
        Layer::Broadcast(l)
    }
}

impl From<Upsample> for Layer {
    fn from(l: Upsample) -> Self {
        Layer::Upsample(l)
    }
}
