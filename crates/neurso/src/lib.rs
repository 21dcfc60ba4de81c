//! # NeuRSo - Embedded Neural-Network Training Engine for COOLJAPAN
//!
//! **Self-contained neural-network training** with tape-based reverse-mode
//! autodiff, shape-aware layer composition, per-parameter optimizers, and a
//! cancellable batch trainer.
//!
//! This is the **meta crate** that re-exports all NeuRSo components for
//! convenient access.
//!
//! ## Quick Start
//!
//! ```
//! use neurso::prelude::*;
//!
//! // Build a 2 -> 4 -> 1 network; later layers infer their input shape.
//! let mut net = Network::new();
//! net.add_first_layer(Dense::new(4, Activation::Relu), Shape::d1(2))?;
//! net.add_layer(Dense::new(1, Activation::Identity))?;
//!
//! let out = net.predict(Tensor::from_vec(vec![0.5, -0.5]))?;
//! assert_eq!(out.len(), 1);
//! # Ok::<(), neurso::core::CoreError>(())
//! ```
//!
//! ## Components
//!
//! ### Core Types ([`core`])
//!
//! Shapes, tensors with gradient and optimizer scratch buffers, shared
//! tensor handles, and the engine's error type.
//!
//! ```
//! use neurso::core::{Shape, Tensor};
//!
//! let t = Tensor::zeros(Shape::d2(3, 4));
//! assert_eq!(t.len(), 12);
//! ```
//!
//! ### Autodiff ([`ad`])
//!
//! Eager forward execution over a recorded tape; `backward` replays the
//! tape in reverse, accumulating gradients into the shared tensors.
//!
//! ```
//! use neurso::ad::{Activation, Graph};
//! use neurso::core::{shared, Tensor};
//!
//! let mut graph = Graph::recording();
//! let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, -2.0])));
//! let y = graph.activate(x, Activation::Relu)?;
//!
//! graph.value(y).write().accumulate_grad(&[1.0, 1.0]);
//! graph.backward();
//! assert_eq!(graph.value(x).read().grad, vec![1.0, 0.0]);
//! # Ok::<(), neurso::core::CoreError>(())
//! ```
//!
//! ### Layers and Losses ([`nn`])
//!
//! A closed set of layer kinds (`Dense`, `Lstm`, `Conv2d`, `Embedding`,
//! composites), the ordered [`Network`](nn::Network) container, loss
//! functions, and JSON parameter snapshots.
//!
//! ### Training ([`train`])
//!
//! Per-parameter optimizers (SGD, Adagrad, Adadelta, Adamax, RMSProp) and
//! the batch trainer with progress events and cooperative cancellation.
//!
//! ```
//! use neurso::prelude::*;
//!
//! let mut net = Network::new();
//! net.add_first_layer(Dense::new(8, Activation::Tanh), Shape::d1(1))?;
//! net.add_layer(Dense::new(1, Activation::Identity))?;
//!
//! let data = Dataset::Flat(vec![
//!     Sample::new(Tensor::from_vec(vec![0.5]), vec![1.0]),
//!     Sample::new(Tensor::from_vec(vec![-0.5]), vec![-1.0]),
//! ]);
//! let config = TrainerConfig {
//!     epochs: 10,
//!     ..TrainerConfig::default()
//! };
//! let mut trainer = Trainer::new(config, Loss::SumSquares);
//! trainer.train(&mut net, data, None, &CancellationToken::new())?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! For asynchronous runs, [`Trainer::train_async`](train::Trainer::train_async)
//! moves the work to a thread and hands back an event receiver plus a
//! cancellation token.

#![deny(warnings)]

// Re-export all components
pub use neurso_ad as ad;
pub use neurso_core as core;
pub use neurso_nn as nn;
pub use neurso_train as train;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use neurso::prelude::*;
    //!
    //! let tensor = Tensor::zeros(Shape::d1(8));
    //! assert_eq!(tensor.len(), 8);
    //! ```

    // Core types
    pub use crate::core::{shared, CoreError, Shape, Tensor, TensorRef};

    // Autodiff
    pub use crate::ad::{Activation, ConvDims, Graph, GraphMode, NodeId};

    // Layers, losses, persistence
    pub use crate::nn::{
        ActivationLayer, Broadcast, Conv2d, Dense, Embedding, Layer, Loss, Lstm, Network,
        NetworkSnapshot, Upsample, VarianceScaling,
    };

    // Training
    pub use crate::train::{
        CancellationToken, Dataset, Optimizer, OptimizerConfig, OptimizerKind, Sample, Trainer,
        TrainerConfig, TrainingEvent, TrainingHandle,
    };
}
