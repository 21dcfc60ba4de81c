//! # neurso-train
//!
//! Optimizers, dataset containers, and the batch trainer for NeuRSo.
//!
//! The trainer drives a [`Network`](neurso_nn::Network) through epochs
//! of recorded forward/backward passes, applies a per-parameter
//! [`Optimizer`] once per batch, and reports progress as
//! [`TrainingEvent`]s over a crossbeam channel. Runs are cancellable via
//! a shared [`CancellationToken`] and can execute on a worker thread
//! through [`Trainer::train_async`].

pub mod dataset;
pub mod optimizer;
pub mod trainer;

pub use dataset::{Dataset, Sample};
pub use optimizer::{Optimizer, OptimizerConfig, OptimizerKind};
pub use trainer::{CancellationToken, Trainer, TrainerConfig, TrainingEvent, TrainingHandle};
