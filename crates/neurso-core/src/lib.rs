//! # neurso-core
//!
//! Core value types for the NeuRSo embedded training stack.
//!
//! This crate provides:
//! - [`Shape`]: small, immutable dimension tuples with explicit widening
//! - [`Tensor`]: flat single-precision data + gradient + optimizer scratch
//! - [`TensorRef`]: shared handle used by graphs, layers, and optimizers
//! - [`CoreError`]: unified error type for shape and configuration faults
//!
//! Everything above this crate (autodiff tape, layers, optimizers, the
//! trainer) exchanges these flat tensor values; collaborators outside the
//! training engine see nothing but `Vec<f32>` payloads.

pub mod error;
pub mod shape;
pub mod tensor;

pub use error::CoreError;
pub use shape::Shape;
pub use tensor::{shared, Tensor, TensorRef};

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, CoreError>;
