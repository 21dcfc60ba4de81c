//! Unified error types for the NeuRSo core.
//!
//! Shape mismatches are reported lazily, at the first `forward` that
//! actually consumes the offending tensor; genuine configuration faults
//! (parameter-list drift, empty shapes) are reported eagerly.

use thiserror::Error;

/// Top-level error type for tensor, layer, and optimizer plumbing.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A tensor's element count does not match the consumer's expectation.
    #[error("shape mismatch: expected volume {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// Two buffers that must be walked in lockstep differ in length.
    #[error("length mismatch: {left} vs {right} ({context})")]
    LengthMismatch {
        left: usize,
        right: usize,
        context: &'static str,
    },

    /// The optimizer was handed a parameter list of a different length
    /// than on a previous call. Scratch caches are positional, so this is
    /// unrecoverable.
    #[error("parameter list changed length across optimizer calls: expected {expected}, got {got}")]
    ParameterCountMismatch { expected: usize, got: usize },

    /// A shape with no dimensions (or a zero dimension) was supplied where
    /// a populated one is required.
    #[error("empty or zero-volume shape")]
    EmptyShape,

    /// A dimension index outside the shape's rank.
    #[error("dimension {dim} out of range for rank {rank}")]
    InvalidDimension { dim: usize, rank: usize },

    /// A node id was presented to a graph that did not issue it.
    #[error("node {index} does not belong to this graph")]
    ForeignNode { index: usize },

    /// A layer was asked to run before its input shape was configured.
    #[error("layer input shape not configured")]
    UnconfiguredLayer,

    /// A required configuration field was missing or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
