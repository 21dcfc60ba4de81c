//! # neurso-ad
//!
//! Tape-based reverse-mode automatic differentiation for NeuRSo.
//!
//! This crate provides:
//! - A per-cycle [`Graph`] recording an inspectable tape of tagged
//!   backward operation records (no closure captures)
//! - The closed [`Activation`] set with elementwise forward/backward maps
//! - Central-difference gradient checking utilities
//!
//! A graph is exclusively owned by the forward/backward cycle that created
//! it: one graph per sample, never shared across threads, never reused.

#![deny(warnings)]

pub mod activation;
pub mod gradcheck;
pub mod graph;

pub use activation::Activation;
pub use gradcheck::{check_activation, GradCheckConfig, GradCheckMismatch};
pub use graph::{ConvDims, Graph, GraphMode, NodeId};
