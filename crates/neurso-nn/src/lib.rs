//! # neurso-nn
//!
//! Shape-aware layers, the ordered network container, loss functions, and
//! parameter persistence for NeuRSo.
//!
//! Layers are a closed set of tagged variants ([`Layer`]): the kind set is
//! fixed at build time, so dispatch is a `match`, not a vtable. Each layer
//! owns its trainable tensors, exposes a settable input shape (which
//! recomputes the output shape), and runs its forward pass through the
//! autodiff [`Graph`](neurso_ad::Graph).

pub mod init;
pub mod layers;
pub mod loss;
pub mod network;
pub mod snapshot;

pub use init::VarianceScaling;
pub use layers::{ActivationLayer, Broadcast, Conv2d, Dense, Embedding, Layer, Lstm, Upsample};
pub use loss::Loss;
pub use network::Network;
pub use snapshot::{LayerSnapshot, NetworkSnapshot, TensorSnapshot};
