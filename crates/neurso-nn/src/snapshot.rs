//! Parameter persistence.
//!
//! A snapshot captures a network's trainable tensors as plain
//! shape + data pairs, serialized as JSON. Restore writes those buffers
//! back into an architecturally identical network; it never rebuilds
//! topology, so the caller constructs the layers first and the snapshot
//! only refills them. Kind and length mismatches fail the restore before
//! any tensor is touched.

use std::io::{Read, Write};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::network::Network;

/// One tensor's shape and flat payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorSnapshot {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// One layer's kind tag and its parameters in slot order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub kind: String,
    pub params: Vec<TensorSnapshot>,
}

/// A whole network's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub layers: Vec<LayerSnapshot>,
}

impl NetworkSnapshot {
    /// Capture every trainable tensor from the network.
    pub fn capture(network: &Network) -> Self {
        let layers = network
            .layers()
            .iter()
            .map(|layer| LayerSnapshot {
                kind: layer.kind().to_string(),
                params: layer
                    .parameters()
                    .iter()
                    .map(|p| {
                        let t = p.read();
                        TensorSnapshot {
                            shape: t.shape().dims().to_vec(),
                            data: t.data.clone(),
                        }
                    })
                    .collect(),
            })
            .collect();
        Self { layers }
    }

    /// Write the captured buffers back into `network`.
    ///
    /// The network must already have the same architecture the snapshot
    /// was captured from; every layer kind, parameter count, and tensor
    /// length is checked before any data moves.
    pub fn restore(&self, network: &mut Network) -> Result<()> {
        ensure!(
            self.layers.len() == network.layers().len(),
            "snapshot holds {} layers, network has {}",
            self.layers.len(),
            network.layers().len()
        );
        for (i, (snap, layer)) in self.layers.iter().zip(network.layers()).enumerate() {
            if snap.kind != layer.kind() {
                bail!(
                    "layer {i}: snapshot kind '{}' does not match network kind '{}'",
                    snap.kind,
                    layer.kind()
                );
            }
            let params = layer.parameters();
            ensure!(
                snap.params.len() == params.len(),
                "layer {i}: snapshot holds {} parameter tensors, layer has {}",
                snap.params.len(),
                params.len()
            );
            for (j, (ts, param)) in snap.params.iter().zip(&params).enumerate() {
                ensure!(
                    ts.data.len() == param.read().len(),
                    "layer {i} parameter {j}: snapshot length {} vs tensor length {}",
                    ts.data.len(),
                    param.read().len()
                );
            }
        }
        // All checked; now write.
        for (snap, layer) in self.layers.iter().zip(network.layers()) {
            for (ts, param) in snap.params.iter().zip(layer.parameters()) {
                param.write().data.copy_from_slice(&ts.data);
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serializing network snapshot")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing network snapshot")
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self).context("writing network snapshot")
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).context("reading network snapshot")
    }
}
