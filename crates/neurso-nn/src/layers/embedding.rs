//! Embedding (row-lookup) layer.

use neurso_ad::{Graph, NodeId};
use neurso_core::{shared, CoreError, Shape, Tensor, TensorRef};

use crate::init::{seeded_rng, VarianceScaling};

/// Trainable lookup table mapping token ids to dense rows.
///
/// The input tensor carries token ids as floats (the engine's only tensor
/// payload); they are truncated to row indices. Indices receive no
/// gradient; the table does, via scatter-add.
#[derive(Debug, Clone)]
pub struct Embedding {
    vocab: usize,
    dim: usize,
    table: TensorRef,
    input_shape: Option<Shape>,
}

impl Embedding {
    /// Create a `vocab × dim` embedding table.
    pub fn new(vocab: usize, dim: usize, seed: u64) -> Self {
        let mut table = Tensor::zeros(Shape::d2(vocab, dim));
        let init = VarianceScaling {
            scale: 1.0,
            shift: 0.0,
        };
        init.fill(&mut table, dim, &mut seeded_rng(seed));
        Self {
            vocab,
            dim,
            table: shared(table),
            input_shape: None,
        }
    }

    pub fn vocab(&self) -> usize {
        self.vocab
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    /// Output widens the token axis by the embedding dimension.
    pub fn output_shape(&self) -> Option<Shape> {
        self.input_shape.as_ref().map(|s| s.expand(self.dim))
    }

    pub fn set_input_shape(&mut self, shape: Shape) -> Result<(), CoreError> {
        if shape.volume() == 0 {
            return Err(CoreError::EmptyShape);
        }
        self.input_shape = Some(shape);
        Ok(())
    }

    pub fn trainable_parameters(&self) -> usize {
        self.table.read().len()
    }

    pub fn parameters(&self) -> Vec<TensorRef> {
        vec![self.table.clone()]
    }

    pub fn forward(&self, graph: &mut Graph, input: NodeId) -> Result<NodeId, CoreError> {
        if self.input_shape.is_none() {
            return Err(CoreError::UnconfiguredLayer);
        }
        let indices: Vec<usize> = graph
            .value(input)
            .read()
            .data
            .iter()
            .map(|v| v.max(0.0) as usize)
            .collect();
        let table = graph.leaf(self.table.clone());
        graph.lookup(table, &indices, self.dim)
    }

    pub fn only_use(&mut self) {
        self.table.write().drop_training_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_forward() {
        let mut layer = Embedding::new(4, 3, 42);
        layer.set_input_shape(Shape::d1(2)).unwrap();
        assert_eq!(layer.output_shape().unwrap().dims(), &[2, 3]);

        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, 3.0])));
        let y = layer.forward(&mut graph, x).unwrap();

        let out = graph.value(y).read().data.clone();
        let table = layer.parameters()[0].read().data.clone();
        assert_eq!(&out[0..3], &table[3..6]);
        assert_eq!(&out[3..6], &table[9..12]);
    }

    #[test]
    fn test_out_of_vocab_index_fails() {
        let mut layer = Embedding::new(2, 2, 1);
        layer.set_input_shape(Shape::d1(1)).unwrap();
        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::from_vec(vec![5.0])));
        assert!(layer.forward(&mut graph, x).is_err());
    }
}
