//! Per-cycle computation graph with a reverse-executable tape.
//!
//! Every differentiable operation is invoked through the graph: the
//! forward result is computed eagerly, and in recording mode a small
//! tagged [`TapeOp`] record (opcode + operand node ids) is pushed onto the
//! tape. [`Graph::backward`] replays the tape in reverse registration
//! order, accumulating gradients into operand buffers via `+=`.
//!
//! An inference-mode graph skips tape registration entirely; calling
//! `backward` on it is a documented no-op, not a fault.
//!
//! Elementwise kernels switch to rayon above a size threshold; small
//! tensors stay sequential where the parallel overhead would dominate.
//!
//! # Examples
//!
//! ```
//! use neurso_ad::{Activation, Graph};
//! use neurso_core::{shared, Tensor};
//!
//! let mut graph = Graph::recording();
//! let x = graph.leaf(shared(Tensor::from_vec(vec![-1.0, 2.0])));
//! let y = graph.activate(x, Activation::Relu).unwrap();
//!
//! // Seed the output gradient, then walk the tape.
//! graph.value(y).write().accumulate_grad(&[1.0, 1.0]);
//! graph.backward();
//!
//! assert_eq!(graph.value(x).read().grad, vec![0.0, 1.0]);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use neurso_core::{shared, CoreError, Shape, Tensor, TensorRef};

use crate::activation::Activation;

/// Tensors below this element count are processed sequentially; the rayon
/// fork/join overhead outweighs the win for small buffers.
const MIN_PARALLEL_LEN: usize = 4096;

/// Process-wide counter stamping each graph, so node ids can be checked
/// against the graph that issued them.
static GRAPH_IDS: AtomicU64 = AtomicU64::new(0);

/// Handle to a tensor registered with one graph's arena.
///
/// Ids are stamped with their issuing graph; presenting one to any other
/// graph is rejected as [`CoreError::ForeignNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId {
    graph: u64,
    index: usize,
}

/// Whether the graph records a tape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphMode {
    /// Forward results plus backward tape records.
    Recording,
    /// Forward results only; `backward` is a no-op.
    Inference,
}

/// Geometry of a valid (stride-1, no-padding) 2-D convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvDims {
    pub in_channels: usize,
    pub in_height: usize,
    pub in_width: usize,
    pub out_channels: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
}

impl ConvDims {
    pub fn out_height(&self) -> usize {
        self.in_height + 1 - self.kernel_height
    }

    pub fn out_width(&self) -> usize {
        self.in_width + 1 - self.kernel_width
    }

    pub fn input_volume(&self) -> usize {
        self.in_channels * self.in_height * self.in_width
    }

    pub fn output_volume(&self) -> usize {
        self.out_channels * self.out_height() * self.out_width()
    }

    pub fn kernel_volume(&self) -> usize {
        self.out_channels * self.in_channels * self.kernel_height * self.kernel_width
    }
}

/// Tagged backward operation record.
///
/// Records carry only opcodes and operand ids, keeping the tape
/// inspectable and free of closure allocations.
#[derive(Clone, Debug)]
enum TapeOp {
    Affine {
        input: NodeId,
        weight: NodeId,
        bias: NodeId,
        output: NodeId,
    },
    Activate {
        input: NodeId,
        output: NodeId,
        kind: Activation,
    },
    Concat {
        parts: Vec<NodeId>,
        output: NodeId,
    },
    Copy {
        src: NodeId,
        output: NodeId,
    },
    Hadamard {
        lhs: NodeId,
        rhs: NodeId,
        output: NodeId,
    },
    Add {
        lhs: NodeId,
        rhs: NodeId,
        output: NodeId,
    },
    Duplicate {
        input: NodeId,
        output: NodeId,
        factor: usize,
    },
    Conv2d {
        input: NodeId,
        kernel: NodeId,
        bias: NodeId,
        output: NodeId,
        dims: ConvDims,
    },
    Lookup {
        table: NodeId,
        output: NodeId,
        indices: Vec<usize>,
        dim: usize,
    },
}

/// Ephemeral per-forward-pass context.
///
/// Owns an arena of tensor handles addressed by [`NodeId`] and the ordered
/// tape of backward records. A graph belongs to exactly one
/// forward/backward cycle; create a fresh one per sample.
pub struct Graph {
    id: u64,
    mode: GraphMode,
    nodes: Vec<TensorRef>,
    tape: Vec<TapeOp>,
}

impl Graph {
    /// Create a differentiable (tape-recording) graph.
    pub fn recording() -> Self {
        Self {
            id: GRAPH_IDS.fetch_add(1, Ordering::Relaxed),
            mode: GraphMode::Recording,
            nodes: Vec::new(),
            tape: Vec::new(),
        }
    }

    /// Create an inference-only graph; no tape is kept.
    pub fn inference() -> Self {
        Self {
            id: GRAPH_IDS.fetch_add(1, Ordering::Relaxed),
            mode: GraphMode::Inference,
            nodes: Vec::new(),
            tape: Vec::new(),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    /// True when operations register backward records.
    pub fn is_recording(&self) -> bool {
        self.mode == GraphMode::Recording
    }

    /// Number of tape records registered so far.
    pub fn tape_len(&self) -> usize {
        self.tape.len()
    }

    /// Register an existing tensor (parameter or raw input) with the
    /// arena. The handle is shared: gradients written during the backward
    /// walk land in the caller's tensor.
    pub fn leaf(&mut self, tensor: TensorRef) -> NodeId {
        let id = NodeId {
            graph: self.id,
            index: self.nodes.len(),
        };
        self.nodes.push(tensor);
        id
    }

    /// Shared handle for a registered node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different graph; use
    /// [`Graph::try_value`] for a fallible lookup.
    pub fn value(&self, id: NodeId) -> TensorRef {
        self.try_value(id).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Shared handle for a registered node, rejecting ids from other
    /// graphs.
    pub fn try_value(&self, id: NodeId) -> Result<TensorRef, CoreError> {
        Ok(self.tensor(id)?.clone())
    }

    /// Checked arena lookup; the entry point for every operand read.
    fn tensor(&self, id: NodeId) -> Result<&TensorRef, CoreError> {
        if id.graph != self.id {
            return Err(CoreError::ForeignNode { index: id.index });
        }
        self.nodes
            .get(id.index)
            .ok_or(CoreError::ForeignNode { index: id.index })
    }

    fn push_output(&mut self, tensor: Tensor) -> NodeId {
        self.leaf(shared(tensor))
    }

    fn record(&mut self, op: TapeOp) {
        if self.is_recording() {
            self.tape.push(op);
        }
    }

    // ===== Differentiable operations =====

    /// Affine transform `y = W·x + b`.
    ///
    /// `weight` must be a rank-2 tensor shaped `(out, in)` in row-major
    /// order; `bias` a length-`out` vector.
    pub fn affine(
        &mut self,
        input: NodeId,
        weight: NodeId,
        bias: NodeId,
    ) -> Result<NodeId, CoreError> {
        let (out_dim, in_dim) = {
            let w = self.tensor(weight)?.read();
            let shape = w.shape();
            (shape.dim(0)?, shape.dim(1)?)
        };
        let x = self.tensor(input)?.read().data.clone();
        if x.len() != in_dim {
            return Err(CoreError::ShapeMismatch {
                expected: in_dim,
                got: x.len(),
            });
        }
        let b = self.tensor(bias)?.read().data.clone();
        if b.len() != out_dim {
            return Err(CoreError::LengthMismatch {
                left: b.len(),
                right: out_dim,
                context: "affine bias",
            });
        }

        let w = self.nodes[weight.index].read();
        let mut y = vec![0.0f32; out_dim];
        for (o, yo) in y.iter_mut().enumerate() {
            let row = &w.data[o * in_dim..(o + 1) * in_dim];
            let mut acc = b[o];
            for (wi, xi) in row.iter().zip(&x) {
                acc += wi * xi;
            }
            *yo = acc;
        }
        drop(w);

        let id = self.push_output(Tensor::from_vec(y));
        self.record(TapeOp::Affine {
            input,
            weight,
            bias,
            output: id,
        });
        Ok(id)
    }

    /// Elementwise (or softmax) activation.
    pub fn activate(&mut self, input: NodeId, kind: Activation) -> Result<NodeId, CoreError> {
        let x = self.tensor(input)?.read().data.clone();
        let mut y = vec![0.0f32; x.len()];
        if kind.is_elementwise() && x.len() >= MIN_PARALLEL_LEN {
            y.par_iter_mut()
                .zip(x.par_iter())
                .for_each(|(o, &v)| *o = kind.apply(v));
        } else {
            kind.forward_slice(&x, &mut y);
        }

        let id = self.push_output(Tensor::from_vec(y));
        self.record(TapeOp::Activate {
            input,
            output: id,
            kind,
        });
        Ok(id)
    }

    /// Concatenate node values into one flat tensor.
    pub fn concat(&mut self, parts: &[NodeId]) -> Result<NodeId, CoreError> {
        if parts.is_empty() {
            return Err(CoreError::EmptyShape);
        }
        let mut data = Vec::new();
        for part in parts {
            data.extend_from_slice(&self.tensor(*part)?.read().data);
        }
        let id = self.push_output(Tensor::from_vec(data));
        self.record(TapeOp::Concat {
            parts: parts.to_vec(),
            output: id,
        });
        Ok(id)
    }

    /// Copy a node's value into a fresh tensor.
    pub fn copy(&mut self, src: NodeId) -> Result<NodeId, CoreError> {
        let data = self.tensor(src)?.read().data.clone();
        let id = self.push_output(Tensor::from_vec(data));
        self.record(TapeOp::Copy { src, output: id });
        Ok(id)
    }

    /// Elementwise product `y = a ⊙ b`.
    pub fn hadamard(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        let a = self.tensor(lhs)?.read().data.clone();
        let b = self.tensor(rhs)?.read().data.clone();
        if a.len() != b.len() {
            return Err(CoreError::LengthMismatch {
                left: a.len(),
                right: b.len(),
                context: "hadamard operands",
            });
        }
        let y = elementwise_binary(&a, &b, |x, z| x * z);
        let id = self.push_output(Tensor::from_vec(y));
        self.record(TapeOp::Hadamard {
            lhs,
            rhs,
            output: id,
        });
        Ok(id)
    }

    /// Elementwise sum `y = a + b`.
    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        let a = self.tensor(lhs)?.read().data.clone();
        let b = self.tensor(rhs)?.read().data.clone();
        if a.len() != b.len() {
            return Err(CoreError::LengthMismatch {
                left: a.len(),
                right: b.len(),
                context: "add operands",
            });
        }
        let y = elementwise_binary(&a, &b, |x, z| x + z);
        let id = self.push_output(Tensor::from_vec(y));
        self.record(TapeOp::Add {
            lhs,
            rhs,
            output: id,
        });
        Ok(id)
    }

    /// Pooling-style duplication: each element repeated `factor` times.
    pub fn duplicate(&mut self, input: NodeId, factor: usize) -> Result<NodeId, CoreError> {
        if factor == 0 {
            return Err(CoreError::InvalidConfig(
                "duplication factor must be positive".into(),
            ));
        }
        let x = self.tensor(input)?.read().data.clone();
        let mut y = Vec::with_capacity(x.len() * factor);
        for &v in &x {
            for _ in 0..factor {
                y.push(v);
            }
        }
        let id = self.push_output(Tensor::from_vec(y));
        self.record(TapeOp::Duplicate {
            input,
            output: id,
            factor,
        });
        Ok(id)
    }

    /// Valid 2-D convolution (stride 1, no padding).
    ///
    /// `kernel` is laid out `(out_c, in_c, k_h, k_w)` row-major; `bias`
    /// has one value per output channel.
    pub fn conv2d(
        &mut self,
        input: NodeId,
        kernel: NodeId,
        bias: NodeId,
        dims: ConvDims,
    ) -> Result<NodeId, CoreError> {
        let x = self.tensor(input)?.read().data.clone();
        if x.len() != dims.input_volume() {
            return Err(CoreError::ShapeMismatch {
                expected: dims.input_volume(),
                got: x.len(),
            });
        }
        let k = self.tensor(kernel)?.read().data.clone();
        if k.len() != dims.kernel_volume() {
            return Err(CoreError::LengthMismatch {
                left: k.len(),
                right: dims.kernel_volume(),
                context: "conv kernel",
            });
        }
        let b = self.tensor(bias)?.read().data.clone();
        if b.len() != dims.out_channels {
            return Err(CoreError::LengthMismatch {
                left: b.len(),
                right: dims.out_channels,
                context: "conv bias",
            });
        }

        let (oh, ow) = (dims.out_height(), dims.out_width());
        let (ih, iw) = (dims.in_height, dims.in_width);
        let (kh, kw) = (dims.kernel_height, dims.kernel_width);
        let mut y = vec![0.0f32; dims.output_volume()];
        for oc in 0..dims.out_channels {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = b[oc];
                    for ic in 0..dims.in_channels {
                        for ky in 0..kh {
                            for kx in 0..kw {
                                let xi = x[ic * ih * iw + (oy + ky) * iw + (ox + kx)];
                                let ki = k[((oc * dims.in_channels + ic) * kh + ky) * kw + kx];
                                acc += xi * ki;
                            }
                        }
                    }
                    y[oc * oh * ow + oy * ow + ox] = acc;
                }
            }
        }

        let shape = Shape::d3(dims.out_channels, oh, ow);
        let id = self.push_output(Tensor::with_shape(y, shape));
        self.record(TapeOp::Conv2d {
            input,
            kernel,
            bias,
            output: id,
            dims,
        });
        Ok(id)
    }

    /// Row gather from an embedding table; backward scatter-adds into the
    /// table's gradient. Indices themselves receive no gradient.
    pub fn lookup(
        &mut self,
        table: NodeId,
        indices: &[usize],
        dim: usize,
    ) -> Result<NodeId, CoreError> {
        let t = self.tensor(table)?.read().data.clone();
        if dim == 0 || t.len() % dim != 0 {
            return Err(CoreError::InvalidConfig(
                "embedding width must divide the table length".into(),
            ));
        }
        let rows = t.len() / dim;
        let mut y = Vec::with_capacity(indices.len() * dim);
        for &row in indices {
            if row >= rows {
                return Err(CoreError::InvalidDimension { dim: row, rank: rows });
            }
            y.extend_from_slice(&t[row * dim..(row + 1) * dim]);
        }
        let id = self.push_output(Tensor::from_vec(y));
        self.record(TapeOp::Lookup {
            table,
            output: id,
            indices: indices.to_vec(),
            dim,
        });
        Ok(id)
    }

    // ===== Backward walk =====

    /// Replay the tape in reverse registration order, propagating
    /// gradients into operand buffers via `+=`.
    ///
    /// The output tensor's gradient must already hold the loss-seeded
    /// values. On an inference-mode graph this is a documented no-op.
    pub fn backward(&self) {
        if self.mode == GraphMode::Inference {
            return;
        }
        for op in self.tape.iter().rev() {
            self.backward_step(op);
        }
    }

    fn backward_step(&self, op: &TapeOp) {
        match op {
            TapeOp::Affine {
                input,
                weight,
                bias,
                output,
            } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let x = self.nodes[input.index].read().data.clone();
                let (w, in_dim) = {
                    let guard = self.nodes[weight.index].read();
                    let in_dim = guard.shape().dims()[1];
                    (guard.data.clone(), in_dim)
                };

                let mut gx = vec![0.0f32; x.len()];
                let mut gw = vec![0.0f32; w.len()];
                for (o, &gyo) in gy.iter().enumerate() {
                    let row = &w[o * in_dim..(o + 1) * in_dim];
                    let grow = &mut gw[o * in_dim..(o + 1) * in_dim];
                    for i in 0..in_dim {
                        gx[i] += row[i] * gyo;
                        grow[i] += x[i] * gyo;
                    }
                }
                self.nodes[input.index].write().accumulate_grad(&gx);
                self.nodes[weight.index].write().accumulate_grad(&gw);
                self.nodes[bias.index].write().accumulate_grad(&gy);
            }
            TapeOp::Activate {
                input,
                output,
                kind,
            } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let x = self.nodes[input.index].read().data.clone();
                let gx = if x.len() >= MIN_PARALLEL_LEN {
                    x.par_iter()
                        .zip(gy.par_iter())
                        .map(|(&v, &g)| kind.derivative(v) * g)
                        .collect()
                } else {
                    x.iter()
                        .zip(&gy)
                        .map(|(&v, &g)| kind.derivative(v) * g)
                        .collect::<Vec<f32>>()
                };
                self.nodes[input.index].write().accumulate_grad(&gx);
            }
            TapeOp::Concat { parts, output } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let mut offset = 0;
                for part in parts {
                    let len = self.nodes[part.index].read().len();
                    self.nodes[part.index]
                        .write()
                        .accumulate_grad(&gy[offset..offset + len]);
                    offset += len;
                }
            }
            TapeOp::Copy { src, output } => {
                let gy = self.nodes[output.index].read().grad.clone();
                self.nodes[src.index].write().accumulate_grad(&gy);
            }
            TapeOp::Hadamard { lhs, rhs, output } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let a = self.nodes[lhs.index].read().data.clone();
                let b = self.nodes[rhs.index].read().data.clone();
                let gl = elementwise_binary(&gy, &b, |g, v| g * v);
                let gr = elementwise_binary(&gy, &a, |g, v| g * v);
                self.nodes[lhs.index].write().accumulate_grad(&gl);
                self.nodes[rhs.index].write().accumulate_grad(&gr);
            }
            TapeOp::Add { lhs, rhs, output } => {
                let gy = self.nodes[output.index].read().grad.clone();
                self.nodes[lhs.index].write().accumulate_grad(&gy);
                self.nodes[rhs.index].write().accumulate_grad(&gy);
            }
            TapeOp::Duplicate {
                input,
                output,
                factor,
            } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let n = self.nodes[input.index].read().len();
                let mut gx = vec![0.0f32; n];
                for (j, g) in gy.iter().enumerate() {
                    gx[j / factor] += g;
                }
                self.nodes[input.index].write().accumulate_grad(&gx);
            }
            TapeOp::Conv2d {
                input,
                kernel,
                bias,
                output,
                dims,
            } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let x = self.nodes[input.index].read().data.clone();
                let k = self.nodes[kernel.index].read().data.clone();

                let (oh, ow) = (dims.out_height(), dims.out_width());
                let (ih, iw) = (dims.in_height, dims.in_width);
                let (kh, kw) = (dims.kernel_height, dims.kernel_width);
                let mut gx = vec![0.0f32; x.len()];
                let mut gk = vec![0.0f32; k.len()];
                let mut gb = vec![0.0f32; dims.out_channels];
                for oc in 0..dims.out_channels {
                    for oy in 0..oh {
                        for ox in 0..ow {
                            let g = gy[oc * oh * ow + oy * ow + ox];
                            gb[oc] += g;
                            for ic in 0..dims.in_channels {
                                for ky in 0..kh {
                                    for kx in 0..kw {
                                        let xi = ic * ih * iw + (oy + ky) * iw + (ox + kx);
                                        let ki =
                                            ((oc * dims.in_channels + ic) * kh + ky) * kw + kx;
                                        gx[xi] += k[ki] * g;
                                        gk[ki] += x[xi] * g;
                                    }
                                }
                            }
                        }
                    }
                }
                self.nodes[input.index].write().accumulate_grad(&gx);
                self.nodes[kernel.index].write().accumulate_grad(&gk);
                self.nodes[bias.index].write().accumulate_grad(&gb);
            }
            TapeOp::Lookup {
                table,
                output,
                indices,
                dim,
            } => {
                let gy = self.nodes[output.index].read().grad.clone();
                let mut t = self.nodes[table.index].write();
                for (pos, &row) in indices.iter().enumerate() {
                    let src = &gy[pos * dim..(pos + 1) * dim];
                    let dst = &mut t.grad[row * dim..(row + 1) * dim];
                    for (d, s) in dst.iter_mut().zip(src) {
                        *d += s;
                    }
                }
            }
        }
    }
}

fn elementwise_binary<F>(a: &[f32], b: &[f32], f: F) -> Vec<f32>
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    debug_assert_eq!(a.len(), b.len());
    if a.len() >= MIN_PARALLEL_LEN {
        a.par_iter()
            .zip(b.par_iter())
            .map(|(&x, &y)| f(x, y))
            .collect()
    } else {
        a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_ones(graph: &Graph, id: NodeId) {
        let n = graph.value(id).read().len();
        graph.value(id).write().accumulate_grad(&vec![1.0; n]);
    }

    #[test]
    fn test_affine_forward_and_backward() {
        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, 2.0])));
        // W = [[1, 2], [3, 4], [5, 6]], b = [0.5, 0.5, 0.5]
        let w = graph.leaf(shared(Tensor::with_shape(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            Shape::d2(3, 2),
        )));
        let b = graph.leaf(shared(Tensor::from_vec(vec![0.5; 3])));
        let y = graph.affine(x, w, b).unwrap();

        assert_eq!(graph.value(y).read().data, vec![5.5, 11.5, 17.5]);

        seed_ones(&graph, y);
        graph.backward();

        // gx = W^T · 1 = [1+3+5, 2+4+6]
        assert_eq!(graph.value(x).read().grad, vec![9.0, 12.0]);
        // gw = 1 ⊗ x
        assert_eq!(
            graph.value(w).read().grad,
            vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]
        );
        assert_eq!(graph.value(b).read().grad, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_affine_shape_mismatch_surfaces_at_forward() {
        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, 2.0, 3.0])));
        let w = graph.leaf(shared(Tensor::zeros(Shape::d2(2, 2))));
        let b = graph.leaf(shared(Tensor::zeros(Shape::d1(2))));
        assert!(matches!(
            graph.affine(x, w, b),
            Err(CoreError::ShapeMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_hadamard_backward() {
        let mut graph = Graph::recording();
        let a = graph.leaf(shared(Tensor::from_vec(vec![2.0, 3.0])));
        let b = graph.leaf(shared(Tensor::from_vec(vec![5.0, 7.0])));
        let y = graph.hadamard(a, b).unwrap();
        assert_eq!(graph.value(y).read().data, vec![10.0, 21.0]);

        seed_ones(&graph, y);
        graph.backward();
        assert_eq!(graph.value(a).read().grad, vec![5.0, 7.0]);
        assert_eq!(graph.value(b).read().grad, vec![2.0, 3.0]);
    }

    #[test]
    fn test_fanout_accumulates() {
        // y = x ⊙ x: gradient fans out through both operand slots.
        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::from_vec(vec![3.0])));
        let y = graph.hadamard(x, x).unwrap();
        seed_ones(&graph, y);
        graph.backward();
        // d(x²)/dx = 2x
        assert_eq!(graph.value(x).read().grad, vec![6.0]);
    }

    #[test]
    fn test_concat_splits_gradient() {
        let mut graph = Graph::recording();
        let a = graph.leaf(shared(Tensor::from_vec(vec![1.0, 2.0])));
        let b = graph.leaf(shared(Tensor::from_vec(vec![3.0])));
        let y = graph.concat(&[a, b]).unwrap();
        assert_eq!(graph.value(y).read().data, vec![1.0, 2.0, 3.0]);

        graph.value(y).write().accumulate_grad(&[0.1, 0.2, 0.3]);
        graph.backward();
        assert_eq!(graph.value(a).read().grad, vec![0.1, 0.2]);
        assert_eq!(graph.value(b).read().grad, vec![0.3]);
    }

    #[test]
    fn test_duplicate_sums_backward() {
        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::from_vec(vec![4.0, 5.0])));
        let y = graph.duplicate(x, 3).unwrap();
        assert_eq!(
            graph.value(y).read().data,
            vec![4.0, 4.0, 4.0, 5.0, 5.0, 5.0]
        );

        seed_ones(&graph, y);
        graph.backward();
        assert_eq!(graph.value(x).read().grad, vec![3.0, 3.0]);
    }

    #[test]
    fn test_conv2d_known_values() {
        // 1x3x3 input, 1x1x2x2 kernel of ones, zero bias.
        let dims = ConvDims {
            in_channels: 1,
            in_height: 3,
            in_width: 3,
            out_channels: 1,
            kernel_height: 2,
            kernel_width: 2,
        };
        let mut graph = Graph::recording();
        let x = graph.leaf(shared(Tensor::with_shape(
            (1..=9).map(|v| v as f32).collect(),
            Shape::d3(1, 3, 3),
        )));
        let k = graph.leaf(shared(Tensor::with_shape(
            vec![1.0; 4],
            Shape::d4(1, 1, 2, 2),
        )));
        let b = graph.leaf(shared(Tensor::from_vec(vec![0.0])));
        let y = graph.conv2d(x, k, b, dims).unwrap();

        // Window sums of [[1..3],[4..6],[7..9]]
        assert_eq!(graph.value(y).read().data, vec![12.0, 16.0, 24.0, 28.0]);

        seed_ones(&graph, y);
        graph.backward();
        // Kernel gradient: sum of each 2x2 window's aligned inputs.
        assert_eq!(graph.value(k).read().grad, vec![12.0, 16.0, 24.0, 28.0]);
        assert_eq!(graph.value(b).read().grad, vec![4.0]);
    }

    #[test]
    fn test_lookup_scatter_add() {
        let mut graph = Graph::recording();
        let table = graph.leaf(shared(Tensor::with_shape(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            Shape::d2(3, 2),
        )));
        let y = graph.lookup(table, &[2, 0, 2], 2).unwrap();
        assert_eq!(graph.value(y).read().data, vec![5.0, 6.0, 1.0, 2.0, 5.0, 6.0]);

        seed_ones(&graph, y);
        graph.backward();
        // Row 2 gathered twice, row 0 once, row 1 never.
        assert_eq!(
            graph.value(table).read().grad,
            vec![1.0, 1.0, 0.0, 0.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_inference_graph_records_nothing() {
        let mut graph = Graph::inference();
        let x = graph.leaf(shared(Tensor::from_vec(vec![1.0, -1.0])));
        let y = graph.activate(x, Activation::Relu).unwrap();
        assert_eq!(graph.tape_len(), 0);

        // Documented no-op, not a fault.
        graph.value(y).write().accumulate_grad(&[1.0, 1.0]);
        graph.backward();
        assert_eq!(graph.value(x).read().grad, vec![0.0, 0.0]);
    }

    #[test]
    fn test_node_id_from_another_graph_is_rejected() {
        let mut first = Graph::recording();
        let mut second = Graph::recording();
        let foreign = first.leaf(shared(Tensor::from_vec(vec![1.0])));
        // Same arena slot exists in `second`, so an unchecked lookup would
        // silently alias a different tensor.
        let _local = second.leaf(shared(Tensor::from_vec(vec![9.0])));

        assert!(matches!(
            second.try_value(foreign),
            Err(CoreError::ForeignNode { index: 0 })
        ));
        assert!(matches!(
            second.activate(foreign, Activation::Relu),
            Err(CoreError::ForeignNode { index: 0 })
        ));
    }
}
