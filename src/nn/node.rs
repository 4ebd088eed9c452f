//! Graph nodes: one layer wired to its source and destination tensors.

use crate::backend::Backend;
use crate::error::Result;
use crate::nn::layers::Layer;
use crate::nn::tensors::Tensor;

/// A graph vertex: one layer plus the arena indices it reads and writes.
#[derive(Debug)]
pub struct Node {
    src: Vec<usize>,
    dst: Vec<usize>,
    layer: Box<dyn Layer>,
}

impl Node {
    /// Wires `layer` to its input and output tensors.
    #[must_use]
    pub fn new(src: Vec<usize>, dst: Vec<usize>, layer: Box<dyn Layer>) -> Self {
        Self { src, dst, layer }
    }

    /// Input tensor indices.
    #[must_use]
    pub fn src(&self) -> &[usize] {
        &self.src
    }

    /// Output tensor indices.
    #[must_use]
    pub fn dst(&self) -> &[usize] {
        &self.dst
    }

    /// The layer run by this node.
    #[must_use]
    pub fn layer(&self) -> &dyn Layer {
        self.layer.as_ref()
    }

    pub(crate) fn forward(&mut self, backend: Backend, tensors: &mut [Tensor]) -> Result<()> {
        self.layer.forward(backend, tensors, &self.src, &self.dst)
    }

    pub(crate) fn backward(&mut self, backend: Backend, tensors: &mut [Tensor]) -> Result<()> {
        self.layer.backward(backend, tensors, &self.src, &self.dst)
    }
}
