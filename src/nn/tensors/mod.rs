//! Named 4-D tensors owned by a [`Net`](crate::nn::Net).
//!
//! A tensor goes through a fixed lifecycle: it is created empty, given a
//! [`Shape`], allocated, and then pushed into the net's tensor arena where
//! nodes refer to it by index. Assigning a new shape drops every buffer; the
//! tensor must be allocated again before use.

use crate::nn::TensorFloat;

/// Batch, channel, height and width of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Shape {
    /// Batch size.
    pub n: usize,
    /// Channels.
    pub c: usize,
    /// Height.
    pub h: usize,
    /// Width.
    pub w: usize,
}

impl Shape {
    /// Creates a shape from its four extents.
    #[must_use]
    pub const fn new(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self { n, c, h, w }
    }

    /// A flat shape holding `len` values, used for parameter tensors.
    #[must_use]
    pub const fn flat(len: usize) -> Self {
        Self::new(len, 1, 1, 1)
    }

    /// Total number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.n * self.c * self.h * self.w
    }

    /// Whether the shape holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements in one batch sample.
    #[must_use]
    pub const fn sample_len(&self) -> usize {
        self.c * self.h * self.w
    }

    /// Number of spatial positions in one channel.
    #[must_use]
    pub const fn spatial(&self) -> usize {
        self.h * self.w
    }
}

impl core::fmt::Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}x{}x{}", self.n, self.c, self.h, self.w)
    }
}

/// First and second moment estimates kept per parameter by adaptive optimizers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Moments {
    /// First moment (mean of gradients).
    pub m: Vec<TensorFloat>,
    /// Second moment (uncentered variance of gradients).
    pub v: Vec<TensorFloat>,
}

impl Moments {
    /// Zero-initialized moments for `len` parameters.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }
}

/// A named, shaped buffer with an optional same-shaped gradient.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor {
    name: String,
    shape: Shape,
    data: Vec<TensorFloat>,
    grad: Option<Vec<TensorFloat>>,
    moments: Option<Moments>,
    param: bool,
}

impl Tensor {
    /// Creates an unallocated tensor with a zero shape.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates a zero-filled tensor, with a zeroed gradient if `with_grad`.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Shape, with_grad: bool) -> Self {
        let mut t = Self::empty(name);
        t.set_shape(shape);
        t.allocate(with_grad);
        t
    }

    /// Creates a tensor from existing values.
    ///
    /// Returns `None` if `data` does not hold exactly `shape.len()` values.
    #[must_use]
    pub fn with_data(name: impl Into<String>, shape: Shape, data: Vec<TensorFloat>) -> Option<Self> {
        (data.len() == shape.len()).then(|| Self {
            name: name.into(),
            shape,
            data,
            ..Self::default()
        })
    }

    /// Assigns a new shape, dropping data, gradient and moments.
    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
        self.data = Vec::new();
        self.grad = None;
        self.moments = None;
    }

    /// Allocates zeroed buffers for the current shape.
    pub fn allocate(&mut self, with_grad: bool) {
        let len = self.shape.len();
        self.data = vec![0.0; len];
        self.grad = with_grad.then(|| vec![0.0; len]);
    }

    /// Attaches zeroed optimizer moments matching the current shape.
    pub fn allocate_moments(&mut self) {
        self.moments = Some(Moments::zeros(self.shape.len()));
    }

    pub(crate) const fn mark_param(&mut self) {
        self.param = true;
    }

    /// The tensor's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tensor's shape.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Whether the tensor is a trainable parameter (weights or biases).
    #[must_use]
    pub const fn is_param(&self) -> bool {
        self.param
    }

    /// Immutable view of the values.
    #[must_use]
    pub fn data(&self) -> &[TensorFloat] {
        &self.data
    }

    /// Mutable view of the values.
    pub fn data_mut(&mut self) -> &mut [TensorFloat] {
        &mut self.data
    }

    /// Immutable view of the gradient, if allocated.
    #[must_use]
    pub fn grad(&self) -> Option<&[TensorFloat]> {
        self.grad.as_deref()
    }

    /// Mutable view of the gradient, if allocated.
    pub fn grad_mut(&mut self) -> Option<&mut [TensorFloat]> {
        self.grad.as_deref_mut()
    }

    /// Whether a gradient buffer is allocated.
    #[must_use]
    pub const fn has_grad(&self) -> bool {
        self.grad.is_some()
    }

    /// Optimizer moments, if allocated.
    #[must_use]
    pub const fn moments(&self) -> Option<&Moments> {
        self.moments.as_ref()
    }

    /// Zeroes the gradient buffer if there is one.
    pub fn zero_grad(&mut self) {
        if let Some(grad) = self.grad.as_deref_mut() {
            grad.fill(0.0);
        }
    }

    /// Values of batch sample `i`.
    #[must_use]
    pub fn sample(&self, i: usize) -> &[TensorFloat] {
        let len = self.shape.sample_len();
        &self.data[i * len..(i + 1) * len]
    }

    /// Mutable access to values and gradient at once.
    pub fn split_mut(&mut self) -> (&mut [TensorFloat], Option<&mut [TensorFloat]>) {
        (&mut self.data, self.grad.as_deref_mut())
    }

    /// Mutable access to values and gradient, or `None` without a gradient.
    pub fn data_and_grad_mut(&mut self) -> Option<(&mut [TensorFloat], &mut [TensorFloat])> {
        let grad = self.grad.as_deref_mut()?;
        Some((&mut self.data, grad))
    }

    /// Mutable access to values, gradient and moments at once, as needed by
    /// optimizer updates.
    pub(crate) fn param_parts_mut(
        &mut self,
    ) -> (
        &mut [TensorFloat],
        Option<&mut [TensorFloat]>,
        Option<&mut Moments>,
    ) {
        (
            &mut self.data,
            self.grad.as_deref_mut(),
            self.moments.as_mut(),
        )
    }
}
