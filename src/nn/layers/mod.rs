//! Layers: the per-node compute units of a net.
//!
//! Every layer kind implements [`Layer`]. The kind is fixed when the node is
//! created and the net then drives it polymorphically, forward in insertion
//! order and backward in reverse.
//!
//! Layers never own the tensors they read and write. A node hands its layer
//! the whole tensor arena together with its input and output indices; the
//! layer borrows what it needs for the duration of one call.

use crate::backend::Backend;
use crate::error::{NetError, Result};
use crate::nn::tensors::Tensor;

mod activation;
pub use self::activation::ActivationLayer;

mod deconv;
pub use self::deconv::{DeconvLayer, DeconvParams};

/// Kinds of layer a node can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Transposed convolution.
    Deconvolution,
    /// Standalone element-wise activation.
    Activation,
}

/// Forward and backward compute for one operation kind.
pub trait Layer: Send + core::fmt::Debug {
    /// Which kind of layer this is.
    fn kind(&self) -> LayerKind;

    /// Computes the outputs `dst` from the inputs `src`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the indices cannot be resolved in `tensors`,
    /// `Gpu` if the accelerated path fails.
    fn forward(
        &mut self,
        backend: Backend,
        tensors: &mut [Tensor],
        src: &[usize],
        dst: &[usize],
    ) -> Result<()>;

    /// Propagates the gradients held by `dst` into the parameters and the
    /// source gradient.
    ///
    /// # Errors
    ///
    /// Same as [`Layer::forward`].
    fn backward(
        &mut self,
        backend: Backend,
        tensors: &mut [Tensor],
        src: &[usize],
        dst: &[usize],
    ) -> Result<()>;
}

/// Borrows `N` distinct tensors of the arena at once.
pub(crate) fn resolve<const N: usize>(
    tensors: &mut [Tensor],
    indices: [usize; N],
) -> Result<[&mut Tensor; N]> {
    tensors.get_disjoint_mut(indices).map_err(|e| {
        NetError::invalid_parameter(format!("cannot resolve tensors {indices:?}: {e}"))
    })
}

pub(crate) fn missing_grad(index: usize) -> NetError {
    NetError::invalid_parameter(format!("tensor {index} has no gradient buffer"))
}

pub(crate) fn bad_arity(kind: LayerKind, src: &[usize], dst: &[usize]) -> NetError {
    NetError::invalid_parameter(format!(
        "{kind:?} node wired with {} inputs and {} outputs",
        src.len(),
        dst.len()
    ))
}
