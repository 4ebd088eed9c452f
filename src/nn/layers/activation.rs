use super::{Layer, LayerKind, bad_arity, missing_grad, resolve};
use crate::backend::Backend;
use crate::error::Result;
use crate::nn::ops::dispatch;
use crate::nn::tensors::Tensor;
use crate::nn::{Activation, Net};

/// Applies an activation to a whole tensor: `dst = f(src)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationLayer {
    activation: Activation,
}

impl ActivationLayer {
    /// Creates the layer.
    #[must_use]
    pub const fn new(activation: Activation) -> Self {
        Self { activation }
    }

    /// The activation applied.
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }
}

impl Layer for ActivationLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Activation
    }

    fn forward(
        &mut self,
        backend: Backend,
        tensors: &mut [Tensor],
        src: &[usize],
        dst: &[usize],
    ) -> Result<()> {
        let (&[s], &[d]) = (src, dst) else {
            return Err(bad_arity(self.kind(), src, dst));
        };
        let [src, dst] = resolve(tensors, [s, d])?;
        dispatch::activation_forward(backend, self.activation, src.data(), dst.data_mut())
    }

    fn backward(
        &mut self,
        backend: Backend,
        tensors: &mut [Tensor],
        src: &[usize],
        dst: &[usize],
    ) -> Result<()> {
        let (&[s], &[d]) = (src, dst) else {
            return Err(bad_arity(self.kind(), src, dst));
        };
        let [src, dst] = resolve(tensors, [s, d])?;
        let Some(src_grad) = src.grad_mut() else {
            return Ok(());
        };
        let dst_grad = dst.grad().ok_or_else(|| missing_grad(d))?;
        dispatch::activation_backward(backend, self.activation, dst.data(), dst_grad, src_grad)
    }
}

impl Net {
    /// Appends a standalone activation node reading `src_name` and writing a
    /// new same-shaped tensor `dst_name`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the source cannot be resolved.
    pub fn add_activation_layer(
        &mut self,
        activation: Activation,
        src_name: &str,
        dst_name: &str,
    ) -> Result<()> {
        let src = self.resolve_source(src_name)?;
        let shape = self.tensors[src].shape();
        let dst = self.add_tensor(Tensor::new(dst_name, shape, true));

        log::info!("[Activation] shape= {shape} function= {activation:?}");
        self.add_node(crate::nn::Node::new(
            vec![src],
            vec![dst],
            Box::new(ActivationLayer::new(activation)),
        ))?;
        Ok(())
    }
}
