use super::{Layer, LayerKind, bad_arity, missing_grad, resolve};
use crate::backend::Backend;
use crate::error::Result;
use crate::nn::ops::{DeconvBackward, DeconvForward, DeconvGeometry, Workspace, dispatch};
use crate::nn::tensors::{Shape, Tensor};
use crate::nn::{Activation, Filler, Net, Node};

/// Hyperparameters of a transposed convolution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconvParams {
    /// Number of filters, i.e. output channels.
    pub num_filters: usize,
    /// Square kernel size.
    pub size: usize,
    /// Stride.
    pub stride: usize,
    /// Padding cropped from each border of the output.
    pub pad: usize,
    /// Weight initialization.
    pub filler: Filler,
    /// Activation applied to the output.
    pub activation: Activation,
}

impl DeconvParams {
    /// Bundles the hyperparameters.
    #[must_use]
    pub const fn new(
        num_filters: usize,
        size: usize,
        stride: usize,
        pad: usize,
        filler: Filler,
        activation: Activation,
    ) -> Self {
        Self {
            num_filters,
            size,
            stride,
            pad,
            filler,
            activation,
        }
    }
}

/// Transposed convolution ("deconvolution") layer.
///
/// Node inputs are `[source, weights, biases]`, the single output is the
/// upsampled destination. The workspace is allocated once at construction and
/// reused by every pass.
#[derive(Debug)]
pub struct DeconvLayer {
    activation: Activation,
    geometry: DeconvGeometry,
    workspace: Workspace,
}

impl DeconvLayer {
    /// Creates the layer for a validated geometry.
    #[must_use]
    pub fn new(geometry: DeconvGeometry, activation: Activation) -> Self {
        Self {
            activation,
            geometry,
            workspace: Workspace::new(geometry.workspace_len()),
        }
    }

    /// Shapes shared by both backends.
    #[must_use]
    pub const fn geometry(&self) -> &DeconvGeometry {
        &self.geometry
    }

    /// Scratch floats held by the layer.
    #[must_use]
    pub fn workspace_len(&self) -> usize {
        self.workspace.len()
    }
}

impl Layer for DeconvLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Deconvolution
    }

    fn forward(
        &mut self,
        backend: Backend,
        tensors: &mut [Tensor],
        src: &[usize],
        dst: &[usize],
    ) -> Result<()> {
        let (&[s, w, b], &[d]) = (src, dst) else {
            return Err(bad_arity(self.kind(), src, dst));
        };
        let [src, weights, biases, dst] = resolve(tensors, [s, w, b, d])?;

        let bufs = DeconvForward {
            src: src.data(),
            weights: weights.data(),
            biases: biases.data(),
            dst: dst.data_mut(),
        };
        dispatch::deconv_forward(
            backend,
            &self.geometry,
            self.activation,
            bufs,
            &mut self.workspace,
        )
    }

    fn backward(
        &mut self,
        backend: Backend,
        tensors: &mut [Tensor],
        src: &[usize],
        dst: &[usize],
    ) -> Result<()> {
        let (&[s, w, b], &[d]) = (src, dst) else {
            return Err(bad_arity(self.kind(), src, dst));
        };
        let [src, weights, biases, dst] = resolve(tensors, [s, w, b, d])?;

        let (src_data, src_grad) = src.split_mut();
        let (weights_data, weights_grad) =
            weights.data_and_grad_mut().ok_or_else(|| missing_grad(w))?;
        let bias_grad = biases.grad_mut().ok_or_else(|| missing_grad(b))?;
        let (dst_data, dst_grad) = dst.data_and_grad_mut().ok_or_else(|| missing_grad(d))?;

        let bufs = DeconvBackward {
            src: src_data,
            src_grad,
            weights: weights_data,
            weights_grad,
            bias_grad,
            dst: dst_data,
            dst_grad,
        };
        dispatch::deconv_backward(
            backend,
            &self.geometry,
            self.activation,
            bufs,
            &mut self.workspace,
        )
    }
}

impl Net {
    /// Appends a transposed convolution node.
    ///
    /// The source is looked up by `src_name` among existing tensors, newest
    /// first; a net without nodes always reads tensor 0. Weights
    /// (`"{dst_name}_w"`, `src_c x num_filters x size x size`), biases
    /// (`"{dst_name}_b"`) and the destination `dst_name` are added to the net.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the source cannot be found or the
    /// hyperparameters give an empty output.
    pub fn add_deconvolutional_layer(
        &mut self,
        params: DeconvParams,
        src_name: &str,
        dst_name: &str,
    ) -> Result<()> {
        let src = self.resolve_source(src_name)?;
        let src_shape = self.tensors[src].shape();
        let geometry = DeconvGeometry::new(
            src_shape,
            params.num_filters,
            params.size,
            params.stride,
            params.pad,
        )
        .inspect_err(|e| log::error!("[Deconvolutional] {e}"))?;

        let mut weights = Tensor::new(
            format!("{dst_name}_w"),
            Shape::new(src_shape.c, params.num_filters, params.size, params.size),
            true,
        );
        params
            .filler
            .fill(weights.data_mut(), geometry.fan_in(), &mut self.rng);
        let mut biases = Tensor::new(
            format!("{dst_name}_b"),
            Shape::new(1, params.num_filters, 1, 1),
            true,
        );
        for param in [&mut weights, &mut biases] {
            param.mark_param();
            if self.config.optimizer.requires_moments() {
                param.allocate_moments();
            }
        }

        let weights = self.add_tensor(weights);
        let biases = self.add_tensor(biases);
        let dst = self.add_tensor(Tensor::new(dst_name, geometry.dst_shape(), true));

        let out = geometry.dst_shape();
        log::info!(
            "[Deconvolutional] input_shape= {}x{}x{} nb_filters= {} kernel_size= {} stride= {} output_shape= {}x{}x{}",
            src_shape.w,
            src_shape.h,
            src_shape.c,
            params.num_filters,
            params.size,
            params.stride,
            out.w,
            out.h,
            out.c
        );

        self.add_node(Node::new(
            vec![src, weights, biases],
            vec![dst],
            Box::new(DeconvLayer::new(geometry, params.activation)),
        ))?;
        Ok(())
    }
}
