//! Compute kernels behind the layers.
//!
//! # Submodules
//!
//! - [`cpu`]: Rayon-parallel reference kernels (`gemm`, `im2col`/`col2im`,
//!   bias, activations, the deconvolution passes and optimizer steps).
//! - [`dispatch`]: backend selection with CPU fallback. Layers only ever call
//!   into this module.
//! - `wgpu`: WGSL compute shaders mirroring the CPU kernels (requires the
//!   `wgpu` feature).
//!
//! # Backend Selection
//!
//! Each dispatch function looks at the [`Backend`](crate::backend::Backend)
//! captured by the net. When `Wgpu` is requested and a device is available the
//! GPU path runs; otherwise the CPU path does. Both paths take the same
//! [`DeconvGeometry`], so shapes and workspace sizes can never diverge.
//!
//! # Notes
//!
//! - All kernels are `f32`.
//! - Kernels trust the shapes fixed at construction and do not re-check them.

pub mod cpu;
pub mod dispatch;
#[cfg(feature = "wgpu")]
pub mod wgpu;

use crate::error::{NetError, Result};
use crate::nn::TensorFloat;
use crate::nn::tensors::Shape;

/// Shape arithmetic shared by every deconvolution kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconvGeometry {
    /// Batch size.
    pub batch: usize,
    /// Source channels.
    pub src_c: usize,
    /// Source height.
    pub src_h: usize,
    /// Source width.
    pub src_w: usize,
    /// Number of filters, i.e. destination channels.
    pub num: usize,
    /// Square kernel size.
    pub size: usize,
    /// Stride.
    pub stride: usize,
    /// Zero padding removed from each border of the destination.
    pub pad: usize,
    /// Destination height.
    pub dst_h: usize,
    /// Destination width.
    pub dst_w: usize,
}

/// Transposed-convolution output extent: `stride * (input - 1) + size - 2 * pad`.
///
/// Returns `None` when the result would not be strictly positive.
#[must_use]
pub fn deconv_output_dim(input: usize, size: usize, stride: usize, pad: usize) -> Option<usize> {
    let grown = stride.checked_mul(input.checked_sub(1)?)?.checked_add(size)?;
    grown.checked_sub(pad.checked_mul(2)?).filter(|&d| d > 0)
}

impl DeconvGeometry {
    /// Validates hyperparameters against a source shape.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if any of `num`, `size`, `stride` or the source
    /// extents is zero, or if the destination would be empty.
    pub fn new(src: Shape, num: usize, size: usize, stride: usize, pad: usize) -> Result<Self> {
        if num == 0 || size == 0 || stride == 0 {
            return Err(NetError::invalid_parameter(format!(
                "deconvolution needs positive filters, kernel and stride (got {num}, {size}, {stride})"
            )));
        }
        if src.is_empty() {
            return Err(NetError::invalid_parameter(format!(
                "deconvolution source has empty shape {src}"
            )));
        }
        let out = |dim| {
            deconv_output_dim(dim, size, stride, pad).ok_or_else(|| {
                NetError::invalid_parameter(format!(
                    "deconvolution output is empty for input {dim}, size {size}, stride {stride}, pad {pad}"
                ))
            })
        };
        Ok(Self {
            batch: src.n,
            src_c: src.c,
            src_h: src.h,
            src_w: src.w,
            num,
            size,
            stride,
            pad,
            dst_h: out(src.h)?,
            dst_w: out(src.w)?,
        })
    }

    /// Shape of the source tensor.
    #[must_use]
    pub const fn src_shape(&self) -> Shape {
        Shape::new(self.batch, self.src_c, self.src_h, self.src_w)
    }

    /// Shape of the destination tensor.
    #[must_use]
    pub const fn dst_shape(&self) -> Shape {
        Shape::new(self.batch, self.num, self.dst_h, self.dst_w)
    }

    /// Spatial positions per source channel, the column count of the workspace.
    #[must_use]
    pub const fn src_spatial(&self) -> usize {
        self.src_h * self.src_w
    }

    /// Rows of the unrolled patch matrix: `num * size * size`.
    #[must_use]
    pub const fn col_rows(&self) -> usize {
        self.num * self.size * self.size
    }

    /// Number of weights: a `src_c x (num * size * size)` matrix.
    #[must_use]
    pub const fn weights_len(&self) -> usize {
        self.src_c * self.col_rows()
    }

    /// Receptive-field fan-in used by weight fillers.
    #[must_use]
    pub const fn fan_in(&self) -> usize {
        self.size * self.size * self.src_c
    }

    /// Scratch floats needed per sample.
    ///
    /// At least `dst_w * dst_h * src_c * size * size`, and never less than the
    /// `col_rows x src_spatial` patch matrix the kernels actually write.
    #[must_use]
    pub fn workspace_len(&self) -> usize {
        let nominal = self.dst_w * self.dst_h * self.src_c * self.size * self.size;
        nominal.max(self.col_rows() * self.src_spatial())
    }
}

/// Buffers read and written by a deconvolution forward pass.
#[derive(Debug)]
pub struct DeconvForward<'a> {
    /// Source activations, `batch x src_c x src_h x src_w`.
    pub src: &'a [TensorFloat],
    /// Weights, a `src_c x (num * size * size)` matrix.
    pub weights: &'a [TensorFloat],
    /// One bias per filter.
    pub biases: &'a [TensorFloat],
    /// Destination activations, overwritten.
    pub dst: &'a mut [TensorFloat],
}

/// Buffers read and written by a deconvolution backward pass.
#[derive(Debug)]
pub struct DeconvBackward<'a> {
    /// Source activations.
    pub src: &'a [TensorFloat],
    /// Source gradient, overwritten per sample when present.
    pub src_grad: Option<&'a mut [TensorFloat]>,
    /// Weights.
    pub weights: &'a [TensorFloat],
    /// Weight gradient, accumulated.
    pub weights_grad: &'a mut [TensorFloat],
    /// Bias gradient, accumulated.
    pub bias_grad: &'a mut [TensorFloat],
    /// Stored forward output.
    pub dst: &'a [TensorFloat],
    /// Destination gradient, scaled in place by the activation derivative.
    pub dst_grad: &'a mut [TensorFloat],
}

/// Per-layer scratch memory, reused across forward and backward calls.
#[derive(Debug, Default)]
pub struct Workspace {
    pub(crate) host: Vec<TensorFloat>,
    #[cfg(feature = "wgpu")]
    pub(crate) device: Option<::wgpu::Buffer>,
}

impl Workspace {
    /// Allocates `len` zeroed host floats. Device memory is created lazily on
    /// the first accelerated call.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            host: vec![0.0; len],
            #[cfg(feature = "wgpu")]
            device: None,
        }
    }

    /// Host-side length in floats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.host.len()
    }

    /// Whether the workspace holds no floats.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dim_follows_transposed_formula() {
        for input in 1..6 {
            for size in 1..5 {
                for stride in 1..4 {
                    for pad in 0..3 {
                        let expected = (stride * (input - 1) + size) as isize - 2 * pad as isize;
                        let got = deconv_output_dim(input, size, stride, pad);
                        if expected > 0 {
                            assert_eq!(got, Some(expected as usize));
                        } else {
                            assert_eq!(got, None);
                        }
                    }
                }
            }
        }
        assert_eq!(deconv_output_dim(0, 3, 2, 0), None);
    }

    #[test]
    fn geometry_rejects_degenerate_layers() {
        let src = Shape::new(1, 2, 4, 4);
        assert!(DeconvGeometry::new(src, 0, 3, 1, 0).is_err());
        assert!(DeconvGeometry::new(src, 2, 0, 1, 0).is_err());
        assert!(DeconvGeometry::new(src, 2, 3, 0, 0).is_err());
        assert!(DeconvGeometry::new(Shape::new(1, 2, 1, 1), 2, 1, 1, 1).is_err());
        assert!(matches!(
            DeconvGeometry::new(src, 2, 3, 1, usize::MAX / 2 + 1),
            Err(NetError::InvalidParameter(_))
        ));

        let g = DeconvGeometry::new(src, 5, 3, 2, 1).unwrap();
        assert_eq!(g.dst_shape(), Shape::new(1, 5, 7, 7));
        assert_eq!(g.weights_len(), 2 * 5 * 9);
        assert!(g.workspace_len() >= g.col_rows() * g.src_spatial());
    }
}
