//! Backend selection for the layer kernels.
//!
//! Every entry point looks at the [`Backend`] captured by the net. `Wgpu`
//! runs on the device when the feature is compiled in and an adapter was
//! found; anything else lands on the CPU kernels, which always succeed.

use super::{DeconvBackward, DeconvForward, DeconvGeometry, Workspace};
use crate::backend::Backend;
use crate::error::Result;
use crate::nn::{Activation, TensorFloat};

/// Runs the deconvolution forward pass on `backend`.
///
/// # Errors
///
/// `Gpu` if the accelerated path was taken and the device failed.
pub fn deconv_forward(
    backend: Backend,
    g: &DeconvGeometry,
    act: Activation,
    bufs: DeconvForward<'_>,
    workspace: &mut Workspace,
) -> Result<()> {
    match backend {
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if let Some(ctx) = super::wgpu::context() {
                    return Ok(super::wgpu::deconv_forward(ctx, g, act, bufs, workspace)?);
                }
            }
        }
        Backend::Cpu => {}
    }

    super::cpu::deconv_forward(g, act, bufs, &mut workspace.host);
    Ok(())
}

/// Runs the deconvolution backward pass on `backend`.
///
/// # Errors
///
/// `Gpu` if the accelerated path was taken and the device failed.
pub fn deconv_backward(
    backend: Backend,
    g: &DeconvGeometry,
    act: Activation,
    bufs: DeconvBackward<'_>,
    workspace: &mut Workspace,
) -> Result<()> {
    match backend {
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if let Some(ctx) = super::wgpu::context() {
                    return Ok(super::wgpu::deconv_backward(ctx, g, act, bufs, workspace)?);
                }
            }
        }
        Backend::Cpu => {}
    }

    super::cpu::deconv_backward(g, act, bufs, &mut workspace.host);
    Ok(())
}

/// Writes `act(src)` into `dst`.
///
/// # Errors
///
/// `Gpu` if the accelerated path was taken and the device failed.
pub fn activation_forward(
    backend: Backend,
    act: Activation,
    src: &[TensorFloat],
    dst: &mut [TensorFloat],
) -> Result<()> {
    match backend {
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if let Some(ctx) = super::wgpu::context() {
                    return Ok(super::wgpu::activation_forward(ctx, act, src, dst)?);
                }
            }
        }
        Backend::Cpu => {}
    }

    dst.copy_from_slice(src);
    super::cpu::activate(act, dst);
    Ok(())
}

/// Writes `dst_grad * act'(output)` into `src_grad`.
///
/// # Errors
///
/// `Gpu` if the accelerated path was taken and the device failed.
pub fn activation_backward(
    backend: Backend,
    act: Activation,
    output: &[TensorFloat],
    dst_grad: &[TensorFloat],
    src_grad: &mut [TensorFloat],
) -> Result<()> {
    match backend {
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if let Some(ctx) = super::wgpu::context() {
                    return Ok(super::wgpu::activation_backward(
                        ctx, act, output, dst_grad, src_grad,
                    )?);
                }
            }
        }
        Backend::Cpu => {}
    }

    src_grad.copy_from_slice(dst_grad);
    super::cpu::activate_backward(act, output, src_grad);
    Ok(())
}
