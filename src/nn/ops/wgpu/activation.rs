use super::{ActParams, GpuContext, GpuFailure};
use crate::nn::Activation;

/// `dst = act(src)` on the GPU.
///
/// # Errors
///
/// `GpuFailure` if the result cannot be read back.
pub fn activation_forward(
    ctx: &GpuContext,
    act: Activation,
    src: &[f32],
    dst: &mut [f32],
) -> Result<(), GpuFailure> {
    let buf = ctx.upload("activation_data", src);
    let mut encoder = ctx.encoder("activation_forward");
    let params = ActParams {
        kind: act as u32,
        total: src.len() as u32,
        reserved: [0; 2],
    };
    ctx.activation(&mut encoder, params, &buf);
    let staging = ctx.stage(&mut encoder, &buf, dst.len());
    ctx.queue.submit(Some(encoder.finish()));
    ctx.read(&staging, dst)
}

/// `src_grad = dst_grad * act'(output)` on the GPU.
///
/// # Errors
///
/// `GpuFailure` if the result cannot be read back.
pub fn activation_backward(
    ctx: &GpuContext,
    act: Activation,
    output: &[f32],
    dst_grad: &[f32],
    src_grad: &mut [f32],
) -> Result<(), GpuFailure> {
    let output_buf = ctx.upload("activation_output", output);
    let grad_buf = ctx.upload("activation_grad", dst_grad);
    let mut encoder = ctx.encoder("activation_backward");
    let params = ActParams {
        kind: act as u32,
        total: dst_grad.len() as u32,
        reserved: [0; 2],
    };
    ctx.activation_backward(&mut encoder, params, &output_buf, &grad_buf);
    let staging = ctx.stage(&mut encoder, &grad_buf, src_grad.len());
    ctx.queue.submit(Some(encoder.finish()));
    ctx.read(&staging, src_grad)
}
