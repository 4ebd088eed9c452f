use super::{ActParams, BiasParams, ColParams, GemmParams, GpuContext, GpuFailure};
use crate::nn::Activation;
use crate::nn::ops::{DeconvBackward, DeconvForward, DeconvGeometry, Workspace};

/// Patch-matrix parameters for sample `sample` of the destination.
fn col_params(g: &DeconvGeometry, sample: usize) -> ColParams {
    ColParams {
        channels: g.num as u32,
        height: g.dst_h as u32,
        width: g.dst_w as u32,
        size: g.size as u32,
        stride: g.stride as u32,
        pad: g.pad as u32,
        height_col: g.src_h as u32,
        width_col: g.src_w as u32,
        im_off: (sample * g.dst_shape().sample_len()) as u32,
        col_off: 0,
        total: 0,
        reserved: 0,
    }
}

fn bias_params(g: &DeconvGeometry) -> BiasParams {
    BiasParams {
        channels: g.num as u32,
        spatial: (g.dst_h * g.dst_w) as u32,
        total: g.dst_shape().len() as u32,
        reserved: 0,
    }
}

/// The layer's device workspace, created on first use and kept afterwards.
fn device_workspace<'w>(ctx: &GpuContext, workspace: &'w mut Workspace) -> &'w wgpu::Buffer {
    let len = workspace.len();
    workspace
        .device
        .get_or_insert_with(|| ctx.scratch("deconv_workspace", len))
}

/// Transposed convolution forward pass on the GPU.
///
/// Same contract as the CPU kernel: per-sample `W^T * src_i` into the
/// workspace, `col2im` into the destination, then bias and activation.
///
/// # Errors
///
/// `GpuFailure` if waiting on the device or reading back the result fails.
pub fn deconv_forward(
    ctx: &GpuContext,
    g: &DeconvGeometry,
    act: Activation,
    bufs: DeconvForward<'_>,
    workspace: &mut Workspace,
) -> Result<(), GpuFailure> {
    let DeconvForward {
        src,
        weights,
        biases,
        dst,
    } = bufs;
    let m = g.col_rows();
    let n = g.src_spatial();
    let k = g.src_c;

    let src_buf = ctx.upload("deconv_src", src);
    let weights_buf = ctx.upload("deconv_weights", weights);
    let biases_buf = ctx.upload("deconv_biases", biases);
    let dst_buf = ctx.scratch("deconv_dst", dst.len());
    let ws = device_workspace(ctx, workspace);

    let mut encoder = ctx.encoder("deconv_forward");
    for i in 0..g.batch {
        let gemm = GemmParams {
            m: m as u32,
            n: n as u32,
            k: k as u32,
            lda: m as u32,
            ldb: n as u32,
            ldc: n as u32,
            trans_a: 1,
            b_off: (i * k * n) as u32,
            alpha: 1.0,
            beta: 0.0,
            ..GemmParams::default()
        };
        ctx.gemm(&mut encoder, gemm, &weights_buf, &src_buf, ws);

        let fold = ColParams {
            total: g.dst_shape().sample_len() as u32,
            ..col_params(g, i)
        };
        ctx.col2im(&mut encoder, fold, ws, &dst_buf);
    }
    ctx.add_bias(&mut encoder, bias_params(g), &biases_buf, &dst_buf);
    if act != Activation::None {
        let params = ActParams {
            kind: act as u32,
            total: dst.len() as u32,
            reserved: [0; 2],
        };
        ctx.activation(&mut encoder, params, &dst_buf);
    }
    let staging = ctx.stage(&mut encoder, &dst_buf, dst.len());
    ctx.queue.submit(Some(encoder.finish()));

    ctx.read(&staging, dst)
}

/// Transposed convolution backward pass on the GPU.
///
/// Accumulates into the weight and bias gradients, scales the destination
/// gradient in place, and overwrites the source gradient when present.
///
/// # Errors
///
/// `GpuFailure` if waiting on the device or reading back a result fails.
pub fn deconv_backward(
    ctx: &GpuContext,
    g: &DeconvGeometry,
    act: Activation,
    bufs: DeconvBackward<'_>,
    workspace: &mut Workspace,
) -> Result<(), GpuFailure> {
    let DeconvBackward {
        src,
        src_grad,
        weights,
        weights_grad,
        bias_grad,
        dst,
        dst_grad,
    } = bufs;
    let rows = g.col_rows();
    let k = g.src_spatial();
    let c = g.src_c;

    let src_buf = ctx.upload("deconv_src", src);
    let weights_buf = ctx.upload("deconv_weights", weights);
    let weights_grad_buf = ctx.upload("deconv_weights_grad", weights_grad);
    let bias_grad_buf = ctx.upload("deconv_bias_grad", bias_grad);
    let dst_buf = ctx.upload("deconv_dst", dst);
    let dst_grad_buf = ctx.upload("deconv_dst_grad", dst_grad);
    let src_grad_buf = src_grad
        .as_deref()
        .map(|sg| ctx.scratch("deconv_src_grad", sg.len()));
    let ws = device_workspace(ctx, workspace);

    let mut encoder = ctx.encoder("deconv_backward");
    if act != Activation::None {
        let params = ActParams {
            kind: act as u32,
            total: dst_grad.len() as u32,
            reserved: [0; 2],
        };
        ctx.activation_backward(&mut encoder, params, &dst_buf, &dst_grad_buf);
    }
    ctx.grad_bias(&mut encoder, bias_params(g), &dst_grad_buf, &bias_grad_buf);

    for i in 0..g.batch {
        let unroll = ColParams {
            total: (rows * k) as u32,
            ..col_params(g, i)
        };
        ctx.im2col(&mut encoder, unroll, &dst_grad_buf, ws);

        let weight_update = GemmParams {
            m: c as u32,
            n: rows as u32,
            k: k as u32,
            lda: k as u32,
            ldb: k as u32,
            ldc: rows as u32,
            trans_b: 1,
            a_off: (i * c * k) as u32,
            alpha: 1.0 / g.batch as f32,
            beta: 1.0,
            ..GemmParams::default()
        };
        ctx.gemm(&mut encoder, weight_update, &src_buf, ws, &weights_grad_buf);

        if let Some(src_grad_buf) = &src_grad_buf {
            let input_grad = GemmParams {
                m: c as u32,
                n: k as u32,
                k: rows as u32,
                lda: rows as u32,
                ldb: k as u32,
                ldc: k as u32,
                c_off: (i * c * k) as u32,
                alpha: 1.0,
                beta: 0.0,
                ..GemmParams::default()
            };
            ctx.gemm(&mut encoder, input_grad, &weights_buf, ws, src_grad_buf);
        }
    }

    let dst_grad_staging = ctx.stage(&mut encoder, &dst_grad_buf, dst_grad.len());
    let weights_grad_staging = ctx.stage(&mut encoder, &weights_grad_buf, weights_grad.len());
    let bias_grad_staging = ctx.stage(&mut encoder, &bias_grad_buf, bias_grad.len());
    let src_grad_staging = src_grad_buf
        .as_ref()
        .map(|buf| ctx.stage(&mut encoder, buf, c * k * g.batch));
    ctx.queue.submit(Some(encoder.finish()));

    ctx.read(&dst_grad_staging, dst_grad)?;
    ctx.read(&weights_grad_staging, weights_grad)?;
    ctx.read(&bias_grad_staging, bias_grad)?;
    if let (Some(staging), Some(out)) = (src_grad_staging, src_grad) {
        ctx.read(&staging, out)?;
    }
    Ok(())
}
