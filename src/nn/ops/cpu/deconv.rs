use super::{activate, activate_backward, add_bias, col2im, gemm, grad_bias, im2col};
use crate::nn::Activation;
use crate::nn::ops::{DeconvBackward, DeconvForward, DeconvGeometry};

/// Transposed convolution forward pass.
///
/// Per sample, `workspace = W^T * src_i` is scattered into the destination
/// with [`col2im`]. Biases and the activation are applied once the whole
/// batch is written.
pub fn deconv_forward(
    g: &DeconvGeometry,
    act: Activation,
    bufs: DeconvForward<'_>,
    workspace: &mut [f32],
) {
    let DeconvForward {
        src,
        weights,
        biases,
        dst,
    } = bufs;
    let m = g.col_rows();
    let n = g.src_spatial();
    let k = g.src_c;
    let dst_sample = g.dst_shape().sample_len();
    let ws = &mut workspace[..m * n];

    dst.fill(0.0);
    for (src_i, dst_i) in src.chunks(k * n).zip(dst.chunks_mut(dst_sample)) {
        gemm(true, false, m, n, k, 1.0, weights, m, src_i, n, 0.0, ws, n);
        col2im(ws, g.num, g.dst_h, g.dst_w, g.size, g.stride, g.pad, dst_i);
    }

    add_bias(dst, biases, g.dst_h * g.dst_w);
    activate(act, dst);
}

/// Transposed convolution backward pass.
///
/// Weight and bias gradients are accumulated, the weight contribution of each
/// sample scaled by `1 / batch`. The source gradient, when present, is
/// overwritten sample by sample.
pub fn deconv_backward(
    g: &DeconvGeometry,
    act: Activation,
    bufs: DeconvBackward<'_>,
    workspace: &mut [f32],
) {
    let DeconvBackward {
        src,
        mut src_grad,
        weights,
        weights_grad,
        bias_grad,
        dst,
        dst_grad,
    } = bufs;
    let rows = g.col_rows();
    let k = g.src_spatial();
    let c = g.src_c;
    let dst_sample = g.dst_shape().sample_len();
    let alpha = 1.0 / g.batch as f32;
    let ws = &mut workspace[..rows * k];

    activate_backward(act, dst, dst_grad);
    grad_bias(bias_grad, dst_grad, g.dst_h * g.dst_w);

    for (i, grad_i) in dst_grad.chunks(dst_sample).enumerate() {
        im2col(grad_i, g.num, g.dst_h, g.dst_w, g.size, g.stride, g.pad, ws);

        let src_i = &src[i * c * k..(i + 1) * c * k];
        gemm(false, true, c, rows, k, alpha, src_i, k, ws, k, 1.0, weights_grad, rows);

        if let Some(src_grad) = src_grad.as_deref_mut() {
            let out = &mut src_grad[i * c * k..(i + 1) * c * k];
            gemm(false, false, c, k, rows, 1.0, weights, rows, ws, k, 0.0, out, k);
        }
    }
}
