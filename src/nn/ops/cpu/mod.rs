//! Parallel CPU backend kernels
//!
//! # CPU Backend
//!
//! Reference implementations of every kernel the layers need. They are what
//! [`dispatch`](super::dispatch) runs when the net's backend is `Cpu`, and the
//! fallback whenever the accelerated path is not available.
//!
//! ## Implemented Ops
//!
//! - `gemm`: row-major `C = alpha * op(A) * op(B) + beta * C`, rows in parallel
//! - `im2col` / `col2im`: spatial map <-> patch matrix
//! - `add_bias` / `grad_bias`: per-channel broadcast and reduction
//! - `activate` / `activate_backward`: element-wise activations
//! - `deconv_forward` / `deconv_backward`: the transposed convolution passes
//! - `sgd` / `adam`: in-place optimizer steps
//!
//! ## Design Goals
//!
//! - Deterministic results for a given input
//! - No dependencies beyond `rayon`

mod activation;
pub use self::activation::{activate, activate_backward};

mod adam;
pub use self::adam::{AdamStep, adam};

mod bias;
pub use self::bias::{add_bias, grad_bias};

mod deconv;
pub use self::deconv::{deconv_backward, deconv_forward};

mod gemm;
pub use self::gemm::gemm;

mod im2col;
pub use self::im2col::{col2im, conv_out_dim, im2col};

mod sgd;
pub use self::sgd::sgd;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Activation;
    use crate::nn::ops::{DeconvBackward, DeconvForward, DeconvGeometry};
    use crate::nn::tensors::{Moments, Shape};
    use approx::assert_abs_diff_eq;

    fn ramp(len: usize, scale: f32) -> Vec<f32> {
        (0..len).map(|i| ((i * 7 % 11) as f32 - 5.0) * scale).collect()
    }

    fn naive_gemm(
        trans_a: bool,
        trans_b: bool,
        m: usize,
        n: usize,
        k: usize,
        a: &[f32],
        b: &[f32],
    ) -> Vec<f32> {
        let mut out = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                for p in 0..k {
                    let av = if trans_a { a[p * m + i] } else { a[i * k + p] };
                    let bv = if trans_b { b[j * k + p] } else { b[p * n + j] };
                    out[i * n + j] += av * bv;
                }
            }
        }
        out
    }

    #[test]
    fn gemm_matches_naive_product_for_every_transposition() {
        let (m, n, k) = (3, 4, 5);
        let a = ramp(m * k, 0.5);
        let b = ramp(k * n, 0.25);
        for (ta, tb) in [(false, false), (true, false), (false, true), (true, true)] {
            let lda = if ta { m } else { k };
            let ldb = if tb { k } else { n };
            let mut c = vec![1.0; m * n];
            gemm(ta, tb, m, n, k, 2.0, &a, lda, &b, ldb, 0.5, &mut c, n);

            let expected = naive_gemm(ta, tb, m, n, k, &a, &b);
            for (got, want) in c.iter().zip(expected) {
                assert_abs_diff_eq!(*got, 2.0 * want + 0.5, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn gemm_with_zero_beta_ignores_garbage() {
        let mut c = vec![f32::NAN; 4];
        gemm(false, false, 2, 2, 1, 1.0, &[1.0, 2.0], 1, &[3.0, 4.0], 2, 0.0, &mut c, 2);
        assert_eq!(c, vec![3.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn col2im_is_adjoint_of_im2col() {
        let (channels, height, width, size, stride, pad) = (2, 5, 4, 3, 2, 1);
        let rows = channels * size * size;
        let cols = conv_out_dim(height, size, stride, pad) * conv_out_dim(width, size, stride, pad);

        let x = ramp(channels * height * width, 0.3);
        let y = ramp(rows * cols, 0.7);

        let mut unrolled = vec![0.0; rows * cols];
        im2col(&x, channels, height, width, size, stride, pad, &mut unrolled);
        let mut folded = vec![0.0; x.len()];
        col2im(&y, channels, height, width, size, stride, pad, &mut folded);

        let lhs: f32 = unrolled.iter().zip(&y).map(|(a, b)| a * b).sum();
        let rhs: f32 = x.iter().zip(&folded).map(|(a, b)| a * b).sum();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-3);
    }

    #[test]
    fn im2col_zeroes_padding() {
        let image = [1.0, 2.0, 3.0, 4.0];
        let mut cols = vec![-1.0; 9 * 4];
        im2col(&image, 1, 2, 2, 3, 1, 1, &mut cols);
        // kernel tap (0, 0) at output (0, 0) reads the top-left padding
        assert_eq!(cols[0], 0.0);
        // centre tap reproduces the image
        assert_eq!(&cols[4 * 4..5 * 4], &image);
    }

    #[test]
    fn deconv_of_single_pixel_stamps_the_kernel() {
        // 1 input channel, 1x1 pixel, 2 filters of size 2, stride 1, no pad.
        let g = DeconvGeometry::new(Shape::new(1, 1, 1, 1), 2, 2, 1, 0).unwrap();
        assert_eq!(g.dst_shape(), Shape::new(1, 2, 2, 2));
        let weights = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mut dst = vec![0.0; 8];
        let mut ws = vec![0.0; g.workspace_len()];
        deconv_forward(
            &g,
            Activation::None,
            DeconvForward {
                src: &[2.0],
                weights: &weights,
                biases: &[0.5, -1.0],
                dst: &mut dst,
            },
            &mut ws,
        );
        assert_eq!(dst, vec![2.5, 4.5, 6.5, 8.5, 9.0, 11.0, 13.0, 15.0]);
    }

    #[test]
    fn deconv_stride_two_places_copies_apart() {
        // 1x2 input, kernel 1, stride 2: outputs land at columns 0 and 2.
        let g = DeconvGeometry::new(Shape::new(1, 1, 1, 2), 1, 1, 2, 0).unwrap();
        assert_eq!(g.dst_shape(), Shape::new(1, 1, 1, 3));
        let mut dst = vec![9.0; 3];
        let mut ws = vec![0.0; g.workspace_len()];
        deconv_forward(
            &g,
            Activation::None,
            DeconvForward {
                src: &[3.0, -2.0],
                weights: &[2.0],
                biases: &[0.0],
                dst: &mut dst,
            },
            &mut ws,
        );
        assert_eq!(dst, vec![6.0, 0.0, -4.0]);
    }

    #[test]
    fn deconv_backward_matches_finite_differences() {
        let g = DeconvGeometry::new(Shape::new(1, 2, 3, 3), 2, 3, 2, 1).unwrap();
        let src = ramp(g.src_shape().len(), 0.1);
        let weights = ramp(g.weights_len(), 0.05);
        let biases = [0.1, -0.2];
        let dst_len = g.dst_shape().len();
        let mut ws = vec![0.0; g.workspace_len()];

        // loss = sum(dst * coeff), so dL/ddst = coeff
        let coeff = ramp(dst_len, 0.2);
        let loss = |src: &[f32], weights: &[f32], ws: &mut [f32]| -> f32 {
            let mut dst = vec![0.0; dst_len];
            deconv_forward(
                &g,
                Activation::Tanh,
                DeconvForward {
                    src,
                    weights,
                    biases: &biases,
                    dst: &mut dst,
                },
                ws,
            );
            dst.iter().zip(&coeff).map(|(a, b)| a * b).sum()
        };

        let mut dst = vec![0.0; dst_len];
        deconv_forward(
            &g,
            Activation::Tanh,
            DeconvForward {
                src: &src,
                weights: &weights,
                biases: &biases,
                dst: &mut dst,
            },
            &mut ws,
        );
        let mut dst_grad = coeff.clone();
        let mut weights_grad = vec![0.0; weights.len()];
        let mut bias_grad = vec![0.0; 2];
        let mut src_grad = vec![0.0; src.len()];
        deconv_backward(
            &g,
            Activation::Tanh,
            DeconvBackward {
                src: &src,
                src_grad: Some(src_grad.as_mut_slice()),
                weights: &weights,
                weights_grad: &mut weights_grad,
                bias_grad: &mut bias_grad,
                dst: &dst,
                dst_grad: &mut dst_grad,
            },
            &mut ws,
        );

        let h = 1e-2;
        for idx in [0, 5, 17, weights.len() - 1] {
            let mut plus = weights.clone();
            plus[idx] += h;
            let mut minus = weights.clone();
            minus[idx] -= h;
            let numeric = (loss(&src, &plus, &mut ws) - loss(&src, &minus, &mut ws)) / (2.0 * h);
            assert_abs_diff_eq!(weights_grad[idx], numeric, epsilon = 1e-2);
        }
        for idx in [0, 4, src.len() - 1] {
            let mut plus = src.clone();
            plus[idx] += h;
            let mut minus = src.clone();
            minus[idx] -= h;
            let numeric = (loss(&plus, &weights, &mut ws) - loss(&minus, &weights, &mut ws)) / (2.0 * h);
            assert_abs_diff_eq!(src_grad[idx], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn bias_grad_sums_over_batch_and_space() {
        let mut bias_grad = vec![1.0, 0.0];
        // 2 samples x 2 channels x 2 positions
        let grad = [1.0, 2.0, 10.0, 20.0, 3.0, 4.0, 30.0, 40.0];
        grad_bias(&mut bias_grad, &grad, 2);
        assert_eq!(bias_grad, vec![11.0, 100.0]);
    }

    #[test]
    fn optimizers_step_and_clear_grads() {
        let mut w = vec![1.0, -1.0];
        let mut g = vec![0.5, -0.5];
        sgd(&mut w, &mut g, 0.1, 0.0);
        assert_abs_diff_eq!(w[0], 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(w[1], -0.95, epsilon = 1e-6);
        assert_eq!(g, vec![0.0, 0.0]);

        let mut w = vec![1.0];
        let mut g = vec![2.0];
        let mut moments = Moments::zeros(1);
        let step = AdamStep {
            lr: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 1,
        };
        adam(&mut w, &mut g, &mut moments, step);
        // first bias-corrected step moves by lr * sign(grad)
        assert_abs_diff_eq!(w[0], 0.99, epsilon = 1e-5);
        assert_eq!(g[0], 0.0);
    }
}
