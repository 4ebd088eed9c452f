use crate::nn::TensorFloat;
use rayon::prelude::*;

/// Row-major general matrix multiply:
/// `C = alpha * op(A) * op(B) + beta * C`.
///
/// `op(A)` is `m x k` and `op(B)` is `k x n`. With `trans_a`, `A` is stored
/// as `k x m`; with `trans_b`, `B` is stored as `n x k`. `lda`, `ldb` and
/// `ldc` are the row strides of the stored matrices.
///
/// Output rows are computed in parallel. When `beta` is zero the previous
/// contents of `C` are ignored rather than scaled.
///
/// # Panics
///
/// If any slice is too short for the dimensions and strides given.
pub fn gemm(
    trans_a: bool,
    trans_b: bool,
    m: usize,
    n: usize,
    k: usize,
    alpha: TensorFloat,
    a: &[TensorFloat],
    lda: usize,
    b: &[TensorFloat],
    ldb: usize,
    beta: TensorFloat,
    c: &mut [TensorFloat],
    ldc: usize,
) {
    if m == 0 || n == 0 {
        return;
    }
    let a_at = |i: usize, p: usize| {
        if trans_a {
            a[p * lda + i]
        } else {
            a[i * lda + p]
        }
    };

    c.par_chunks_mut(ldc)
        .take(m)
        .enumerate()
        .for_each(|(i, row)| {
            let row = &mut row[..n];
            if beta == 0.0 {
                row.fill(0.0);
            } else if (beta - 1.0).abs() > TensorFloat::EPSILON {
                row.iter_mut().for_each(|v| *v *= beta);
            }

            if trans_b {
                for (j, out) in row.iter_mut().enumerate() {
                    let b_row = &b[j * ldb..j * ldb + k];
                    let sum: TensorFloat = b_row
                        .iter()
                        .enumerate()
                        .map(|(p, &bv)| a_at(i, p) * bv)
                        .sum();
                    *out += alpha * sum;
                }
            } else {
                for p in 0..k {
                    let scale = alpha * a_at(i, p);
                    let b_row = &b[p * ldb..p * ldb + n];
                    for (out, &bv) in row.iter_mut().zip(b_row) {
                        *out += scale * bv;
                    }
                }
            }
        });
}
