//! Spatial map <-> patch matrix transforms.
//!
//! Column layout: row `c * size * size + kh * size + kw`, column
//! `h_col * width_col + w_col`, where `(h_col, w_col)` runs over the positions
//! of a convolution with the given kernel, stride and padding.

use crate::nn::TensorFloat;

/// Output extent of a forward convolution over `dim`.
///
/// Requires `dim + 2 * pad >= size`.
#[inline]
#[must_use]
pub const fn conv_out_dim(dim: usize, size: usize, stride: usize, pad: usize) -> usize {
    (dim + 2 * pad - size) / stride + 1
}

/// Maps a patch coordinate back to the image, or `None` inside the leading padding.
#[inline]
fn image_index(pos: usize, offset: usize, stride: usize, pad: usize) -> Option<usize> {
    (pos * stride + offset).checked_sub(pad)
}

/// Unrolls `image` (`channels x height x width`) into `columns`.
///
/// Positions that fall into the padding read as zero. `columns` must hold
/// `channels * size * size * height_col * width_col` floats.
pub fn im2col(
    image: &[TensorFloat],
    channels: usize,
    height: usize,
    width: usize,
    size: usize,
    stride: usize,
    pad: usize,
    columns: &mut [TensorFloat],
) {
    let height_col = conv_out_dim(height, size, stride, pad);
    let width_col = conv_out_dim(width, size, stride, pad);
    let col_spatial = height_col * width_col;

    for (c_col, rows) in columns
        .chunks_mut(col_spatial)
        .take(channels * size * size)
        .enumerate()
    {
        let kw = c_col % size;
        let kh = (c_col / size) % size;
        let c = c_col / size / size;
        for h_col in 0..height_col {
            let h = image_index(h_col, kh, stride, pad).filter(|&h| h < height);
            for w_col in 0..width_col {
                let w = image_index(w_col, kw, stride, pad).filter(|&w| w < width);
                rows[h_col * width_col + w_col] = match (h, w) {
                    (Some(h), Some(w)) => image[(c * height + h) * width + w],
                    _ => 0.0,
                };
            }
        }
    }
}

/// Scatter-accumulates `columns` back into `image`, the adjoint of [`im2col`].
///
/// Values landing in the padding are dropped. `image` is added to, never
/// cleared.
pub fn col2im(
    columns: &[TensorFloat],
    channels: usize,
    height: usize,
    width: usize,
    size: usize,
    stride: usize,
    pad: usize,
    image: &mut [TensorFloat],
) {
    let height_col = conv_out_dim(height, size, stride, pad);
    let width_col = conv_out_dim(width, size, stride, pad);
    let col_spatial = height_col * width_col;

    for (c_col, rows) in columns
        .chunks(col_spatial)
        .take(channels * size * size)
        .enumerate()
    {
        let kw = c_col % size;
        let kh = (c_col / size) % size;
        let c = c_col / size / size;
        for h_col in 0..height_col {
            let Some(h) = image_index(h_col, kh, stride, pad).filter(|&h| h < height) else {
                continue;
            };
            for w_col in 0..width_col {
                if let Some(w) = image_index(w_col, kw, stride, pad).filter(|&w| w < width) {
                    image[(c * height + h) * width + w] += rows[h_col * width_col + w_col];
                }
            }
        }
    }
}
