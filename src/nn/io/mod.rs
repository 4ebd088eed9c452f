//! Saving and loading the parameters of a net.
//!
//! # `DCNNv1` Format
//!
//! A parameter file stores every parameter tensor of a net (weights and
//! biases), identified by name:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────┬────────────────────┐
//! │ Header       │ Tensor N .. N+1 .. N+2 ..   │ Checksum           │
//! ├──────────────┼─────────────────────────────┼────────────────────┤
//! │ `DCNNv1\0\0` │ u32: name length            │ u32: file checksum │
//! │ u64: count   │ [u8] name (UTF-8)           │                    │
//! │              │ u32 n, c, h, w              │                    │
//! │              │ [f32; n*c*h*w] data         │                    │
//! └──────────────┴─────────────────────────────┴────────────────────┘
//! ```
//!
//! All integers and floats are little-endian. The checksum is the CRC-32 of
//! every byte before it.
//!
//! Loading is all or nothing: the file is fully validated before any tensor
//! of the net is touched. Each stored tensor must match a tensor of the net
//! with the same name and shape.

use crate::error::{NetError, Result};
use crate::nn::tensors::Shape;
use crate::nn::{Net, TensorFloat};
use crc32fast::Hasher;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes opening every parameter file.
pub const DCNN_MAGIC_V1: [u8; 8] = *b"DCNNv1\0\0";

const HEADER_LEN: usize = DCNN_MAGIC_V1.len() + 8;

/// Writes every parameter tensor of `net` to `path`.
///
/// # Errors
///
/// `Io` if the file cannot be created or written.
pub fn save_params(net: &Net, path: impl AsRef<Path>) -> Result<()> {
    let buf = serialize_params(net)?;
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(&buf)?;
    file.flush()?;
    Ok(())
}

/// Restores the parameter tensors of `net` from `path`.
///
/// # Errors
///
/// `Io` if the file cannot be read, `InvalidData` if it is corrupt or does
/// not fit the net.
pub fn load_params(net: &mut Net, path: impl AsRef<Path>) -> Result<()> {
    let mut file = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    deserialize_params(net, &buf)
}

/// Encodes every parameter tensor of `net`.
///
/// # Errors
///
/// `InvalidData` if a name or dimension does not fit its `u32` field.
pub fn serialize_params(net: &Net) -> Result<Vec<u8>> {
    let params: Vec<_> = net.tensors().iter().filter(|t| t.is_param()).collect();
    let len = HEADER_LEN
        + params
            .iter()
            .map(|t| 4 + t.name().len() + 16 + t.data().len() * 4)
            .sum::<usize>()
        + 4;

    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(&DCNN_MAGIC_V1);
    buf.extend_from_slice(&(params.len() as u64).to_le_bytes());

    for t in params {
        let name = t.name().as_bytes();
        buf.extend_from_slice(&to_u32(name.len(), "name length")?.to_le_bytes());
        buf.extend_from_slice(name);

        let Shape { n, c, h, w } = t.shape();
        for dim in [n, c, h, w] {
            buf.extend_from_slice(&to_u32(dim, "dimension")?.to_le_bytes());
        }
        for v in t.data() {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(buf)
}

/// Decodes `buf` into the parameter tensors of `net`.
///
/// # Errors
///
/// `InvalidData` on a bad magic, a checksum mismatch, truncation, or a stored
/// tensor with no same-named, same-shaped counterpart in the net.
pub fn deserialize_params(net: &mut Net, buf: &[u8]) -> Result<()> {
    if buf.len() < HEADER_LEN + 4 {
        return Err(NetError::invalid_data("parameter file too short"));
    }
    if buf[..DCNN_MAGIC_V1.len()] != DCNN_MAGIC_V1 {
        return Err(NetError::invalid_data("invalid magic header"));
    }

    let (body, stored) = buf.split_at(buf.len() - 4);
    let mut hasher = Hasher::new();
    hasher.update(body);
    if u32::from_le_bytes(array(stored)?) != hasher.finalize() {
        return Err(NetError::invalid_data("file checksum mismatch"));
    }

    let mut cursor = Cursor {
        buf: body,
        idx: DCNN_MAGIC_V1.len(),
    };
    let count = u64::from_le_bytes(array(cursor.take(8)?)?);

    let mut staged = Vec::new();
    for _ in 0..count {
        let name_len = cursor.u32()? as usize;
        let name = core::str::from_utf8(cursor.take(name_len)?)
            .map_err(|_| NetError::invalid_data("tensor name is not UTF-8"))?;
        let shape = Shape::new(
            cursor.u32()? as usize,
            cursor.u32()? as usize,
            cursor.u32()? as usize,
            cursor.u32()? as usize,
        );

        let index = net
            .find_tensor(name)
            .ok_or_else(|| NetError::invalid_data(format!("net has no tensor `{name}`")))?;
        let expected = net.tensors[index].shape();
        if expected != shape {
            return Err(NetError::invalid_data(format!(
                "tensor `{name}` is {expected} in the net but {shape} in the file"
            )));
        }

        let bytes = cursor.take(shape.len() * size_of::<TensorFloat>())?;
        let data: Vec<TensorFloat> = bytes
            .chunks_exact(4)
            .map(|b| TensorFloat::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        staged.push((index, data));
    }

    if cursor.idx != body.len() {
        return Err(NetError::invalid_data("trailing bytes after last tensor"));
    }

    for (index, data) in staged {
        net.tensors[index].data_mut().copy_from_slice(&data);
    }
    log::info!("[io] loaded {count} parameter tensors");
    Ok(())
}

struct Cursor<'a> {
    buf: &'a [u8],
    idx: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .idx
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| NetError::invalid_data("parameter file truncated"))?;
        let out = &self.buf[self.idx..end];
        self.idx = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(array(self.take(4)?)?))
    }
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| NetError::invalid_data("parameter file truncated"))
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| NetError::invalid_data(format!("{what} {value} exceeds u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::nn::{Activation, DeconvParams, Filler, NetConfig};

    fn net(seed: u64) -> Net {
        let mut net = Net::new(NetConfig {
            backend: Backend::Cpu,
            seed,
            ..NetConfig::default()
        });
        net.set_input_shape(Shape::new(1, 2, 4, 4)).unwrap();
        net.add_deconvolutional_layer(
            DeconvParams::new(3, 3, 2, 1, Filler::Xavier, Activation::Relu),
            "input",
            "up",
        )
        .unwrap();
        net
    }

    #[test]
    fn deserialize_restores_values() {
        let src = net(1);
        let mut dst = net(2);
        assert_ne!(src.tensor_by_name("up_w"), dst.tensor_by_name("up_w"));

        let buf = serialize_params(&src).unwrap();
        deserialize_params(&mut dst, &buf).unwrap();
        assert_eq!(
            src.tensor_by_name("up_w").unwrap().data(),
            dst.tensor_by_name("up_w").unwrap().data()
        );
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let src = net(1);
        let mut buf = serialize_params(&src).unwrap();
        buf[HEADER_LEN + 6] ^= 0x40;

        let mut dst = net(2);
        let before = dst.tensor_by_name("up_w").unwrap().data().to_vec();
        assert!(matches!(
            deserialize_params(&mut dst, &buf),
            Err(NetError::InvalidData(_))
        ));
        assert_eq!(dst.tensor_by_name("up_w").unwrap().data(), before.as_slice());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let src = net(1);
        let buf = serialize_params(&src).unwrap();

        let mut other = Net::new(NetConfig::default());
        other.set_input_shape(Shape::new(1, 1, 4, 4)).unwrap();
        other
            .add_deconvolutional_layer(DeconvParams::new(3, 3, 2, 1, Filler::Zeros, Activation::Relu), "input", "up")
            .unwrap();
        assert!(matches!(
            deserialize_params(&mut other, &buf),
            Err(NetError::InvalidData(_))
        ));
    }
}
