//! Feeding nets: labelled samples from MNIST files, packed datasets, list
//! files and CSV lines.
//!
//! Image decoding and encoding are delegated to an [`ImageCodec`]; this
//! module only deals with the container formats around the pixels. Every
//! source is exposed as a [`DataIterator`] producing one [`Sample`] per call
//! and wrapping back to the first sample after the last one.

use crate::error::{NetError, Result};
use crate::nn::TensorFloat;
use std::io::Read;
use std::path::Path;

mod list;
pub use self::list::ListIterator;

mod mnist;
pub use self::mnist::{MNIST_IMAGE_MAGIC, MNIST_LABEL_MAGIC, MnistIterator};

mod pack;
pub use self::pack::{LabelKind, PackIterator, pack_list, write_pack};

/// An interleaved 8-bit image (`width * channels` bytes per row).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    /// Row-major, channel-interleaved pixels.
    pub pixels: Vec<u8>,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Channels per pixel.
    pub channels: usize,
}

impl Image {
    /// Wraps `pixels`, or `None` if their count does not match the extents.
    #[must_use]
    pub fn new(pixels: Vec<u8>, width: usize, height: usize, channels: usize) -> Option<Self> {
        (pixels.len() == width * height * channels).then_some(Self {
            pixels,
            width,
            height,
            channels,
        })
    }

    /// Pixels scaled to `[0, 1]`, reordered to planar `c x h x w` layout as
    /// expected by a net's input tensor.
    #[must_use]
    pub fn to_planar(&self) -> Vec<TensorFloat> {
        let plane = self.width * self.height;
        let mut out = vec![0.0; self.pixels.len()];
        for (i, px) in self.pixels.chunks_exact(self.channels.max(1)).enumerate() {
            for (k, &v) in px.iter().enumerate() {
                out[k * plane + i] = TensorFloat::from(v) / 255.0;
            }
        }
        out
    }
}

/// The target attached to a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// Class indices or other integer targets.
    Int(Vec<i32>),
    /// Regression targets.
    Float(Vec<TensorFloat>),
    /// Dense image target, e.g. for segmentation or upsampling.
    Image(Image),
}

impl Label {
    /// The label as float values; image labels are scaled like inputs.
    #[must_use]
    pub fn to_values(&self) -> Vec<TensorFloat> {
        match self {
            Self::Int(v) => v.iter().map(|&x| x as TensorFloat).collect(),
            Self::Float(v) => v.clone(),
            Self::Image(img) => img.to_planar(),
        }
    }
}

/// One input image with its label.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Input pixels.
    pub image: Image,
    /// Target.
    pub label: Label,
}

/// Decoder and encoder for an image file format.
pub trait ImageCodec {
    /// Reads and decodes the image stored at `path`.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidData` if it cannot be decoded.
    fn decode(&self, path: &Path) -> Result<Image>;

    /// Decodes an image held in memory.
    ///
    /// # Errors
    ///
    /// `InvalidData` if `bytes` cannot be decoded.
    fn decode_memory(&self, bytes: &[u8]) -> Result<Image>;

    /// Encodes `image` into the codec's file format.
    ///
    /// # Errors
    ///
    /// `InvalidData` if the image cannot be represented.
    fn encode(&self, image: &Image) -> Result<Vec<u8>>;
}

/// Uncompressed codec: `u32` width, height and channels (big-endian) followed
/// by the raw pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ImageCodec for RawCodec {
    fn decode(&self, path: &Path) -> Result<Image> {
        self.decode_memory(&std::fs::read(path)?)
    }

    fn decode_memory(&self, bytes: &[u8]) -> Result<Image> {
        let Some((header, pixels)) = bytes.split_first_chunk::<12>() else {
            return Err(NetError::invalid_data("raw image shorter than its header"));
        };
        let dim = |i: usize| {
            u32::from_be_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]) as usize
        };
        Image::new(pixels.to_vec(), dim(0), dim(4), dim(8))
            .ok_or_else(|| NetError::invalid_data("raw image size does not match its header"))
    }

    fn encode(&self, image: &Image) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(12 + image.pixels.len());
        for dim in [image.width, image.height, image.channels] {
            let dim = u32::try_from(dim)
                .map_err(|_| NetError::invalid_data(format!("image extent {dim} exceeds u32")))?;
            out.extend_from_slice(&dim.to_be_bytes());
        }
        out.extend_from_slice(&image.pixels);
        Ok(out)
    }
}

/// A finite, restartable source of samples.
pub trait DataIterator {
    /// Produces the next sample, wrapping to the first after the last.
    ///
    /// # Errors
    ///
    /// `Io` on read failures, `InvalidData` on malformed records.
    fn next_sample(&mut self) -> Result<Sample>;

    /// Restarts from the first sample.
    ///
    /// # Errors
    ///
    /// `Io` if the underlying stream cannot seek.
    fn rewind(&mut self) -> Result<()>;

    /// Number of samples in one pass.
    fn len(&self) -> usize;

    /// Whether the source holds no sample.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pulls `batch` samples and lays them out for [`Net::train_step`]: inputs
/// in planar layout one after the other, labels likewise.
///
/// [`Net::train_step`]: crate::nn::Net::train_step
///
/// # Errors
///
/// Whatever the iterator reports.
pub fn next_batch<I: DataIterator + ?Sized>(
    iter: &mut I,
    batch: usize,
) -> Result<(Vec<TensorFloat>, Vec<TensorFloat>)> {
    let mut inputs = Vec::new();
    let mut targets = Vec::new();
    for _ in 0..batch {
        let sample = iter.next_sample()?;
        inputs.extend(sample.image.to_planar());
        targets.extend(sample.label.to_values());
    }
    Ok((inputs, targets))
}

/// Parses one CSV line of `w * h * c` byte values into an image.
///
/// # Errors
///
/// `InvalidData` if the value count is wrong or a value is not a byte.
pub fn load_image_from_csv(line: &str, w: usize, h: usize, c: usize) -> Result<Image> {
    let pixels = line
        .trim()
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse::<u8>()
                .map_err(|e| NetError::invalid_data(format!("bad csv value `{tok}`: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let found = pixels.len();
    Image::new(pixels, w, h, c).ok_or_else(|| {
        NetError::invalid_data(format!(
            "incorrect data size in csv: {found} values for {w}x{h}x{c}"
        ))
    })
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
///
/// Sizes come from file headers, so the buffer grows with what the stream
/// actually yields and a short stream is `InvalidData`.
pub(crate) fn read_record(reader: &mut impl Read, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(NetError::invalid_data(format!(
            "truncated {what}: {} of {len} bytes",
            buf.len()
        )));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_line_must_match_image_size() {
        let img = load_image_from_csv("0, 255,128,1\n", 2, 2, 1).unwrap();
        assert_eq!(img.pixels, vec![0, 255, 128, 1]);

        assert!(matches!(
            load_image_from_csv("1,2,3", 2, 2, 1),
            Err(NetError::InvalidData(_))
        ));
        assert!(matches!(
            load_image_from_csv("1,2,300,4", 2, 2, 1),
            Err(NetError::InvalidData(_))
        ));
    }

    #[test]
    fn planar_layout_splits_channels() {
        let img = Image::new(vec![255, 0, 0, 255], 2, 1, 2).unwrap();
        let planar = img.to_planar();
        assert_eq!(planar, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn raw_codec_reads_back_what_it_writes() {
        let img = Image::new((0..12).collect(), 2, 2, 3).unwrap();
        let bytes = RawCodec.encode(&img).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(RawCodec.decode_memory(&bytes).unwrap(), img);
        assert!(RawCodec.decode_memory(&bytes[..20]).is_err());
    }
}
