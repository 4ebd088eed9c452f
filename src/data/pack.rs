//! Packed datasets: every sample of a list file in one binary stream.
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────────────────┐
//! │ Header               │ Sample N .. N+1 .. N+2 ..               │
//! ├──────────────────────┼─────────────────────────────────────────┤
//! │ i32: count           │ i32: payload size                       │
//! │ i32: label width     │ [u8] encoded image                      │
//! │ i32: label kind      │ labels (see `LabelKind`)                │
//! └──────────────────────┴─────────────────────────────────────────┘
//! ```
//!
//! Every integer and float is big-endian.

use super::{DataIterator, ImageCodec, Label, Sample, read_record};
use crate::error::{NetError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const HEADER_LEN: u64 = 12;

/// How the labels of each sample are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LabelKind {
    /// `label_width` big-endian `i32` values.
    Int = 0,
    /// `label_width` big-endian `f32` values.
    Float = 1,
    /// One encoded image, `[i32 size][payload]`.
    Image = 2,
}

impl TryFrom<i32> for LabelKind {
    type Error = NetError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Int),
            1 => Ok(Self::Float),
            2 => Ok(Self::Image),
            other => Err(NetError::invalid_data(format!("unknown label kind {other}"))),
        }
    }
}

/// Packs the samples listed in the file at `list` into `out`.
///
/// # Errors
///
/// See [`write_pack`]; file failures are `Io`.
pub fn pack_list<C: ImageCodec + ?Sized>(
    list: impl AsRef<Path>,
    label_width: usize,
    kind: LabelKind,
    codec: &C,
    out: impl AsRef<Path>,
) -> Result<usize> {
    let list = BufReader::new(File::open(list)?);
    let mut out = BufWriter::new(File::create(out)?);
    let n = write_pack(list, label_width, kind, codec, &mut out)?;
    out.flush()?;
    Ok(n)
}

/// Reads `path label...` lines from `list` and writes the packed dataset to
/// `out`. Image kinds expect exactly one label path per line. Returns the
/// number of samples written.
///
/// # Errors
///
/// `InvalidData` if a line does not carry `label_width` labels or a label
/// cannot be parsed, plus whatever the codec reports.
pub fn write_pack<C: ImageCodec + ?Sized, W: Write>(
    list: impl BufRead,
    label_width: usize,
    kind: LabelKind,
    codec: &C,
    out: &mut W,
) -> Result<usize> {
    let lines = list
        .lines()
        .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
        .collect::<std::io::Result<Vec<_>>>()?;

    write_i32(out, lines.len())?;
    write_i32(out, label_width)?;
    out.write_all(&(kind as i32).to_be_bytes())?;

    for (n, line) in lines.iter().enumerate() {
        let mut tokens = line.split_whitespace();
        let Some(path) = tokens.next() else { continue };
        let labels: Vec<&str> = tokens.collect();
        let expected = if kind == LabelKind::Image { 1 } else { label_width };
        if labels.len() != expected {
            return Err(NetError::invalid_data(format!(
                "line {}: {} labels, expected {expected}",
                n + 1,
                labels.len()
            )));
        }

        write_image(out, codec, Path::new(path))?;
        match kind {
            LabelKind::Int => {
                for tok in labels {
                    let v: i32 = tok.parse().map_err(|e| bad_label(n, tok, e))?;
                    out.write_all(&v.to_be_bytes())?;
                }
            }
            LabelKind::Float => {
                for tok in labels {
                    let v: f32 = tok.parse().map_err(|e| bad_label(n, tok, e))?;
                    out.write_all(&v.to_be_bytes())?;
                }
            }
            LabelKind::Image => write_image(out, codec, Path::new(labels[0]))?,
        }
    }

    log::info!("[Pack] samples= {} label_width= {label_width} kind= {kind:?}", lines.len());
    Ok(lines.len())
}

fn write_image<C: ImageCodec + ?Sized, W: Write>(out: &mut W, codec: &C, path: &Path) -> Result<()> {
    let image = codec.decode(path)?;
    let payload = codec.encode(&image)?;
    write_i32(out, payload.len())?;
    out.write_all(&payload)?;
    Ok(())
}

fn write_i32<W: Write>(out: &mut W, value: usize) -> Result<()> {
    let value = i32::try_from(value)
        .map_err(|_| NetError::invalid_data(format!("{value} does not fit a packed i32")))?;
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

fn bad_label(line: usize, tok: &str, e: impl core::fmt::Display) -> NetError {
    NetError::invalid_data(format!("line {}: bad label `{tok}`: {e}", line + 1))
}

/// Iterates over the samples of a packed dataset.
#[derive(Debug)]
pub struct PackIterator<C, R = BufReader<File>> {
    reader: R,
    codec: C,
    count: usize,
    label_width: usize,
    kind: LabelKind,
    cursor: usize,
}

impl<C: ImageCodec> PackIterator<C> {
    /// Opens a packed dataset file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be opened, `InvalidData` on a malformed header.
    pub fn open(path: impl AsRef<Path>, codec: C) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?), codec)
    }
}

impl<C: ImageCodec, R: Read + Seek> PackIterator<C, R> {
    /// Wraps a stream positioned at the start of a packed dataset.
    ///
    /// # Errors
    ///
    /// `InvalidData` on a malformed header.
    pub fn from_reader(mut reader: R, codec: C) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut header)
            .map_err(|e| NetError::invalid_data(format!("truncated pack header: {e}")))?;
        let field = |i: usize| {
            i32::from_be_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]])
        };
        let count = non_negative(field(0), "sample count")?;
        let label_width = non_negative(field(4), "label width")?;
        let kind = LabelKind::try_from(field(8))?;

        Ok(Self {
            reader,
            codec,
            count,
            label_width,
            kind,
            cursor: 0,
        })
    }

    /// Label values per sample, as written in the header.
    #[must_use]
    pub const fn label_width(&self) -> usize {
        self.label_width
    }

    /// How labels are stored.
    #[must_use]
    pub const fn label_kind(&self) -> LabelKind {
        self.kind
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_payload(&mut self) -> Result<Vec<u8>> {
        let size = non_negative(self.read_i32()?, "payload size")?;
        read_record(&mut self.reader, size, "pack payload")
    }
}

impl<C: ImageCodec, R: Read + Seek> DataIterator for PackIterator<C, R> {
    fn next_sample(&mut self) -> Result<Sample> {
        if self.count == 0 {
            return Err(NetError::invalid_data("packed dataset holds no sample"));
        }
        if self.cursor == self.count {
            self.rewind()?;
        }

        let payload = self.read_payload()?;
        let image = self.codec.decode_memory(&payload)?;
        let kind = self.kind;
        let label = match kind {
            LabelKind::Int => Label::Int(
                (0..self.label_width)
                    .map(|_| self.read_i32())
                    .collect::<Result<_>>()?,
            ),
            LabelKind::Float => Label::Float(
                (0..self.label_width)
                    .map(|_| self.read_i32().map(|bits| f32::from_bits(bits as u32)))
                    .collect::<Result<_>>()?,
            ),
            LabelKind::Image => {
                let payload = self.read_payload()?;
                Label::Image(self.codec.decode_memory(&payload)?)
            }
        };
        self.cursor += 1;
        Ok(Sample { image, label })
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(HEADER_LEN))?;
        self.cursor = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }
}

fn non_negative(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| NetError::invalid_data(format!("negative {what}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Image, RawCodec};
    use std::io::Cursor;

    fn write_images(dir: &Path, count: u8) -> Vec<String> {
        std::fs::create_dir_all(dir).unwrap();
        (0..count)
            .map(|i| {
                let img = Image::new(vec![i; 6], 3, 2, 1).unwrap();
                let path = dir.join(format!("img{i}.raw"));
                std::fs::write(&path, RawCodec.encode(&img).unwrap()).unwrap();
                path.display().to_string()
            })
            .collect()
    }

    #[test]
    fn float_labels_survive_packing() {
        let dir = std::env::temp_dir().join("deconvnet-pack-float");
        let paths = write_images(&dir, 2);
        let list = format!("{} 0.5 -1\n\n{} 2 3.25\n", paths[0], paths[1]);

        let mut buf = Vec::new();
        let n = write_pack(list.as_bytes(), 2, LabelKind::Float, &RawCodec, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..12], &[0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 1]);

        let mut it = PackIterator::from_reader(Cursor::new(buf), RawCodec).unwrap();
        assert_eq!(it.len(), 2);
        let a = it.next_sample().unwrap();
        assert_eq!(a.image.pixels, vec![0; 6]);
        assert_eq!(a.label, Label::Float(vec![0.5, -1.0]));
        let b = it.next_sample().unwrap();
        assert_eq!(b.label, Label::Float(vec![2.0, 3.25]));
        assert_eq!(it.next_sample().unwrap(), a);
    }

    #[test]
    fn image_labels_are_packed_as_payloads() {
        let dir = std::env::temp_dir().join("deconvnet-pack-image");
        let paths = write_images(&dir, 2);
        let list = format!("{} {}\n", paths[0], paths[1]);

        let mut buf = Vec::new();
        write_pack(list.as_bytes(), 1, LabelKind::Image, &RawCodec, &mut buf).unwrap();
        let mut it = PackIterator::from_reader(Cursor::new(buf), RawCodec).unwrap();
        let sample = it.next_sample().unwrap();
        assert_eq!(sample.label, Label::Image(Image::new(vec![1; 6], 3, 2, 1).unwrap()));
    }

    #[test]
    fn label_count_mismatch_is_invalid_data() {
        let dir = std::env::temp_dir().join("deconvnet-pack-mismatch");
        let paths = write_images(&dir, 1);
        let list = format!("{} 1 2 3\n", paths[0]);

        let mut buf = Vec::new();
        let err = write_pack(list.as_bytes(), 2, LabelKind::Int, &RawCodec, &mut buf).unwrap_err();
        assert!(matches!(err, NetError::InvalidData(_)));
    }

    #[test]
    fn oversized_payload_is_invalid_data() {
        let mut buf = vec![0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        buf.extend_from_slice(&i32::MAX.to_be_bytes());
        buf.extend_from_slice(&[1, 2, 3]);
        let mut it = PackIterator::from_reader(Cursor::new(buf), RawCodec).unwrap();
        assert!(matches!(it.next_sample(), Err(NetError::InvalidData(_))));
    }

    #[test]
    fn unknown_label_kind_is_rejected() {
        let header = [0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 7];
        assert!(matches!(
            PackIterator::from_reader(Cursor::new(header.to_vec()), RawCodec),
            Err(NetError::InvalidData(_))
        ));
    }
}
