use super::{DataIterator, Image, Label, Sample, read_record};
use crate::error::{NetError, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Magic number of an MNIST image file.
pub const MNIST_IMAGE_MAGIC: u32 = 2051;
/// Magic number of an MNIST label file.
pub const MNIST_LABEL_MAGIC: u32 = 2049;

const IMAGE_HEADER_LEN: u64 = 16;
const LABEL_HEADER_LEN: u64 = 8;

/// Iterates over an MNIST image file and its label file in lockstep.
///
/// Both headers are validated when the iterator is created. Samples are
/// read with an explicit cursor; after the last one both streams seek back
/// to their first record.
#[derive(Debug)]
pub struct MnistIterator<R = BufReader<File>> {
    images: R,
    labels: R,
    count: usize,
    rows: usize,
    cols: usize,
    cursor: usize,
}

impl MnistIterator {
    /// Opens an image file and a label file.
    ///
    /// # Errors
    ///
    /// `Io` if either file cannot be opened, `InvalidData` if the headers are
    /// malformed or disagree on the sample count.
    pub fn open(images: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<Self> {
        Self::from_readers(
            BufReader::new(File::open(images)?),
            BufReader::new(File::open(labels)?),
        )
    }
}

impl<R: Read + Seek> MnistIterator<R> {
    /// Wraps already opened image and label streams positioned at their start.
    ///
    /// # Errors
    ///
    /// Same as [`MnistIterator::open`].
    pub fn from_readers(mut images: R, mut labels: R) -> Result<Self> {
        let [magic, count, rows, cols] = read_header::<4>(&mut images)?;
        if magic != MNIST_IMAGE_MAGIC {
            return Err(NetError::invalid_data(format!(
                "MNIST image file has magic {magic}, expected {MNIST_IMAGE_MAGIC}"
            )));
        }
        let [label_magic, label_count] = read_header::<2>(&mut labels)?;
        if label_magic != MNIST_LABEL_MAGIC {
            return Err(NetError::invalid_data(format!(
                "MNIST label file has magic {label_magic}, expected {MNIST_LABEL_MAGIC}"
            )));
        }
        if count != label_count {
            return Err(NetError::invalid_data(format!(
                "inconsistent MNIST data: {count} images but {label_count} labels"
            )));
        }

        log::info!("[Mnist] samples= {count} image= {cols}x{rows}");
        Ok(Self {
            images,
            labels,
            count: count as usize,
            rows: rows as usize,
            cols: cols as usize,
            cursor: 0,
        })
    }

    /// Image height.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Image width.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }
}

impl<R: Read + Seek> DataIterator for MnistIterator<R> {
    fn next_sample(&mut self) -> Result<Sample> {
        if self.count == 0 {
            return Err(NetError::invalid_data("MNIST data holds no sample"));
        }
        if self.cursor == self.count {
            self.rewind()?;
        }

        let mut label = [0u8];
        self.labels.read_exact(&mut label)?;
        let len = self.rows.checked_mul(self.cols).ok_or_else(|| {
            NetError::invalid_data(format!("MNIST image {}x{} is too large", self.cols, self.rows))
        })?;
        let pixels = read_record(&mut self.images, len, "MNIST image")?;
        self.cursor += 1;

        Ok(Sample {
            image: Image {
                pixels,
                width: self.cols,
                height: self.rows,
                channels: 1,
            },
            label: Label::Int(vec![i32::from(label[0])]),
        })
    }

    fn rewind(&mut self) -> Result<()> {
        self.images.seek(SeekFrom::Start(IMAGE_HEADER_LEN))?;
        self.labels.seek(SeekFrom::Start(LABEL_HEADER_LEN))?;
        self.cursor = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }
}

fn read_header<const N: usize>(r: &mut impl Read) -> Result<[u32; N]> {
    let mut out = [0u32; N];
    for field in &mut out {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf)
            .map_err(|e| NetError::invalid_data(format!("truncated MNIST header: {e}")))?;
        *field = u32::from_be_bytes(buf);
    }
    Ok(out)
}
