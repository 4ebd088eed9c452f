use super::{DataIterator, ImageCodec, Label, Sample};
use crate::error::{NetError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Iterates over a list file of `path label...` lines, decoding each image
/// through a codec when its sample is requested.
#[derive(Debug)]
pub struct ListIterator<C> {
    entries: Vec<(PathBuf, Vec<f32>)>,
    label_width: usize,
    codec: C,
    cursor: usize,
}

impl<C: ImageCodec> ListIterator<C> {
    /// Reads the list file at `path`.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidData` as in
    /// [`ListIterator::from_reader`].
    pub fn open(path: impl AsRef<Path>, codec: C) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?), codec)
    }

    /// Parses list lines from `list`. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// `InvalidData` if a label is not a number or lines disagree on the
    /// number of labels.
    pub fn from_reader(list: impl BufRead, codec: C) -> Result<Self> {
        let mut entries = Vec::new();
        let mut label_width = None;
        for (n, line) in list.lines().enumerate() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            let Some(path) = tokens.next() else { continue };
            let labels = tokens
                .map(|tok| {
                    tok.parse::<f32>().map_err(|e| {
                        NetError::invalid_data(format!("line {}: bad label `{tok}`: {e}", n + 1))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let width = *label_width.get_or_insert(labels.len());
            if labels.len() != width {
                return Err(NetError::invalid_data(format!(
                    "line {}: {} labels, previous lines have {width}",
                    n + 1,
                    labels.len()
                )));
            }
            entries.push((PathBuf::from(path), labels));
        }

        log::info!("[List] samples= {} label_width= {}", entries.len(), label_width.unwrap_or(0));
        Ok(Self {
            entries,
            label_width: label_width.unwrap_or(0),
            codec,
            cursor: 0,
        })
    }

    /// Labels per line.
    #[must_use]
    pub const fn label_width(&self) -> usize {
        self.label_width
    }
}

impl<C: ImageCodec> DataIterator for ListIterator<C> {
    fn next_sample(&mut self) -> Result<Sample> {
        if self.entries.is_empty() {
            return Err(NetError::invalid_data("list holds no sample"));
        }
        if self.cursor == self.entries.len() {
            self.cursor = 0;
        }
        let (path, labels) = &self.entries[self.cursor];
        let image = self.codec.decode(path)?;
        let label = Label::Float(labels.clone());
        self.cursor += 1;
        Ok(Sample { image, label })
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Image, RawCodec};

    #[test]
    fn samples_follow_list_order_and_wrap() {
        let dir = std::env::temp_dir().join("deconvnet-list");
        std::fs::create_dir_all(&dir).unwrap();
        let mut list = String::new();
        for i in 0..2u8 {
            let path = dir.join(format!("{i}.raw"));
            let img = Image::new(vec![i; 4], 2, 2, 1).unwrap();
            std::fs::write(&path, RawCodec.encode(&img).unwrap()).unwrap();
            list.push_str(&format!("{} {i} 1.5\n", path.display()));
        }

        let mut it = ListIterator::from_reader(list.as_bytes(), RawCodec).unwrap();
        assert_eq!((it.len(), it.label_width()), (2, 2));
        let a = it.next_sample().unwrap();
        assert_eq!(a.label, Label::Float(vec![0.0, 1.5]));
        assert_eq!(it.next_sample().unwrap().image.pixels, vec![1; 4]);
        assert_eq!(it.next_sample().unwrap(), a);
    }

    #[test]
    fn ragged_labels_are_rejected() {
        let err = ListIterator::from_reader("a.raw 1 2\nb.raw 3\n".as_bytes(), RawCodec).unwrap_err();
        assert!(matches!(err, NetError::InvalidData(_)));
    }
}
