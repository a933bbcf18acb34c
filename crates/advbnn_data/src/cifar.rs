//! CIFAR-10 binary batch reader.
//!
//! Each record is one label byte followed by 3072 pixel bytes in
//! channel-major order (1024 red, 1024 green, 1024 blue).

use std::fs;
use std::path::Path;

use ndarray::Array4;
use tracing::info;

use crate::dataset::ImageDataset;
use crate::error::{DataError, Result};

const SIDE: usize = 32;
const CHANNELS: usize = 3;
const RECORD_LEN: usize = 1 + CHANNELS * SIDE * SIDE;

const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_BATCH: &str = "test_batch.bin";

/// Load CIFAR-10 from `{root}/cifar/` (or `{root}/cifar/cifar-10-batches-bin/`).
pub(crate) fn load(root: &Path) -> Result<(ImageDataset, ImageDataset)> {
    let mut dir = root.join("cifar");
    let nested = dir.join("cifar-10-batches-bin");
    if nested.exists() {
        dir = nested;
    }

    let mut train_bytes = Vec::new();
    for batch in TRAIN_BATCHES {
        let path = dir.join(batch);
        if !path.exists() {
            return Err(DataError::MissingFile(path.display().to_string()));
        }
        train_bytes.extend(fs::read(&path)?);
    }
    let test_path = dir.join(TEST_BATCH);
    if !test_path.exists() {
        return Err(DataError::MissingFile(test_path.display().to_string()));
    }
    let test_bytes = fs::read(&test_path)?;

    let train = parse_records(&train_bytes)?;
    let test = parse_records(&test_bytes)?;
    info!(n_train = train.len(), n_test = test.len(), "Loaded CIFAR-10");
    Ok((train, test))
}

/// Parse concatenated CIFAR-10 records.
pub(crate) fn parse_records(bytes: &[u8]) -> Result<ImageDataset> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(DataError::FormatError(format!(
            "CIFAR batch length {} is not a multiple of {RECORD_LEN}",
            bytes.len()
        )));
    }
    let n = bytes.len() / RECORD_LEN;
    let mut classes = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n * (RECORD_LEN - 1));
    for record in bytes.chunks_exact(RECORD_LEN) {
        classes.push(usize::from(record[0]));
        values.extend(record[1..].iter().map(|&p| f32::from(p) / 255.0));
    }
    let images = Array4::from_shape_vec((n, CHANNELS, SIDE, SIDE), values)
        .map_err(|e| DataError::InvalidShape(e.to_string()))?;
    ImageDataset::from_classes(images, &classes, 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let mut bytes = vec![0u8; RECORD_LEN * 2];
        bytes[0] = 7;
        bytes[RECORD_LEN] = 2;
        // first green pixel of the second image
        bytes[RECORD_LEN + 1 + SIDE * SIDE] = 255;

        let ds = parse_records(&bytes).unwrap();
        assert_eq!(ds.classes(), vec![7, 2]);
        assert_eq!(ds.images().shape(), &[2, 3, 32, 32]);
        assert_eq!(ds.images()[[1, 1, 0, 0]], 1.0);
        assert_eq!(ds.images()[[1, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_truncated_batch() {
        assert!(parse_records(&[0u8; 10]).is_err());
    }
}
