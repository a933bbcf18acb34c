//! IDX file support for MNIST and Fashion-MNIST.
//!
//! Files are looked up under `{root}/{name}/` either raw or gzipped, and
//! downloaded on demand.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use ndarray::Array4;
use tracing::info;

use crate::dataset::ImageDataset;
use crate::error::{DataError, Result};

const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;
const IDX_LABELS_MAGIC: u32 = 0x0000_0801;

const MNIST_URL: &str = "https://ossci-datasets.s3.amazonaws.com/mnist";
const FASHION_MNIST_URL: &str = "http://fashion-mnist.s3-website.eu-central-1.amazonaws.com";

/// File stems of the four IDX archives: train images/labels, test images/labels.
const FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// Load the train and test splits of an IDX dataset.
pub(crate) fn load(name: &str, root: &Path, download: bool) -> Result<(ImageDataset, ImageDataset)> {
    let dir = root.join(name);
    let mut paths = Vec::with_capacity(FILES.len());
    for stem in FILES {
        paths.push(locate(name, &dir, stem, download)?);
    }

    let train_images = read_images(&read_bytes(&paths[0])?)?;
    let train_labels = read_labels(&read_bytes(&paths[1])?)?;
    let test_images = read_images(&read_bytes(&paths[2])?)?;
    let test_labels = read_labels(&read_bytes(&paths[3])?)?;

    info!(
        dataset = name,
        n_train = train_labels.len(),
        n_test = test_labels.len(),
        "Loaded IDX dataset"
    );

    Ok((
        ImageDataset::from_classes(train_images, &train_labels, 10)?,
        ImageDataset::from_classes(test_images, &test_labels, 10)?,
    ))
}

fn locate(name: &str, dir: &Path, stem: &str, download: bool) -> Result<PathBuf> {
    let raw = dir.join(stem);
    if raw.exists() {
        return Ok(raw);
    }
    let gz = dir.join(format!("{stem}.gz"));
    if gz.exists() {
        return Ok(gz);
    }
    if !download {
        return Err(DataError::MissingFile(gz.display().to_string()));
    }

    let base = if name == "fashion_mnist" {
        FASHION_MNIST_URL
    } else {
        MNIST_URL
    };
    fs::create_dir_all(dir)?;
    download_file(&format!("{base}/{stem}.gz"), &gz)?;
    Ok(gz)
}

/// Download a file from URL to path.
fn download_file(url: &str, path: &Path) -> Result<()> {
    info!(url, "Downloading");
    let response = ureq::get(url)
        .call()
        .map_err(|e| DataError::Download(format!("Failed to download {url}: {e}")))?;

    if response.status() != 200 {
        return Err(DataError::Download(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let mut buffer = Vec::new();
    response.into_reader().read_to_end(&mut buffer)?;
    File::create(path)?.write_all(&buffer)?;
    Ok(())
}

/// Read a whole file, transparently decompressing `.gz`.
fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(file).read_to_end(&mut buffer)?;
    } else {
        std::io::BufReader::new(file).read_to_end(&mut buffer)?;
    }
    Ok(buffer)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DataError::FormatError("truncated IDX header".to_string()))
}

/// Parse an IDX image file into `(N, 1, H, W)` values in `[0, 1]`.
pub(crate) fn read_images(bytes: &[u8]) -> Result<Array4<f32>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IDX_IMAGES_MAGIC {
        return Err(DataError::FormatError(format!(
            "bad IDX image magic {magic:#010x}"
        )));
    }
    let n = read_u32(bytes, 4)? as usize;
    let h = read_u32(bytes, 8)? as usize;
    let w = read_u32(bytes, 12)? as usize;
    let body = bytes
        .get(16..16 + n * h * w)
        .ok_or_else(|| DataError::FormatError("truncated IDX image data".to_string()))?;

    let values: Vec<f32> = body.iter().map(|&p| f32::from(p) / 255.0).collect();
    Array4::from_shape_vec((n, 1, h, w), values)
        .map_err(|e| DataError::InvalidShape(e.to_string()))
}

/// Parse an IDX label file.
pub(crate) fn read_labels(bytes: &[u8]) -> Result<Vec<usize>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IDX_LABELS_MAGIC {
        return Err(DataError::FormatError(format!(
            "bad IDX label magic {magic:#010x}"
        )));
    }
    let n = read_u32(bytes, 4)? as usize;
    let body = bytes
        .get(8..8 + n)
        .ok_or_else(|| DataError::FormatError("truncated IDX label data".to_string()))?;
    Ok(body.iter().map(|&l| usize::from(l)).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn image_file(n: u32, h: u32, w: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        for v in [IDX_IMAGES_MAGIC, n, h, w] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend((0..n * h * w).map(|i| (i % 256) as u8));
        bytes
    }

    pub(crate) fn label_file(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&IDX_LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn test_read_images_scales_pixels() {
        let images = read_images(&image_file(2, 2, 3)).unwrap();
        assert_eq!(images.shape(), &[2, 1, 2, 3]);
        assert_eq!(images[[0, 0, 0, 0]], 0.0);
        assert!((images[[1, 0, 1, 2]] - 11.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_read_labels() {
        assert_eq!(read_labels(&label_file(&[3, 1, 4])).unwrap(), vec![3, 1, 4]);
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let labels = label_file(&[1]);
        assert!(read_images(&labels).is_err());
        let mut images = image_file(2, 2, 2);
        images.truncate(20);
        assert!(read_images(&images).is_err());
    }

    #[test]
    fn test_load_from_gzipped_directory() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("mnist");
        fs::create_dir_all(&dir).unwrap();

        let contents = [
            image_file(4, 28, 28),
            label_file(&[0, 1, 2, 3]),
            image_file(2, 28, 28),
            label_file(&[5, 6]),
        ];
        for (stem, bytes) in FILES.iter().zip(contents.iter()) {
            let file = File::create(dir.join(format!("{stem}.gz"))).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(bytes).unwrap();
            encoder.finish().unwrap();
        }

        let (train, test) = load("mnist", root.path(), false).unwrap();
        assert_eq!(train.len(), 4);
        assert_eq!(test.classes(), vec![5, 6]);
        assert_eq!(train.n_classes(), 10);
    }

    #[test]
    fn test_missing_files_without_download() {
        let root = tempfile::tempdir().unwrap();
        let err = load("mnist", root.path(), false).unwrap_err();
        assert!(matches!(err, DataError::MissingFile(_)));
    }
}
