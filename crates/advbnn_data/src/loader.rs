//! Batched iteration over image datasets.

use advbnn_core::tensor::array4_to_tensor;
use advbnn_core::{Seed, Split};
use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::Axis;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::dataset::ImageDataset;
use crate::error::{DataError, Result};

/// A batch of images and class labels on a backend device.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Images `(N, C, H, W)`.
    pub images: Tensor<B, 4>,
    /// Class indices `(N,)`.
    pub labels: Tensor<B, 1, Int>,
}

/// A loader producing [`ImageBatch`]es from an [`ImageDataset`].
///
/// # Example
///
/// ```rust
/// use advbnn_data::{ImageDataset, ImageLoader};
/// use advbnn_core::Seed;
/// use ndarray::Array4;
///
/// let dataset = ImageDataset::from_classes(Array4::zeros((10, 1, 4, 4)), &[0; 10], 2).unwrap();
/// let loader = ImageLoader::builder(dataset)
///     .batch_size(4)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()
///     .unwrap();
/// assert_eq!(loader.n_batches(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ImageLoader {
    dataset: ImageDataset,
    classes: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    seed: Option<Seed>,
    split: Split,
}

impl ImageLoader {
    /// Create a new loader builder.
    #[must_use]
    pub fn builder(dataset: ImageDataset) -> ImageLoaderBuilder {
        ImageLoaderBuilder::new(dataset)
    }

    /// Get the dataset.
    #[must_use]
    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the number of batches.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Get the total number of images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Get the data split.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Iterate over batches for one epoch.
    ///
    /// With shuffling enabled, epoch `e` uses a seed derived from the
    /// loader seed and `e`, so every epoch has its own fixed order.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device, epoch: usize) -> ImageLoaderIter<'_, B> {
        ImageLoaderIter::new(self, device.clone(), epoch)
    }
}

/// Builder for [`ImageLoader`].
#[derive(Debug, Clone)]
pub struct ImageLoaderBuilder {
    dataset: ImageDataset,
    batch_size: usize,
    shuffle: bool,
    seed: Option<Seed>,
    split: Split,
}

impl ImageLoaderBuilder {
    /// Create a new builder with batch size 128.
    #[must_use]
    pub fn new(dataset: ImageDataset) -> Self {
        Self {
            dataset,
            batch_size: 128,
            shuffle: false,
            seed: None,
            split: Split::Train,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the data split.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Build the loader.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or an empty dataset.
    pub fn build(self) -> Result<ImageLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        Ok(ImageLoader {
            classes: self.dataset.classes(),
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            seed: self.seed,
            split: self.split,
        })
    }
}

/// Iterator over the batches of an [`ImageLoader`].
pub struct ImageLoaderIter<'a, B: Backend> {
    loader: &'a ImageLoader,
    device: B::Device,
    indices: Vec<usize>,
    position: usize,
}

impl<'a, B: Backend> ImageLoaderIter<'a, B> {
    fn new(loader: &'a ImageLoader, device: B::Device, epoch: usize) -> Self {
        let mut indices: Vec<usize> = (0..loader.dataset.len()).collect();
        if loader.shuffle {
            let mut rng = match loader.seed {
                Some(seed) => seed.derive(&format!("epoch-{epoch}")).to_rng(),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }
        Self {
            loader,
            device,
            indices,
            position: 0,
        }
    }
}

impl<'a, B: Backend> Iterator for ImageLoaderIter<'a, B> {
    type Item = ImageBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.indices.len() {
            return None;
        }
        let end = (self.position + self.loader.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.position..end];
        self.position = end;

        let dataset = &self.loader.dataset;
        let images = dataset.images().select(Axis(0), batch_indices);
        let labels: Vec<i64> = batch_indices
            .iter()
            .map(|&i| self.loader.classes[i] as i64)
            .collect();

        Some(ImageBatch {
            images: array4_to_tensor(&images, &self.device),
            labels: Tensor::from_data(TensorData::new(labels, [batch_indices.len()]), &self.device),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.indices.len() - self.position).div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

impl<'a, B: Backend> ExactSizeIterator for ImageLoaderIter<'a, B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use advbnn_core::tensor::int_tensor_to_vec;
    use burn_ndarray::NdArray;
    use ndarray::Array4;

    type TestBackend = NdArray;

    fn create_test_dataset(n: usize) -> ImageDataset {
        let images = Array4::from_shape_fn((n, 1, 2, 2), |(i, _, _, _)| i as f32);
        let classes: Vec<usize> = (0..n).map(|i| i % 4).collect();
        ImageDataset::from_classes(images, &classes, 4).unwrap()
    }

    #[test]
    fn test_loader_builder() {
        let loader = ImageLoader::builder(create_test_dataset(300)).build().unwrap();
        assert_eq!(loader.batch_size(), 128);
        assert_eq!(loader.n_batches(), 3);
        assert!(ImageLoader::builder(create_test_dataset(3))
            .batch_size(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_sequential_batches() {
        let device = Default::default();
        let loader = ImageLoader::builder(create_test_dataset(10))
            .batch_size(4)
            .build()
            .unwrap();
        let batches: Vec<ImageBatch<TestBackend>> = loader.iter(&device, 0).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].images.dims(), [2, 1, 2, 2]);
        let labels = int_tensor_to_vec(batches[0].labels.clone()).unwrap();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_seeded_shuffle_per_epoch() {
        let device = Default::default();
        let loader = ImageLoader::builder(create_test_dataset(64))
            .batch_size(64)
            .shuffle(true)
            .seed(Seed::new(1))
            .build()
            .unwrap();
        let order = |epoch| {
            let batch: ImageBatch<TestBackend> = loader.iter(&device, epoch).next().unwrap();
            int_tensor_to_vec(batch.labels).unwrap()
        };
        assert_eq!(order(0), order(0));
        assert_ne!(order(0), order(1));
    }
}
