//! Image dataset types.

use advbnn_core::tensor::labels_from_one_hot;
use advbnn_core::ImageShape;
use ndarray::{Array2, Array4, Axis};

use crate::error::{DataError, Result};

/// A dataset of images with one-hot labels.
///
/// Stores images in the `(N, C, H, W)` format with values in `[0, 1]`, and
/// labels as `(N, K)` one-hot rows.
///
/// # Example
///
/// ```rust
/// use advbnn_data::ImageDataset;
/// use ndarray::{Array2, Array4};
///
/// let images = Array4::<f32>::zeros((4, 1, 28, 28));
/// let dataset = ImageDataset::from_classes(images, &[0, 1, 2, 1], 3).unwrap();
/// assert_eq!(dataset.len(), 4);
/// assert_eq!(dataset.classes(), vec![0, 1, 2, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct ImageDataset {
    images: Array4<f32>,
    labels: Array2<f32>,
}

impl ImageDataset {
    /// Create a new dataset from images and one-hot labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch dimensions don't match.
    pub fn new(images: Array4<f32>, labels: Array2<f32>) -> Result<Self> {
        if images.shape()[0] != labels.shape()[0] {
            return Err(DataError::InvalidShape(format!(
                "images have {} samples but labels have {}",
                images.shape()[0],
                labels.shape()[0]
            )));
        }
        Ok(Self { images, labels })
    }

    /// Create a dataset from class indices, one-hot encoding them.
    ///
    /// # Errors
    ///
    /// Returns an error if a class is out of range or counts don't match.
    pub fn from_classes(images: Array4<f32>, classes: &[usize], n_classes: usize) -> Result<Self> {
        let mut labels = Array2::<f32>::zeros((classes.len(), n_classes));
        for (row, &class) in classes.iter().enumerate() {
            if class >= n_classes {
                return Err(DataError::IndexOutOfBounds {
                    index: class,
                    length: n_classes,
                });
            }
            labels[[row, class]] = 1.0;
        }
        Self::new(images, labels)
    }

    /// Number of images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    /// Check if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.labels.shape()[1]
    }

    /// Shape of one image.
    #[must_use]
    pub fn image_shape(&self) -> ImageShape {
        let s = self.images.shape();
        ImageShape::new(s[1], s[2], s[3])
    }

    /// Images `(N, C, H, W)`.
    #[must_use]
    pub fn images(&self) -> &Array4<f32> {
        &self.images
    }

    /// One-hot labels `(N, K)`.
    #[must_use]
    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// Class index of every image.
    #[must_use]
    pub fn classes(&self) -> Vec<usize> {
        labels_from_one_hot(&self.labels)
    }

    /// Consume the dataset, returning images and labels.
    #[must_use]
    pub fn into_parts(self) -> (Array4<f32>, Array2<f32>) {
        (self.images, self.labels)
    }

    /// Get a subset of images by indices.
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of bounds.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }
        Ok(Self {
            images: self.images.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        })
    }

    /// Keep the first `n` images (all of them if `n` exceeds the length).
    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        let n = n.min(self.len());
        let indices: Vec<usize> = (0..n).collect();
        Self {
            images: self.images.select(Axis(0), &indices),
            labels: self.labels.select(Axis(0), &indices),
        }
    }

    /// Split off the last `fraction` of the images.
    ///
    /// Returns `(head, tail)`.
    ///
    /// # Errors
    ///
    /// Returns an error if `fraction` is outside `[0, 1)`.
    pub fn split_tail(&self, fraction: f32) -> Result<(Self, Self)> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(DataError::InvalidInput(format!(
                "split fraction must be in [0, 1), got {fraction}"
            )));
        }
        let n_tail = (self.len() as f32 * fraction).round() as usize;
        let n_head = self.len() - n_tail;
        let head: Vec<usize> = (0..n_head).collect();
        let tail: Vec<usize> = (n_head..self.len()).collect();
        Ok((self.subset(&head)?, self.subset(&tail)?))
    }
}

/// Train, validation and test splits of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    /// Registered dataset name.
    pub name: String,
    /// Training images.
    pub train: ImageDataset,
    /// Validation images, carved from the tail of the training set.
    pub val: ImageDataset,
    /// Test images.
    pub test: ImageDataset,
    /// Shape of one image.
    pub input_shape: ImageShape,
    /// Number of classes.
    pub n_classes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_dataset(n: usize) -> ImageDataset {
        let images = Array4::from_shape_fn((n, 1, 2, 2), |(i, _, _, _)| i as f32);
        let classes: Vec<usize> = (0..n).map(|i| i % 3).collect();
        ImageDataset::from_classes(images, &classes, 3).unwrap()
    }

    #[test]
    fn test_mismatched_lengths() {
        let images = Array4::<f32>::zeros((3, 1, 2, 2));
        let labels = Array2::<f32>::zeros((2, 3));
        assert!(ImageDataset::new(images, labels).is_err());
    }

    #[test]
    fn test_class_out_of_range() {
        let images = Array4::<f32>::zeros((1, 1, 2, 2));
        assert!(ImageDataset::from_classes(images, &[5], 3).is_err());
    }

    #[test]
    fn test_subset_and_take() {
        let ds = make_dataset(6);
        let sub = ds.subset(&[4, 1]).unwrap();
        assert_eq!(sub.classes(), vec![1, 1]);
        assert_eq!(sub.images()[[0, 0, 0, 0]], 4.0);
        assert!(ds.subset(&[6]).is_err());
        assert_eq!(ds.take(100).len(), 6);
        assert_eq!(ds.take(2).len(), 2);
    }

    #[test]
    fn test_split_tail() {
        let ds = make_dataset(10);
        let (head, tail) = ds.split_tail(0.2).unwrap();
        assert_eq!(head.len(), 8);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.images()[[0, 0, 0, 0]], 8.0);
        assert!(ds.split_tail(1.0).is_err());
    }
}
