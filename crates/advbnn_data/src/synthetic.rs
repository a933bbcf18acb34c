//! Deterministic synthetic image classification data.
//!
//! Each class lights up its own patch of a single-channel image on top of
//! low-amplitude noise, so small networks separate the classes within a few
//! epochs. Used for debug runs and tests.

use advbnn_core::Seed;
use ndarray::Array4;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::dataset::ImageDataset;
use crate::error::{DataError, Result};

/// Configuration of the synthetic dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Number of training images.
    pub n_train: usize,
    /// Number of test images.
    pub n_test: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Channels.
    pub channels: usize,
    /// Image side length.
    pub side: usize,
    /// Standard deviation of the background noise.
    pub noise_std: f32,
    /// Random seed.
    pub seed: Seed,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_train: 2000,
            n_test: 500,
            n_classes: 10,
            channels: 1,
            side: 28,
            noise_std: 0.1,
            seed: Seed::new(0),
        }
    }
}

impl SyntheticConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the split sizes.
    #[must_use]
    pub fn with_sizes(mut self, n_train: usize, n_test: usize) -> Self {
        self.n_train = n_train;
        self.n_test = n_test;
        self
    }

    /// Set the number of classes.
    #[must_use]
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Set the image side length.
    #[must_use]
    pub fn with_side(mut self, side: usize) -> Self {
        self.side = side;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Generate `(train, test)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is too small to hold one patch per class.
    pub fn generate(&self) -> Result<(ImageDataset, ImageDataset)> {
        let grid = grid_size(self.n_classes);
        if self.n_classes == 0 || self.side < 2 * grid {
            return Err(DataError::InvalidInput(format!(
                "cannot place {} class patches on a {}x{} image",
                self.n_classes, self.side, self.side
            )));
        }
        let train = self.generate_split(self.n_train, self.seed.derive("train"))?;
        let test = self.generate_split(self.n_test, self.seed.derive("test"))?;
        Ok((train, test))
    }

    fn generate_split(&self, n: usize, seed: Seed) -> Result<ImageDataset> {
        let mut rng = seed.to_rng();
        let noise = Normal::new(0.0f32, self.noise_std.max(0.0))
            .map_err(|e| DataError::InvalidInput(e.to_string()))?;
        let grid = grid_size(self.n_classes);
        let cell = self.side / grid;

        let classes: Vec<usize> = (0..n).map(|_| rng.gen_range(0..self.n_classes)).collect();
        let mut images = Array4::<f32>::zeros((n, self.channels, self.side, self.side));
        for (i, &class) in classes.iter().enumerate() {
            let (row, col) = (class / grid, class % grid);
            for c in 0..self.channels {
                for h in 0..self.side {
                    for w in 0..self.side {
                        let in_patch = h / cell == row && w / cell == col;
                        let base = if in_patch { 0.8 } else { 0.1 };
                        images[[i, c, h, w]] = (base + noise.sample(&mut rng)).clamp(0.0, 1.0);
                    }
                }
            }
        }
        ImageDataset::from_classes(images, &classes, self.n_classes)
    }
}

fn grid_size(n_classes: usize) -> usize {
    let mut g = 1;
    while g * g < n_classes {
        g += 1;
    }
    g
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        let config = SyntheticConfig::new().with_sizes(20, 10).with_seed(Seed::new(3));
        let (a, _) = config.generate().unwrap();
        let (b, _) = config.generate().unwrap();
        assert_eq!(a.images(), b.images());
        assert_eq!(a.classes(), b.classes());
    }

    #[test]
    fn test_values_in_unit_range() {
        let (train, test) = SyntheticConfig::new().with_sizes(10, 5).generate().unwrap();
        assert_eq!(train.images().shape(), &[10, 1, 28, 28]);
        assert_eq!(test.len(), 5);
        assert!(train.images().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_class_patch_is_bright() {
        let config = SyntheticConfig {
            noise_std: 0.0,
            ..SyntheticConfig::new().with_sizes(30, 1)
        };
        let (train, _) = config.generate().unwrap();
        let cell = 28 / 4;
        for (i, class) in train.classes().into_iter().enumerate() {
            let (row, col) = (class / 4, class % 4);
            assert_eq!(train.images()[[i, 0, row * cell, col * cell]], 0.8);
        }
    }

    #[test]
    fn test_too_small_image() {
        let config = SyntheticConfig::new().with_side(4).with_n_classes(10);
        assert!(config.generate().is_err());
    }
}
