//! Dataset registry.

use std::path::PathBuf;

use advbnn_core::Seed;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{DatasetSplits, ImageDataset};
use crate::error::{DataError, Result};
use crate::synthetic::SyntheticConfig;
use crate::{cifar, idx};

/// Names accepted by [`load_dataset`].
pub const DATASETS: [&str; 4] = ["mnist", "fashion_mnist", "cifar", "synthetic"];

/// Options controlling how a dataset is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Root directory holding one sub-directory per dataset.
    pub root: PathBuf,
    /// Keep only the first `n` train and test images.
    pub n_inputs: Option<usize>,
    /// Shuffle both splits before truncation.
    pub shuffle: bool,
    /// Seed for shuffling.
    pub seed: Seed,
    /// Fraction of train carved off (from the tail) as validation.
    pub val_fraction: f32,
    /// Download missing IDX archives.
    pub download: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            root: crate::cache_dir(),
            n_inputs: None,
            shuffle: false,
            seed: Seed::new(0),
            val_fraction: 0.1,
            download: false,
        }
    }
}

impl LoadOptions {
    /// Set the data root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Keep only the first `n` images of each split.
    #[must_use]
    pub fn with_n_inputs(mut self, n: usize) -> Self {
        self.n_inputs = Some(n);
        self
    }

    /// Shuffle with the given seed before truncation.
    #[must_use]
    pub fn with_shuffle(mut self, seed: Seed) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Set the validation fraction.
    #[must_use]
    pub fn with_val_fraction(mut self, fraction: f32) -> Self {
        self.val_fraction = fraction;
        self
    }

    /// Enable downloading missing archives.
    #[must_use]
    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }
}

/// Load a registered dataset.
///
/// # Errors
///
/// Returns [`DataError::UnknownDataset`] for names not in [`DATASETS`], and
/// I/O or format errors from the readers.
pub fn load_dataset(name: &str, options: &LoadOptions) -> Result<DatasetSplits> {
    let (train, test) = match name {
        "mnist" | "fashion_mnist" => idx::load(name, &options.root, options.download)?,
        "cifar" => cifar::load(&options.root)?,
        "synthetic" => SyntheticConfig::new()
            .with_seed(options.seed.derive("synthetic"))
            .generate()?,
        other => return Err(DataError::UnknownDataset(other.to_string())),
    };

    let (train, test) = if options.shuffle {
        (
            shuffled(&train, options.seed.derive("train"))?,
            shuffled(&test, options.seed.derive("test"))?,
        )
    } else {
        (train, test)
    };

    let (train, test) = match options.n_inputs {
        Some(n) => (train.take(n), test.take(n)),
        None => (train, test),
    };

    let (train, val) = train.split_tail(options.val_fraction)?;
    let input_shape = train.image_shape();
    let n_classes = train.n_classes();

    info!(
        dataset = name,
        train = train.len(),
        val = val.len(),
        test = test.len(),
        "Dataset ready"
    );
    debug!(shape = %input_shape, n_classes, "Input shape");

    Ok(DatasetSplits {
        name: name.to_string(),
        train,
        val,
        test,
        input_shape,
        n_classes,
    })
}

fn shuffled(dataset: &ImageDataset, seed: Seed) -> Result<ImageDataset> {
    let mut indices: Vec<usize> = (0..dataset.len()).collect();
    indices.shuffle(&mut seed.to_rng());
    dataset.subset(&indices)
}
