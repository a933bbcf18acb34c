//! # advbnn_data
//!
//! Image datasets and loaders for the advbnn experiments.
//!
//! This crate provides:
//! - [`ImageDataset`] and [`DatasetSplits`] for `(N, C, H, W)` images with one-hot labels
//! - [`load_dataset`] for `mnist`, `fashion_mnist`, `cifar` and `synthetic`
//! - [`balanced_subset`] for class-balanced test subsets
//! - [`ImageLoader`] for batched iteration with seeded shuffling
//! - `.npy` persistence in [`save_array`] / [`load_array`]
//!
//! ## Example
//!
//! ```rust
//! use advbnn_data::{load_dataset, LoadOptions};
//!
//! let splits = load_dataset("synthetic", &LoadOptions::default().with_n_inputs(50)).unwrap();
//! assert_eq!(splits.n_classes, 10);
//! assert_eq!(splits.test.len(), 50);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod cifar;
mod dataset;
mod error;
mod idx;
mod io;
mod loader;
mod registry;
mod sampler;
pub mod synthetic;

pub use dataset::{DatasetSplits, ImageDataset};
pub use error::{DataError, Result};
pub use io::{load_array, load_array4, save_array};
pub use loader::{ImageBatch, ImageLoader, ImageLoaderBuilder};
pub use registry::{load_dataset, LoadOptions, DATASETS};
pub use sampler::balanced_subset;
pub use synthetic::SyntheticConfig;

/// Cache directory for downloaded datasets.
pub const CACHE_DIR: &str = ".cache/advbnn";

/// Get the default cache directory path.
#[must_use]
pub fn cache_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR)
}
