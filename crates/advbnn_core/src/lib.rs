//! # advbnn_core
//!
//! Core types shared by every advbnn crate.
//!
//! This crate provides:
//! - [`Seed`] for deterministic random number generation
//! - [`ImageShape`] for `(C, H, W)` image metadata
//! - [`SampleSpec`] and [`WeightDraw`] to select posterior samples
//! - Tensor/array conversion helpers in [`tensor`]
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image batches follow the convention `(N, C, H, W)`:
//! - `N`: Batch size (number of images)
//! - `C`: Channels
//! - `H`, `W`: Height and width in pixels
//!
//! ## Example
//!
//! ```rust
//! use advbnn_core::{ImageShape, SampleSpec, Seed};
//!
//! let seed = Seed::new(42);
//! let shape = ImageShape::new(1, 28, 28);
//! assert_eq!(shape.n_pixels(), 784);
//!
//! let spec = SampleSpec::samples(10);
//! assert_eq!(spec.draws().unwrap().len(), 10);
//! # let _ = seed;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod sampling;
mod seed;
mod shape;
mod split;
pub mod tensor;

pub use error::{CoreError, Result};
pub use sampling::{SampleSpec, WeightDraw};
pub use seed::Seed;
pub use shape::ImageShape;
pub use split::Split;

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::{NdArray, NdArrayDevice};

    pub use burn_autodiff::Autodiff;

    /// CPU backend with automatic differentiation, used wherever input
    /// gradients or parameter updates are needed.
    #[cfg(feature = "backend-ndarray")]
    pub type AutodiffCpu = Autodiff<NdArray>;
}
