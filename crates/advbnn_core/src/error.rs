//! Error types for advbnn_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in advbnn_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor or array shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// The explicit posterior sample indices do not match the sample count.
    #[error("Number of sample_idxs should match number of samples: expected {expected}, got {got}")]
    SampleCountMismatch {
        /// Requested number of samples.
        expected: usize,
        /// Number of sample indices provided.
        got: usize,
    },

    /// A sample count of zero was requested.
    #[error("Number of posterior samples must be positive")]
    ZeroSamples,

    /// Tensor data could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
