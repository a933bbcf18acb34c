//! Error types for advbnn_models.

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building, running or persisting networks.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Unknown architecture name.
    #[error("Wrong architecture name: {0}")]
    InvalidArchitecture(String),

    /// Unknown activation name.
    #[error("Wrong activation name: {0}")]
    InvalidActivation(String),

    /// Hidden size is not a power of two of at least 16.
    #[error("Hidden size should be a power of 2 greater than 16, got {0}")]
    InvalidHiddenSize(usize),

    /// Unknown model type name.
    #[error("Wrong model type: {0}")]
    UnknownModelType(String),

    /// Unknown inference method name.
    #[error("Wrong inference method: {0}")]
    UnknownInference(String),

    /// Combination that is recognised but not supported.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Layer index outside `[-n_layers, n_layers]`.
    #[error("Max number of available layers is {n_layers}, got index {idx}")]
    LayerIndex {
        /// Requested index.
        idx: i64,
        /// Number of layers in the network.
        n_layers: usize,
    },

    /// No settings registered for a model index.
    #[error("No {model} settings registered for model_idx={idx}")]
    UnknownSettings {
        /// Model type name.
        model: String,
        /// Requested index.
        idx: usize,
    },

    /// Weights do not fit the layer they are applied to.
    #[error("Layer mismatch: {0}")]
    LayerMismatch(String),

    /// Checkpoint could not be written or read.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] advbnn_core::CoreError),
}
