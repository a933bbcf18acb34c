//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(f64),

    /// Training set is empty.
    #[error("Cannot train on an empty dataset")]
    EmptyDataset,

    /// The network family does not support the requested inference.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] advbnn_data::DataError),

    /// Model error.
    #[error("Model error: {0}")]
    ModelError(#[from] advbnn_models::ModelError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] advbnn_core::CoreError),
}
