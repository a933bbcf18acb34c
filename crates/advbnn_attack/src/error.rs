//! Error types for attacks.

use thiserror::Error;

/// Result type alias using [`AttackError`].
pub type Result<T> = std::result::Result<T, AttackError>;

/// Errors raised while producing or evaluating attacks.
#[derive(Error, Debug)]
pub enum AttackError {
    /// Unknown attack method name.
    #[error("Unknown attack method: {0}")]
    UnknownMethod(String),

    /// Inputs, labels and attacks disagree.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The loss did not reach the input.
    #[error("No gradient with respect to the input")]
    MissingGradient,

    /// Model error.
    #[error("Model error: {0}")]
    ModelError(#[from] advbnn_models::ModelError),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] advbnn_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] advbnn_core::CoreError),
}
