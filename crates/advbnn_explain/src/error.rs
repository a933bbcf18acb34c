//! Error types for explanations.

use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing or comparing explanations.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Unknown LRP rule name.
    #[error("Unknown LRP rule: {0}")]
    UnknownRule(String),

    /// Unknown explanation mode name.
    #[error("Unknown explanation mode: {0}")]
    UnknownMode(String),

    /// Unknown norm name.
    #[error("Wrong norm name: {0}")]
    UnknownNorm(String),

    /// Recognised but unsupported method.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Arrays of the wrong rank or mismatched shapes.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Relevance could not be propagated through a layer.
    #[error("Propagation error: {0}")]
    Propagation(String),

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
