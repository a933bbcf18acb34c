//! Error types for plotting.

use thiserror::Error;

/// Result type alias using [`PlotError`].
pub type Result<T> = std::result::Result<T, PlotError>;

/// Errors raised while rendering plots.
#[derive(Error, Debug)]
pub enum PlotError {
    /// Arrays that should line up don't.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Nothing to plot.
    #[error("Not enough examples: {0}")]
    NotEnoughExamples(String),

    /// The drawing backend failed.
    #[error("Drawing error: {0}")]
    Drawing(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlotError {
    pub(crate) fn drawing<E: std::fmt::Display>(err: E) -> Self {
        PlotError::Drawing(err.to_string())
    }
}
