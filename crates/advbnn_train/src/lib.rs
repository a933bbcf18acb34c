//! # advbnn_train
//!
//! Training of the advbnn networks.
//!
//! - [`train_base`] - Adam on cross-entropy for deterministic networks
//! - [`train_full_svi`] / [`train_red_svi`] - SVI with one reparameterised
//!   sample per step
//! - [`fit_laplace`] - MAP fit and diagonal Laplace posterior of a redBNN
//!   last layer
//! - [`train_network`] - dispatch on [`advbnn_models::Network`]
//! - [`evaluate_accuracy`] - top-1 accuracy of any network
//!
//! All of them run on an autodiff backend through [`Trainer`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod evaluation;
mod laplace;
mod svi;
mod training;

pub use config::TrainConfig;
pub use error::{Result, TrainError};
pub use evaluation::evaluate_accuracy;
pub use laplace::fit_laplace;
pub use svi::{train_full_svi, train_network, train_red_svi};
pub use training::{train_base, Objective, Trainer, TrainingOutput};
