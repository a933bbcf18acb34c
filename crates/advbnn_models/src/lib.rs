//! # advbnn_models
//!
//! Deterministic and Bayesian image classifiers.
//!
//! ## Networks
//! - [`BaseNet`] - deterministic network (baseNN)
//! - [`FullBnn`] - Gaussian posterior over every weight (fullBNN)
//! - [`RedBnn`] - deterministic features with a Bayesian last layer (redBNN)
//! - [`Network`] - any of the above, chosen at run time
//!
//! All of them implement [`LayeredNet`]: the architecture is a plain list of
//! [`LayerSpec`]s and each posterior draw materialises explicit
//! [`LayerWeights`], so attacks and explanations run the same functional
//! forward pass for every family.
//!
//! ## Settings
//! Networks are registered by index in [`base_settings`],
//! [`full_bnn_settings`] and [`red_bnn_settings`]; names and save
//! directories derive from the settings.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod architecture;
mod base;
pub mod bayesian;
pub mod checkpoint;
mod error;
pub mod forward;
mod network;
mod params;
pub mod settings;
mod traits;

pub use architecture::{Activation, ArchKind, Architecture, LayerSpec};
pub use base::BaseNet;
pub use bayesian::{FullBnn, GaussianLayer, GaussianPosterior, RedBnn, RHO_INIT};
pub use checkpoint::CheckpointMetadata;
pub use error::{ModelError, Result};
pub use forward::{Features, LayerWeight, LayerWeights};
pub use network::Network;
pub use params::NetParams;
pub use settings::{
    base_settings, full_bnn_settings, red_bnn_settings, save_dir, BaseSettings, FullBnnSettings,
    Inference, ModelType, RedBnnSettings,
};
pub use traits::{predictive, LayeredNet};
