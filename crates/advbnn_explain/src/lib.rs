//! # advbnn_explain
//!
//! Layer-wise relevance propagation (LRP) for deterministic and Bayesian
//! networks, and measures of how much attacks move the explanations.
//!
//! - [`compute_explanations`] produces one heatmap per image with an
//!   [`LrpRule`] and an [`ExplanationMode`]
//! - [`lrp_robustness`] compares clean and adversarial heatmaps through
//!   their most relevant pixels ([`select_informative_pixels`])
//! - [`vanishing_norm_idxs`] finds heatmaps that fade as more posterior
//!   samples are averaged
//! - [`cache`] stores heatmaps as `.npy`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
mod error;
mod explanations;
pub mod metrics;
mod propagation;
mod rules;

pub use cache::{heatmap_name, load_heatmaps, lrp_dir, save_heatmaps, HeatmapKind};
pub use error::{ExplainError, Result};
pub use explanations::{compute_explanations, EXPLAIN_BATCH_SIZE};
pub use metrics::{
    lrp_distances, lrp_robustness, normalize, select_informative_pixels, vanishing_norm_idxs,
    InformativePixels, LrpRobustness, Norm, RobustnessMethod, VanishingNorms,
};
pub use propagation::relevance;
pub use rules::{
    ExplanationMode, LrpRule, ALPHA_BETA_STABILIZER, EPSILON, GAMMA, GAMMA_STABILIZER,
};
