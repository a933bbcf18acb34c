//! # advbnn_plot
//!
//! PNG figures for attack and explanation experiments, drawn with
//! `plotters`.
//!
//! - [`plot_grid_attacks`]: originals above their adversarial versions
//! - [`plot_explanations`], [`plot_attacks_explanations`] and
//!   [`plot_vanishing_explanations`]: images beside LRP heatmaps on a
//!   red/blue colormap centred on zero relevance
//! - [`lrp_robustness_distributions`] and [`lrp_robustness_scatterplot`]
//!
//! Set [`PlotStyle::captions`] to `false` to render without text on
//! machines without system fonts.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod attacks;
pub mod colormap;
mod error;
mod grid;
mod heatmaps;
mod robustness;

pub use attacks::plot_grid_attacks;
pub use error::{PlotError, Result};
pub use grid::{random_idxs, PlotStyle};
pub use heatmaps::{
    plot_attacks_explanations, plot_explanations, plot_vanishing_explanations, AttackExplanations,
    MAX_COLUMNS,
};
pub use robustness::{
    histogram_counts, lrp_robustness_distributions, lrp_robustness_scatterplot, RobustnessSeries,
    N_BINS,
};
