//! # advbnn
//!
//! Adversarial robustness of deterministic and Bayesian image classifiers.
//!
//! advbnn trains deterministic networks (baseNN), fully Bayesian networks
//! (fullBNN, SVI) and last-layer Bayesian networks (redBNN, SVI or
//! Laplace), attacks them with FGSM and PGD, and measures how much the
//! attacks move their layer-wise relevance propagation (LRP) heatmaps:
//!
//! - **Data**: MNIST, Fashion-MNIST, CIFAR-10 and a synthetic dataset,
//!   class-balanced subsets, `.npy` persistence
//! - **Models**: registered settings, one functional forward pass shared by
//!   every family, posterior sampling by index
//! - **Training**: Adam, SVI and diagonal Laplace
//! - **Attacks**: gradient-sign attacks averaged over posterior draws,
//!   accuracy and softmax robustness under attack
//! - **Explanations**: epsilon, gamma and alpha-beta LRP rules, LRP
//!   robustness, vanishing heatmaps
//! - **Plots**: attack grids, heatmaps and robustness distributions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use advbnn::prelude::*;
//! use burn_autodiff::Autodiff;
//! use burn_ndarray::NdArray;
//!
//! type B = Autodiff<NdArray>;
//! let device = Default::default();
//!
//! let data = load_dataset("synthetic", &LoadOptions::default())?;
//! let train = ImageLoader::builder(data.train.clone()).batch_size(128).build()?;
//! let net = BaseNet::<B>::new(base_settings(2)?, data.input_shape, data.n_classes, &device)?;
//! let settings = net.settings().clone();
//! let net = train_base(net, &train, None, &TrainConfig::from_base(&settings), &device)?.model;
//!
//! let (subset, _) = balanced_subset(&data.test, data.n_classes, 100, Seed::new(0))?;
//! let spec = SampleSpec::Deterministic;
//! let attacks = attack(&net, subset.images(), &subset.classes(), AttackMethod::Fgsm, &spec, &AttackConfig::default(), &device)?;
//! let heatmaps = compute_explanations(&attacks, &net, LrpRule::Epsilon, ExplanationMode::Deterministic, -1, &device)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use advbnn_attack as attack;
pub use advbnn_core as core;
pub use advbnn_data as data;
pub use advbnn_explain as explain;
pub use advbnn_models as models;
pub use advbnn_plot as plot;
pub use advbnn_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use advbnn::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use advbnn_core::{ImageShape, SampleSpec, Seed, Split, WeightDraw};

    // Data
    pub use advbnn_data::{
        balanced_subset, load_dataset, DatasetSplits, ImageDataset, ImageLoader, LoadOptions,
    };

    // Models
    pub use advbnn_models::{
        base_settings, full_bnn_settings, red_bnn_settings, save_dir, BaseNet, FullBnn,
        LayeredNet, ModelType, Network, RedBnn,
    };

    // Training
    pub use advbnn_train::{evaluate_accuracy, train_base, train_network, TrainConfig};

    // Attacks
    pub use advbnn_attack::{
        attack, evaluate_attack, AttackConfig, AttackEvaluation, AttackMethod,
    };

    // Explanations
    pub use advbnn_explain::{
        compute_explanations, lrp_robustness, ExplanationMode, LrpRule, RobustnessMethod,
    };

    // Plots
    pub use advbnn_plot::PlotStyle;
}

/// Everything exported by the workspace crates.
pub mod all {
    pub use super::prelude::*;

    pub use advbnn_attack::{fgsm, load_attack, pgd, save_attack, softmax_robustness};
    pub use advbnn_core::backend;
    pub use advbnn_core::tensor;
    pub use advbnn_explain::{
        load_heatmaps, save_heatmaps, vanishing_norm_idxs, HeatmapKind, Norm,
    };
    pub use advbnn_models::{Architecture, LayerSpec, LayerWeight};
    pub use advbnn_plot::{
        lrp_robustness_distributions, lrp_robustness_scatterplot, plot_attacks_explanations,
        plot_explanations, plot_grid_attacks, plot_vanishing_explanations, AttackExplanations,
        RobustnessSeries,
    };
    pub use advbnn_train::{fit_laplace, train_full_svi, train_red_svi};
}
