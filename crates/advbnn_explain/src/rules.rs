//! LRP rules and explanation modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Stabiliser of the epsilon rule.
pub const EPSILON: f32 = 0.1;
/// Weight of the positive part in the gamma rule.
pub const GAMMA: f32 = 0.1;
/// Stabiliser of the gamma rule.
pub const GAMMA_STABILIZER: f32 = 1e-9;
/// Added to exactly-zero denominators of the alpha-beta rules.
pub const ALPHA_BETA_STABILIZER: f32 = 1e-6;

/// Rule redistributing relevance through learnable layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LrpRule {
    /// `R_i = Σ_j x_i w_ij / (z_j + ε sign(z_j)) R_j`.
    Epsilon,
    /// Epsilon rule on `w + γ w⁺`.
    Gamma,
    /// Positive contributions only.
    Alpha1Beta0,
    /// `2 · positive - 1 · negative` contributions.
    Alpha2Beta1,
}

impl LrpRule {
    /// Every supported rule.
    pub const ALL: [LrpRule; 4] = [
        LrpRule::Epsilon,
        LrpRule::Gamma,
        LrpRule::Alpha1Beta0,
        LrpRule::Alpha2Beta1,
    ];

    /// Rule name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            LrpRule::Epsilon => "epsilon",
            LrpRule::Gamma => "gamma",
            LrpRule::Alpha1Beta0 => "alpha1beta0",
            LrpRule::Alpha2Beta1 => "alpha2beta1",
        }
    }

    /// `(α, β)` of the alpha-beta rules.
    #[must_use]
    pub const fn alpha_beta(&self) -> Option<(f32, f32)> {
        match self {
            LrpRule::Alpha1Beta0 => Some((1.0, 0.0)),
            LrpRule::Alpha2Beta1 => Some((2.0, 1.0)),
            _ => None,
        }
    }
}

impl FromStr for LrpRule {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        LrpRule::ALL
            .into_iter()
            .find(|rule| rule.name() == s)
            .ok_or_else(|| ExplainError::UnknownRule(s.to_string()))
    }
}

impl fmt::Display for LrpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How explanations of a Bayesian network combine posterior draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExplanationMode {
    /// Deterministic weights.
    Deterministic,
    /// The posterior-mean network.
    PosteriorMean,
    /// The class of the mean prediction over `n` draws, heatmaps averaged.
    AvgPrediction(usize),
    /// Each of `n` draws explains its own prediction, heatmaps averaged.
    AvgHeatmap(usize),
}

impl ExplanationMode {
    /// Parse `avg_prediction` / `avg_heatmap` with a sample count.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::UnknownMode`] for other names.
    pub fn sampled(name: &str, n_samples: usize) -> Result<Self> {
        match name {
            "avg_prediction" => Ok(ExplanationMode::AvgPrediction(n_samples)),
            "avg_heatmap" => Ok(ExplanationMode::AvgHeatmap(n_samples)),
            other => Err(ExplainError::UnknownMode(other.to_string())),
        }
    }

    /// Number of posterior draws, if sampled.
    #[must_use]
    pub const fn n_samples(&self) -> Option<usize> {
        match self {
            ExplanationMode::AvgPrediction(n) | ExplanationMode::AvgHeatmap(n) => Some(*n),
            _ => None,
        }
    }
}
