//! Selection of posterior weight draws.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Which weights a network uses for one forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightDraw {
    /// Deterministic weights, or the posterior mean of a Bayesian network.
    Mean,
    /// The posterior sample with the given index.
    Sample(usize),
}

impl WeightDraw {
    /// Index of the posterior sample, if any.
    #[must_use]
    pub const fn sample_idx(&self) -> Option<usize> {
        match self {
            WeightDraw::Mean => None,
            WeightDraw::Sample(idx) => Some(*idx),
        }
    }
}

/// How predictions, attacks and explanations combine posterior draws.
///
/// # Example
///
/// ```rust
/// use advbnn_core::{SampleSpec, WeightDraw};
///
/// let spec = SampleSpec::samples(3).with_idxs(vec![4, 5, 6]);
/// assert_eq!(spec.draws().unwrap()[0], WeightDraw::Sample(4));
///
/// let bad = SampleSpec::samples(3).with_idxs(vec![1]);
/// assert!(bad.draws().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SampleSpec {
    /// A single pass with deterministic weights.
    #[default]
    Deterministic,
    /// Average over `n_samples` posterior draws.
    Samples {
        /// Number of draws.
        n_samples: usize,
        /// Explicit draw indices; `0..n_samples` when absent.
        sample_idxs: Option<Vec<usize>>,
    },
    /// A single pass with the posterior-mean weights.
    PosteriorMean,
}

impl SampleSpec {
    /// Average over draws `0..n_samples`.
    #[must_use]
    pub const fn samples(n_samples: usize) -> Self {
        SampleSpec::Samples {
            n_samples,
            sample_idxs: None,
        }
    }

    /// Use explicit draw indices. Has no effect on non-sampling specs.
    #[must_use]
    pub fn with_idxs(self, idxs: Vec<usize>) -> Self {
        match self {
            SampleSpec::Samples { n_samples, .. } => SampleSpec::Samples {
                n_samples,
                sample_idxs: Some(idxs),
            },
            other => other,
        }
    }

    /// Whether this spec averages several posterior draws.
    #[must_use]
    pub const fn is_sampled(&self) -> bool {
        matches!(self, SampleSpec::Samples { .. })
    }

    /// Number of draws, if sampled.
    #[must_use]
    pub const fn n_samples(&self) -> Option<usize> {
        match self {
            SampleSpec::Samples { n_samples, .. } => Some(*n_samples),
            _ => None,
        }
    }

    /// Expand into the list of weight draws to evaluate.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ZeroSamples`] for `n_samples == 0` and
    /// [`CoreError::SampleCountMismatch`] when explicit indices do not
    /// match `n_samples`.
    pub fn draws(&self) -> Result<Vec<WeightDraw>> {
        match self {
            SampleSpec::Deterministic | SampleSpec::PosteriorMean => Ok(vec![WeightDraw::Mean]),
            SampleSpec::Samples {
                n_samples,
                sample_idxs,
            } => {
                if *n_samples == 0 {
                    return Err(CoreError::ZeroSamples);
                }
                match sample_idxs {
                    Some(idxs) if idxs.len() != *n_samples => {
                        Err(CoreError::SampleCountMismatch {
                            expected: *n_samples,
                            got: idxs.len(),
                        })
                    }
                    Some(idxs) => Ok(idxs.iter().map(|&i| WeightDraw::Sample(i)).collect()),
                    None => Ok((0..*n_samples).map(WeightDraw::Sample).collect()),
                }
            }
        }
    }

    /// Short label used in cache and plot file names.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            SampleSpec::Deterministic => "det".to_string(),
            SampleSpec::Samples { n_samples, .. } => format!("bay_samp={n_samples}"),
            SampleSpec::PosteriorMean => "mode".to_string(),
        }
    }
}

impl std::fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}
