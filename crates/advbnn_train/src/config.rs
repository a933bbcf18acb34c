//! Training configuration.

use advbnn_models::{BaseSettings, FullBnnSettings, RedBnnSettings};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Configuration shared by every training procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Number of epochs.
    pub n_epochs: usize,
    /// Adam learning rate.
    pub lr: f64,
    /// Posterior samples used when validating Bayesian networks.
    pub valid_samples: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_epochs: 5,
            lr: 1e-3,
            valid_samples: 10,
        }
    }
}

impl TrainConfig {
    /// Create a configuration.
    #[must_use]
    pub fn new(n_epochs: usize, lr: f64) -> Self {
        Self {
            n_epochs,
            lr,
            ..Default::default()
        }
    }

    /// Epochs and learning rate of a registered deterministic network.
    #[must_use]
    pub fn from_base(settings: &BaseSettings) -> Self {
        Self::new(settings.epochs, settings.lr)
    }

    /// Epochs and learning rate of a registered fully Bayesian network.
    #[must_use]
    pub fn from_full(settings: &FullBnnSettings) -> Self {
        Self::new(settings.epochs, settings.lr)
    }

    /// Epochs and learning rate of the last-layer fit of a redBNN.
    #[must_use]
    pub fn from_red(settings: &RedBnnSettings) -> Self {
        Self::new(settings.epochs, settings.lr)
    }

    /// Set the number of validation samples.
    #[must_use]
    pub fn with_valid_samples(mut self, valid_samples: usize) -> Self {
        self.valid_samples = valid_samples;
        self
    }

    /// Check the learning rate.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::InvalidLearningRate`] unless `lr` is finite and
    /// positive.
    pub fn validate(&self) -> Result<()> {
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(TrainError::InvalidLearningRate(self.lr));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advbnn_models::{base_settings, red_bnn_settings};

    #[test]
    fn test_from_settings() {
        let config = TrainConfig::from_base(&base_settings(1).unwrap());
        assert_eq!(config.n_epochs, 10);
        assert_eq!(config.lr, 0.001);

        let config = TrainConfig::from_red(&red_bnn_settings(2).unwrap());
        assert_eq!(config.n_epochs, 3);
        assert_eq!(config.lr, 0.01);
    }

    #[test]
    fn test_validate_lr() {
        assert!(TrainConfig::new(1, 0.01).validate().is_ok());
        assert!(matches!(
            TrainConfig::new(1, 0.0).validate(),
            Err(TrainError::InvalidLearningRate(_))
        ));
        assert!(TrainConfig::new(1, f64::NAN).validate().is_err());
    }
}
