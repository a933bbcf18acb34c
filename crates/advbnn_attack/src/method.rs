//! Attack methods and their hyperparameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AttackError, Result};

/// Gradient-sign attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackMethod {
    /// Fast gradient sign method, a single step of size ε.
    Fgsm,
    /// Projected gradient descent in the L∞ ball of radius ε.
    Pgd,
}

impl AttackMethod {
    /// Name used on the command line and in file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            AttackMethod::Fgsm => "fgsm",
            AttackMethod::Pgd => "pgd",
        }
    }
}

impl FromStr for AttackMethod {
    type Err = AttackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fgsm" => Ok(AttackMethod::Fgsm),
            "pgd" => Ok(AttackMethod::Pgd),
            other => Err(AttackError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for AttackMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// PGD step size when none is configured.
pub const DEFAULT_PGD_STEP: f32 = 2.0 / 225.0;

/// Step size of one PGD iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepSize {
    /// A fixed step.
    Fixed(f32),
    /// `2 / max(x)` over the attacked batch.
    InverseMax,
}

impl Default for StepSize {
    fn default() -> Self {
        StepSize::Fixed(DEFAULT_PGD_STEP)
    }
}

/// Attack hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Radius of the L∞ ball.
    pub epsilon: f32,
    /// PGD step size.
    pub step: StepSize,
    /// PGD iterations.
    pub iters: usize,
    /// Images attacked per batch.
    pub batch_size: usize,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.25,
            step: StepSize::default(),
            iters: 40,
            batch_size: 128,
        }
    }
}

impl AttackConfig {
    /// Set ε.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the PGD step size.
    #[must_use]
    pub fn with_step(mut self, step: StepSize) -> Self {
        self.step = step;
        self
    }

    /// Set the number of PGD iterations.
    #[must_use]
    pub fn with_iters(mut self, iters: usize) -> Self {
        self.iters = iters;
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Check the hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns [`AttackError::InvalidInput`] for a negative ε or a zero
    /// batch size.
    pub fn validate(&self) -> Result<()> {
        if self.epsilon.is_nan() || self.epsilon < 0.0 {
            return Err(AttackError::InvalidInput(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        if self.batch_size == 0 {
            return Err(AttackError::InvalidInput("batch size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_methods() {
        assert_eq!("fgsm".parse::<AttackMethod>().unwrap(), AttackMethod::Fgsm);
        assert_eq!("pgd".parse::<AttackMethod>().unwrap(), AttackMethod::Pgd);
        assert!(matches!(
            "deepfool".parse::<AttackMethod>(),
            Err(AttackError::UnknownMethod(_))
        ));
        assert_eq!(AttackMethod::Pgd.to_string(), "pgd");
    }

    #[test]
    fn test_defaults() {
        let config = AttackConfig::default();
        assert_eq!(config.epsilon, 0.25);
        assert_eq!(config.iters, 40);
        assert_eq!(config.step, StepSize::Fixed(2.0 / 225.0));
        assert!(config.validate().is_ok());
        assert!(config.clone().with_epsilon(-0.1).validate().is_err());
        assert!(config.with_batch_size(0).validate().is_err());
    }
}
