//! Registered hyperparameters, model names and save directories.
//!
//! Every experiment refers to a network by `(model type, model_idx)`; the
//! registry maps that pair to fixed hyperparameters so training and later
//! attack/explanation runs agree on names and paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::architecture::{Activation, ArchKind};
use crate::error::{ModelError, Result};

/// The three network families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Deterministic network.
    BaseNN,
    /// Bayesian network with a posterior over every layer.
    FullBNN,
    /// Deterministic features with a Bayesian last layer.
    RedBNN,
}

impl ModelType {
    /// Name used in model names and directories.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ModelType::BaseNN => "baseNN",
            ModelType::FullBNN => "fullBNN",
            ModelType::RedBNN => "redBNN",
        }
    }
}

impl FromStr for ModelType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "baseNN" => Ok(ModelType::BaseNN),
            "fullBNN" => Ok(ModelType::FullBNN),
            "redBNN" => Ok(ModelType::RedBNN),
            other => Err(ModelError::UnknownModelType(other.to_string())),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Posterior inference method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Inference {
    /// Stochastic variational inference with a mean-field Gaussian guide.
    Svi,
    /// Diagonal Laplace approximation around the MAP estimate.
    Laplace,
    /// Hamiltonian Monte Carlo (recognised, not supported).
    Hmc,
}

impl Inference {
    /// Name used in model names and directories.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Inference::Svi => "svi",
            Inference::Laplace => "laplace",
            Inference::Hmc => "hmc",
        }
    }
}

impl FromStr for Inference {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "svi" => Ok(Inference::Svi),
            "laplace" => Ok(Inference::Laplace),
            "hmc" => Ok(Inference::Hmc),
            other => Err(ModelError::UnknownInference(other.to_string())),
        }
    }
}

impl fmt::Display for Inference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hyperparameters of a deterministic network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSettings {
    /// Dataset name.
    pub dataset: String,
    /// Hidden width.
    pub hidden_size: usize,
    /// Activation.
    pub activation: Activation,
    /// Architecture family.
    pub architecture: ArchKind,
    /// Training epochs.
    pub epochs: usize,
    /// Adam learning rate.
    pub lr: f64,
}

impl BaseSettings {
    /// Create settings.
    #[must_use]
    pub fn new(
        dataset: impl Into<String>,
        hidden_size: usize,
        activation: Activation,
        architecture: ArchKind,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            hidden_size,
            activation,
            architecture,
            epochs: 5,
            lr: 0.001,
        }
    }

    /// Set the number of epochs.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the learning rate.
    #[must_use]
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// `"{dataset}_baseNN_hid={h}_arch={a}_act={act}_ep={epochs}_lr={lr}"`.
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{}_baseNN_hid={}_arch={}_act={}_ep={}_lr={}",
            self.dataset, self.hidden_size, self.architecture, self.activation, self.epochs, self.lr
        )
    }
}

/// Hyperparameters of a fully Bayesian network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullBnnSettings {
    /// Dataset name.
    pub dataset: String,
    /// Hidden width.
    pub hidden_size: usize,
    /// Activation.
    pub activation: Activation,
    /// Architecture family.
    pub architecture: ArchKind,
    /// Inference method.
    pub inference: Inference,
    /// Training epochs.
    pub epochs: usize,
    /// Adam learning rate.
    pub lr: f64,
}

impl FullBnnSettings {
    /// `"{dataset}_fullBNN_{inference}_hid=..._arch=..._act=..._ep=..._lr=..."`.
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{}_fullBNN_{}_hid={}_arch={}_act={}_ep={}_lr={}",
            self.dataset,
            self.inference,
            self.hidden_size,
            self.architecture,
            self.activation,
            self.epochs,
            self.lr
        )
    }
}

/// Hyperparameters of a last-layer Bayesian network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedBnnSettings {
    /// Settings of the underlying deterministic network.
    pub base: BaseSettings,
    /// Inference method for the last layer.
    pub inference: Inference,
    /// Epochs of last-layer fitting.
    pub epochs: usize,
    /// Learning rate of last-layer fitting.
    pub lr: f64,
}

impl RedBnnSettings {
    /// `"{dataset}_redBNN_{inference}_hid=..._arch=..._act=..._ep=..._lr=..."`.
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{}_redBNN_{}_hid={}_arch={}_act={}_ep={}_lr={}",
            self.base.dataset,
            self.inference,
            self.base.hidden_size,
            self.base.architecture,
            self.base.activation,
            self.epochs,
            self.lr
        )
    }
}

/// Registered deterministic networks.
///
/// # Errors
///
/// Returns [`ModelError::UnknownSettings`] for unregistered indices.
pub fn base_settings(idx: usize) -> Result<BaseSettings> {
    let settings = match idx {
        0 => BaseSettings::new("mnist", 512, Activation::Relu, ArchKind::Fc2)
            .with_epochs(5)
            .with_lr(0.001),
        1 => BaseSettings::new("fashion_mnist", 1024, Activation::Leaky, ArchKind::Conv)
            .with_epochs(10)
            .with_lr(0.001),
        2 => BaseSettings::new("synthetic", 32, Activation::Relu, ArchKind::Fc)
            .with_epochs(3)
            .with_lr(0.01),
        _ => return Err(unknown(ModelType::BaseNN, idx)),
    };
    Ok(settings)
}

/// Registered fully Bayesian networks.
///
/// # Errors
///
/// Returns [`ModelError::UnknownSettings`] for unregistered indices.
pub fn full_bnn_settings(idx: usize) -> Result<FullBnnSettings> {
    let (dataset, hidden_size, activation, architecture, epochs, lr) = match idx {
        0 => ("mnist", 512, Activation::Leaky, ArchKind::Fc2, 5, 0.01),
        1 => ("fashion_mnist", 1024, Activation::Leaky, ArchKind::Conv, 10, 0.001),
        2 => ("synthetic", 32, Activation::Relu, ArchKind::Fc, 5, 0.01),
        _ => return Err(unknown(ModelType::FullBNN, idx)),
    };
    Ok(FullBnnSettings {
        dataset: dataset.to_string(),
        hidden_size,
        activation,
        architecture,
        inference: Inference::Svi,
        epochs,
        lr,
    })
}

/// Registered last-layer Bayesian networks.
///
/// # Errors
///
/// Returns [`ModelError::UnknownSettings`] for unregistered indices.
pub fn red_bnn_settings(idx: usize) -> Result<RedBnnSettings> {
    let (base_idx, inference, epochs, lr) = match idx {
        0 => (0, Inference::Laplace, 5, 0.01),
        1 => (0, Inference::Svi, 5, 0.01),
        2 => (2, Inference::Laplace, 3, 0.01),
        _ => return Err(unknown(ModelType::RedBNN, idx)),
    };
    Ok(RedBnnSettings {
        base: base_settings(base_idx)?,
        inference,
        epochs,
        lr,
    })
}

fn unknown(model: ModelType, idx: usize) -> ModelError {
    ModelError::UnknownSettings {
        model: model.name().to_string(),
        idx,
    }
}

/// Directory holding everything produced for one registered network.
///
/// `"{root}/[debug/]{model}_{dataset}_{arch}[_{inference}]_idx={idx}"`.
#[must_use]
pub fn save_dir(
    root: &Path,
    model: ModelType,
    dataset: &str,
    architecture: ArchKind,
    inference: Option<Inference>,
    debug: bool,
    model_idx: usize,
) -> PathBuf {
    let mut dir = root.to_path_buf();
    if debug {
        dir.push("debug");
    }
    let name = match inference {
        Some(inference) => format!("{model}_{dataset}_{architecture}_{inference}_idx={model_idx}"),
        None => format!("{model}_{dataset}_{architecture}_idx={model_idx}"),
    };
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_names_are_stable() {
        let settings = base_settings(0).unwrap();
        assert_eq!(
            settings.name(),
            "mnist_baseNN_hid=512_arch=fc2_act=relu_ep=5_lr=0.001"
        );
        assert_eq!(
            base_settings(2).unwrap().name(),
            "synthetic_baseNN_hid=32_arch=fc_act=relu_ep=3_lr=0.01"
        );
    }

    #[test]
    fn test_bnn_names() {
        assert_eq!(
            full_bnn_settings(0).unwrap().name(),
            "mnist_fullBNN_svi_hid=512_arch=fc2_act=leaky_ep=5_lr=0.01"
        );
        assert_eq!(
            red_bnn_settings(1).unwrap().name(),
            "mnist_redBNN_svi_hid=512_arch=fc2_act=relu_ep=5_lr=0.01"
        );
        assert_eq!(red_bnn_settings(0).unwrap().inference, Inference::Laplace);
    }

    #[test]
    fn test_unknown_settings() {
        assert!(matches!(
            base_settings(9),
            Err(ModelError::UnknownSettings { idx: 9, .. })
        ));
        assert!(full_bnn_settings(3).is_err());
        assert!(red_bnn_settings(3).is_err());
    }

    #[test]
    fn test_parse_types() {
        assert_eq!("redBNN".parse::<ModelType>().unwrap(), ModelType::RedBNN);
        assert!(matches!(
            "bnn".parse::<ModelType>(),
            Err(ModelError::UnknownModelType(_))
        ));
        assert_eq!("laplace".parse::<Inference>().unwrap(), Inference::Laplace);
        assert!("mcmc".parse::<Inference>().is_err());
    }

    #[test]
    fn test_save_dir() {
        let root = Path::new("experiments");
        let dir = save_dir(root, ModelType::BaseNN, "mnist", ArchKind::Fc2, None, false, 0);
        assert_eq!(dir, PathBuf::from("experiments/baseNN_mnist_fc2_idx=0"));

        let dir = save_dir(
            root,
            ModelType::FullBNN,
            "mnist",
            ArchKind::Conv,
            Some(Inference::Svi),
            true,
            2,
        );
        assert_eq!(
            dir,
            PathBuf::from("experiments/debug/fullBNN_mnist_conv_svi_idx=2")
        );
    }
}
