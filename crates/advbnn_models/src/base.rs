//! Deterministic network (baseNN).

use std::path::Path;

use advbnn_core::{ImageShape, WeightDraw};
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::architecture::Architecture;
use crate::checkpoint::{load_module, save_module, CheckpointMetadata};
use crate::error::Result;
use crate::forward::{forward_layers, LayerWeights};
use crate::params::NetParams;
use crate::settings::{BaseSettings, ModelType};
use crate::traits::LayeredNet;

/// A deterministic classifier.
///
/// # Example
///
/// ```rust
/// use advbnn_core::{ImageShape, WeightDraw};
/// use advbnn_models::{base_settings, BaseNet, LayeredNet};
/// use burn::prelude::*;
/// use burn_ndarray::NdArray;
///
/// let device = Default::default();
/// let net = BaseNet::<NdArray>::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, &device).unwrap();
/// let x = Tensor::<NdArray, 4>::zeros([3, 1, 28, 28], &device);
/// assert_eq!(net.logits(x, WeightDraw::Mean).unwrap().dims(), [3, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct BaseNet<B: Backend> {
    params: NetParams<B>,
    arch: Architecture,
    settings: BaseSettings,
}

impl<B: Backend> BaseNet<B> {
    /// Build a freshly initialized network.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings describe an invalid architecture.
    pub fn new(
        settings: BaseSettings,
        input_shape: ImageShape,
        n_classes: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let arch = Architecture::build(
            settings.architecture,
            settings.activation,
            input_shape,
            n_classes,
            settings.hidden_size,
            &settings.dataset,
        )?;
        let params = NetParams::init(&arch, device);
        info!(
            name = %settings.name(),
            n_params = arch.n_params(),
            "baseNN total number of weights"
        );
        Ok(Self {
            params,
            arch,
            settings,
        })
    }

    /// Settings this network was built from.
    #[must_use]
    pub fn settings(&self) -> &BaseSettings {
        &self.settings
    }

    /// Learnable parameters.
    #[must_use]
    pub fn params(&self) -> &NetParams<B> {
        &self.params
    }

    /// Replace the parameters, e.g. after training.
    #[must_use]
    pub fn with_params(mut self, params: NetParams<B>) -> Self {
        self.params = params;
        self
    }

    /// Flattened activations feeding the last layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters don't match the architecture.
    pub fn features(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let weights = self.params.weights(&self.arch)?;
        let upto = self.arch.n_layers() - 1;
        Ok(forward_layers(&self.arch, &weights, x, upto)?.into_flat())
    }

    /// Save weights and metadata under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let name = self.settings.name();
        save_module::<B, _>(&self.params, dir, &name)?;
        CheckpointMetadata::new(
            name,
            ModelType::BaseNN,
            self.arch.input_shape,
            self.arch.n_classes,
        )
        .with_settings(&self.settings)?
        .save(dir)
    }

    /// Load a network saved with [`BaseNet::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the files are missing or don't match the settings.
    pub fn load(
        settings: BaseSettings,
        input_shape: ImageShape,
        n_classes: usize,
        dir: &Path,
        device: &B::Device,
    ) -> Result<Self> {
        let net = Self::new(settings, input_shape, n_classes, device)?;
        let params = load_module::<B, _>(net.params.clone(), dir, &net.settings.name(), device)?;
        Ok(net.with_params(params))
    }
}

impl<B: AutodiffBackend> BaseNet<B> {
    /// The same network on the inner backend, without gradient tracking.
    #[must_use]
    pub fn valid(&self) -> BaseNet<B::InnerBackend> {
        BaseNet {
            params: self.params.clone().valid(),
            arch: self.arch.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<B: Backend> LayeredNet<B> for BaseNet<B> {
    fn architecture(&self) -> &Architecture {
        &self.arch
    }

    fn layer_weights(&self, _draw: WeightDraw) -> Result<LayerWeights<B>> {
        self.params.weights(&self.arch)
    }

    fn is_bayesian(&self) -> bool {
        false
    }

    fn name(&self) -> String {
        self.settings.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::base_settings;
    use advbnn_core::tensor::tensor_to_vec;
    use advbnn_core::SampleSpec;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn synthetic_net(device: &<TestBackend as Backend>::Device) -> BaseNet<TestBackend> {
        BaseNet::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, device).unwrap()
    }

    #[test]
    fn test_predictive_rows_sum_to_one() {
        let device = Default::default();
        let net = synthetic_net(&device);
        let x = Tensor::<TestBackend, 4>::ones([4, 1, 28, 28], &device);
        let probs = crate::traits::predictive(&net, x, &SampleSpec::Deterministic).unwrap();
        let sums = tensor_to_vec(probs.sum_dim(1)).unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_draw_is_ignored() {
        let device = Default::default();
        let net = synthetic_net(&device);
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let a = tensor_to_vec(net.logits(x.clone(), WeightDraw::Mean).unwrap()).unwrap();
        let b = tensor_to_vec(net.logits(x, WeightDraw::Sample(3)).unwrap()).unwrap();
        assert_eq!(a, b);
        assert!(!net.is_bayesian());
    }

    #[test]
    fn test_features_and_truncated_logits() {
        let device = Default::default();
        let net = synthetic_net(&device);
        let x = Tensor::<TestBackend, 4>::ones([2, 1, 28, 28], &device);
        assert_eq!(net.features(x.clone()).unwrap().dims(), [2, 32]);
        assert_eq!(net.logits_upto(x.clone(), WeightDraw::Mean, 0).unwrap().dims(), [2, 784]);
        assert!(net.logits_upto(x, WeightDraw::Mean, 7).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let net = synthetic_net(&device);
        net.save(dir.path()).unwrap();

        let loaded = BaseNet::<TestBackend>::load(
            base_settings(2).unwrap(),
            ImageShape::new(1, 28, 28),
            10,
            dir.path(),
            &device,
        )
        .unwrap();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let a = tensor_to_vec(net.logits(x.clone(), WeightDraw::Mean).unwrap()).unwrap();
        let b = tensor_to_vec(loaded.logits(x, WeightDraw::Mean).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
