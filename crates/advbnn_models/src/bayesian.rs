//! Gaussian weight posteriors and the two Bayesian network families.
//!
//! Every posterior is a factorised Gaussian `N(loc, softplus(rho)²)` over
//! flat weight and bias vectors. Draw `i` is reproducible: its noise comes
//! from a ChaCha8 stream seeded by the network seed and `i`, so the same
//! index yields the same weights in attacks, evaluation and explanations.

use std::path::Path;

use advbnn_core::{ImageShape, Seed, WeightDraw};
use burn::module::{AutodiffModule, Param};
use burn::prelude::*;
use burn::tensor::activation::softplus;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, TensorData};
use tracing::info;

use crate::architecture::{Architecture, LayerSpec};
use crate::base::BaseNet;
use crate::checkpoint::{load_module, save_module, CheckpointMetadata};
use crate::error::{ModelError, Result};
use crate::forward::{LayerWeight, LayerWeights};
use crate::params::NetParams;
use crate::settings::{FullBnnSettings, Inference, ModelType, RedBnnSettings};
use crate::traits::LayeredNet;

/// Initial `rho` of variational scales, `softplus(-5) ≈ 0.0067`.
pub const RHO_INIT: f32 = -5.0;

/// Smallest scale accepted when converting scales back to `rho`.
const MIN_SCALE: f32 = 1e-6;

/// Factorised Gaussian over one layer's weight and bias.
#[derive(Module, Debug)]
pub struct GaussianLayer<B: Backend> {
    /// Weight means.
    pub weight_loc: Param<Tensor<B, 1>>,
    /// Weight scales before softplus.
    pub weight_rho: Param<Tensor<B, 1>>,
    /// Bias means.
    pub bias_loc: Param<Tensor<B, 1>>,
    /// Bias scales before softplus.
    pub bias_rho: Param<Tensor<B, 1>>,
}

impl<B: Backend> GaussianLayer<B> {
    /// Posterior centred on the given means with a constant `rho`.
    pub fn from_mean(weight: Tensor<B, 1>, bias: Tensor<B, 1>, rho: f32) -> Self {
        let weight_rho = weight.zeros_like().add_scalar(rho);
        let bias_rho = bias.zeros_like().add_scalar(rho);
        Self {
            weight_loc: Param::from_tensor(weight),
            weight_rho: Param::from_tensor(weight_rho),
            bias_loc: Param::from_tensor(bias),
            bias_rho: Param::from_tensor(bias_rho),
        }
    }

    /// Posterior with explicit means and standard deviations.
    pub fn from_mean_and_scale(
        weight_loc: Tensor<B, 1>,
        weight_scale: Tensor<B, 1>,
        bias_loc: Tensor<B, 1>,
        bias_scale: Tensor<B, 1>,
    ) -> Self {
        Self {
            weight_loc: Param::from_tensor(weight_loc),
            weight_rho: Param::from_tensor(inverse_softplus(weight_scale)),
            bias_loc: Param::from_tensor(bias_loc),
            bias_rho: Param::from_tensor(inverse_softplus(bias_scale)),
        }
    }

    /// Number of weight and bias values.
    #[must_use]
    pub fn n_params(&self) -> (usize, usize) {
        (self.weight_loc.val().dims()[0], self.bias_loc.val().dims()[0])
    }

    /// Posterior means.
    #[must_use]
    pub fn mean(&self) -> (Tensor<B, 1>, Tensor<B, 1>) {
        (self.weight_loc.val(), self.bias_loc.val())
    }

    /// Posterior standard deviations.
    #[must_use]
    pub fn scales(&self) -> (Tensor<B, 1>, Tensor<B, 1>) {
        (
            softplus(self.weight_rho.val(), 1.0),
            softplus(self.bias_rho.val(), 1.0),
        )
    }

    /// Reparameterised draw `loc + scale * eps`.
    #[must_use]
    pub fn sample_with(&self, eps_weight: Tensor<B, 1>, eps_bias: Tensor<B, 1>) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let (w_scale, b_scale) = self.scales();
        (
            self.weight_loc.val() + w_scale * eps_weight,
            self.bias_loc.val() + b_scale * eps_bias,
        )
    }

    /// Reproducible draw for a posterior sample index.
    #[must_use]
    pub fn sample_seeded(&self, seed: Seed) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let (n_w, n_b) = self.n_params();
        let device = self.weight_loc.val().device();
        let mut noise = seed.standard_normal(n_w + n_b);
        let bias_noise = noise.split_off(n_w);
        let eps_w = Tensor::<B, 1>::from_data(TensorData::new(noise, [n_w]), &device);
        let eps_b = Tensor::<B, 1>::from_data(TensorData::new(bias_noise, [n_b]), &device);
        self.sample_with(eps_w, eps_b)
    }

    /// Draw with fresh backend noise, for training.
    #[must_use]
    pub fn sample_random(&self) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let (n_w, n_b) = self.n_params();
        let device = self.weight_loc.val().device();
        let normal = Distribution::Normal(0.0, 1.0);
        self.sample_with(
            Tensor::random([n_w], normal, &device),
            Tensor::random([n_b], normal, &device),
        )
    }

    /// `KL(q || N(0, 1))` summed over weights and biases, shape `[1]`.
    #[must_use]
    pub fn kl_to_standard_normal(&self) -> Tensor<B, 1> {
        let (w_scale, b_scale) = self.scales();
        kl_terms(self.weight_loc.val(), w_scale).sum() + kl_terms(self.bias_loc.val(), b_scale).sum()
    }
}

/// Elementwise `-ln s + (s² + m²) / 2 - 1/2`.
fn kl_terms<B: Backend>(loc: Tensor<B, 1>, scale: Tensor<B, 1>) -> Tensor<B, 1> {
    let quad = (scale.clone().powf_scalar(2.0) + loc.powf_scalar(2.0)).div_scalar(2.0);
    (quad - scale.log()).sub_scalar(0.5)
}

/// `rho` such that `softplus(rho) = scale`.
fn inverse_softplus<B: Backend>(scale: Tensor<B, 1>) -> Tensor<B, 1> {
    scale.clamp_min(MIN_SCALE).exp().sub_scalar(1.0).log()
}

fn layer_seed(seed: Seed, sample_idx: usize, layer: usize) -> Seed {
    seed.for_sample(sample_idx).derive(&format!("layer-{layer}"))
}

/// Gaussian posterior over every learnable layer.
#[derive(Module, Debug)]
pub struct GaussianPosterior<B: Backend> {
    /// One factor per learnable layer, in architecture order.
    pub layers: Vec<GaussianLayer<B>>,
}

impl<B: Backend> GaussianPosterior<B> {
    /// Posterior centred on deterministic parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` don't match `arch`.
    pub fn from_params(arch: &Architecture, params: &NetParams<B>, rho: f32) -> Result<Self> {
        let layers = params
            .weights(arch)?
            .into_iter()
            .map(|w| {
                let (weight, bias) = w.into_flat();
                GaussianLayer::from_mean(weight, bias, rho)
            })
            .collect();
        Ok(Self { layers })
    }

    /// Weights for one draw.
    ///
    /// # Errors
    ///
    /// Returns an error if the factors don't match `arch`.
    pub fn layer_weights(&self, arch: &Architecture, draw: WeightDraw, seed: Seed) -> Result<LayerWeights<B>> {
        self.assemble(arch, |l, layer| match draw {
            WeightDraw::Mean => layer.mean(),
            WeightDraw::Sample(idx) => layer.sample_seeded(layer_seed(seed, idx, l)),
        })
    }

    /// Weights from fresh noise plus the total KL to the prior.
    ///
    /// # Errors
    ///
    /// Returns an error if the factors don't match `arch`.
    pub fn reparameterized(&self, arch: &Architecture) -> Result<(LayerWeights<B>, Tensor<B, 1>)> {
        let weights = self.assemble(arch, |_, layer| layer.sample_random())?;
        Ok((weights, self.kl()))
    }

    /// Total `KL(q || N(0, 1))`, shape `[1]`.
    #[must_use]
    pub fn kl(&self) -> Tensor<B, 1> {
        self.layers
            .iter()
            .map(GaussianLayer::kl_to_standard_normal)
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| Tensor::zeros([1], &Default::default()))
    }

    fn assemble<F>(&self, arch: &Architecture, mut draw: F) -> Result<LayerWeights<B>>
    where
        F: FnMut(usize, &GaussianLayer<B>) -> (Tensor<B, 1>, Tensor<B, 1>),
    {
        let specs = arch.learnable_layers();
        if specs.len() != self.layers.len() {
            return Err(ModelError::LayerMismatch(format!(
                "architecture has {} learnable layers, posterior has {}",
                specs.len(),
                self.layers.len()
            )));
        }
        specs
            .iter()
            .zip(&self.layers)
            .enumerate()
            .map(|(l, (spec, layer))| {
                let (w, b) = draw(l, layer);
                LayerWeight::from_flat(spec, w, b)
            })
            .collect()
    }
}

/// Bayesian network with a Gaussian posterior over every layer (fullBNN).
#[derive(Debug, Clone)]
pub struct FullBnn<B: Backend> {
    posterior: GaussianPosterior<B>,
    arch: Architecture,
    settings: FullBnnSettings,
    seed: Seed,
}

impl<B: Backend> FullBnn<B> {
    /// Build a network with a freshly initialized posterior.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotImplemented`] for inference other than SVI,
    /// or an error for invalid architectures.
    pub fn new(
        settings: FullBnnSettings,
        input_shape: ImageShape,
        n_classes: usize,
        seed: Seed,
        device: &B::Device,
    ) -> Result<Self> {
        if settings.inference != Inference::Svi {
            return Err(ModelError::NotImplemented(format!(
                "{} inference for fullBNN",
                settings.inference
            )));
        }
        let arch = Architecture::build(
            settings.architecture,
            settings.activation,
            input_shape,
            n_classes,
            settings.hidden_size,
            &settings.dataset,
        )?;
        let params = NetParams::init(&arch, device);
        let posterior = GaussianPosterior::from_params(&arch, &params, RHO_INIT)?;
        info!(
            name = %settings.name(),
            n_params = 2 * arch.n_params(),
            "fullBNN total number of variational parameters"
        );
        Ok(Self {
            posterior,
            arch,
            settings,
            seed,
        })
    }

    /// Settings this network was built from.
    #[must_use]
    pub fn settings(&self) -> &FullBnnSettings {
        &self.settings
    }

    /// Posterior factors.
    #[must_use]
    pub fn posterior(&self) -> &GaussianPosterior<B> {
        &self.posterior
    }

    /// Replace the posterior, e.g. after SVI.
    #[must_use]
    pub fn with_posterior(mut self, posterior: GaussianPosterior<B>) -> Self {
        self.posterior = posterior;
        self
    }

    /// Seed from which posterior draws are derived.
    #[must_use]
    pub fn seed(&self) -> Seed {
        self.seed
    }

    /// Save posterior and metadata under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let name = self.settings.name();
        save_module::<B, _>(&self.posterior, dir, &name)?;
        CheckpointMetadata::new(name, ModelType::FullBNN, self.arch.input_shape, self.arch.n_classes)
            .with_settings(&self.settings)?
            .with_seed(self.seed)
            .save(dir)
    }

    /// Load a network saved with [`FullBnn::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the files are missing or don't match the settings.
    pub fn load(
        settings: FullBnnSettings,
        input_shape: ImageShape,
        n_classes: usize,
        dir: &Path,
        device: &B::Device,
    ) -> Result<Self> {
        let meta = CheckpointMetadata::load(dir, &settings.name())?;
        let net = Self::new(settings, input_shape, n_classes, meta.seed, device)?;
        let posterior = load_module::<B, _>(net.posterior.clone(), dir, &net.settings.name(), device)?;
        Ok(net.with_posterior(posterior))
    }
}

impl<B: AutodiffBackend> FullBnn<B> {
    /// The same network on the inner backend, without gradient tracking.
    #[must_use]
    pub fn valid(&self) -> FullBnn<B::InnerBackend> {
        FullBnn {
            posterior: self.posterior.clone().valid(),
            arch: self.arch.clone(),
            settings: self.settings.clone(),
            seed: self.seed,
        }
    }
}

impl<B: Backend> LayeredNet<B> for FullBnn<B> {
    fn architecture(&self) -> &Architecture {
        &self.arch
    }

    fn layer_weights(&self, draw: WeightDraw) -> Result<LayerWeights<B>> {
        self.posterior.layer_weights(&self.arch, draw, self.seed)
    }

    fn is_bayesian(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        self.settings.name()
    }
}

/// Deterministic features with a Bayesian last layer (redBNN).
#[derive(Debug, Clone)]
pub struct RedBnn<B: Backend> {
    base: BaseNet<B>,
    last: GaussianLayer<B>,
    settings: RedBnnSettings,
    seed: Seed,
}

impl<B: Backend> RedBnn<B> {
    /// Wrap a trained base network; the last-layer posterior starts at its
    /// weights.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotImplemented`] for HMC inference.
    pub fn new(base: BaseNet<B>, settings: RedBnnSettings, seed: Seed) -> Result<Self> {
        if settings.inference == Inference::Hmc {
            return Err(ModelError::NotImplemented(
                "hmc inference for redBNN".to_string(),
            ));
        }
        let weights = base.params().weights(base.architecture())?;
        let last = weights
            .into_iter()
            .last()
            .ok_or_else(|| ModelError::LayerMismatch("no learnable layer".to_string()))?;
        let (weight, bias) = last.into_flat();
        let last = GaussianLayer::from_mean(weight, bias, RHO_INIT);
        Ok(Self {
            base,
            last,
            settings,
            seed,
        })
    }

    /// Settings this network was built from.
    #[must_use]
    pub fn settings(&self) -> &RedBnnSettings {
        &self.settings
    }

    /// The frozen feature extractor.
    #[must_use]
    pub fn base(&self) -> &BaseNet<B> {
        &self.base
    }

    /// Posterior over the last layer.
    #[must_use]
    pub fn last_layer(&self) -> &GaussianLayer<B> {
        &self.last
    }

    /// Replace the last-layer posterior, e.g. after SVI or Laplace.
    #[must_use]
    pub fn with_last_layer(mut self, last: GaussianLayer<B>) -> Self {
        self.last = last;
        self
    }

    /// Spec of the last layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the architecture does not end in a linear layer.
    pub fn last_spec(&self) -> Result<LayerSpec> {
        let arch = self.base.architecture();
        arch.feature_size()?;
        arch.layers
            .last()
            .copied()
            .ok_or_else(|| ModelError::LayerMismatch("empty architecture".to_string()))
    }

    /// Seed from which posterior draws are derived.
    #[must_use]
    pub fn seed(&self) -> Seed {
        self.seed
    }

    /// Save the last-layer posterior and metadata under `dir`.
    ///
    /// The base network is saved separately with [`BaseNet::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let name = self.settings.name();
        save_module::<B, _>(&self.last, dir, &name)?;
        let arch = self.base.architecture();
        CheckpointMetadata::new(name, ModelType::RedBNN, arch.input_shape, arch.n_classes)
            .with_settings(&self.settings)?
            .with_seed(self.seed)
            .with_extra("base", self.base.settings().name())
            .save(dir)
    }

    /// Load the last-layer posterior on top of a loaded base network.
    ///
    /// # Errors
    ///
    /// Returns an error if the files are missing or don't match.
    pub fn load(base: BaseNet<B>, settings: RedBnnSettings, dir: &Path, device: &B::Device) -> Result<Self> {
        let meta = CheckpointMetadata::load(dir, &settings.name())?;
        let net = Self::new(base, settings, meta.seed)?;
        let last = load_module::<B, _>(net.last.clone(), dir, &net.settings.name(), device)?;
        Ok(net.with_last_layer(last))
    }
}

impl<B: AutodiffBackend> RedBnn<B> {
    /// The same network on the inner backend, without gradient tracking.
    #[must_use]
    pub fn valid(&self) -> RedBnn<B::InnerBackend> {
        RedBnn {
            base: self.base.valid(),
            last: self.last.clone().valid(),
            settings: self.settings.clone(),
            seed: self.seed,
        }
    }
}

impl<B: Backend> LayeredNet<B> for RedBnn<B> {
    fn architecture(&self) -> &Architecture {
        self.base.architecture()
    }

    fn layer_weights(&self, draw: WeightDraw) -> Result<LayerWeights<B>> {
        let mut weights = self.base.params().weights(self.base.architecture())?;
        let spec = self.last_spec()?;
        let last_idx = weights.len() - 1;
        let (w, b) = match draw {
            WeightDraw::Mean => self.last.mean(),
            WeightDraw::Sample(idx) => self.last.sample_seeded(layer_seed(self.seed, idx, last_idx)),
        };
        weights[last_idx] = LayerWeight::from_flat(&spec, w, b)?;
        Ok(weights)
    }

    fn is_bayesian(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        self.settings.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{base_settings, full_bnn_settings, red_bnn_settings};
    use crate::traits::predictive;
    use advbnn_core::tensor::tensor_to_vec;
    use advbnn_core::{CoreError, SampleSpec};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn shape() -> ImageShape {
        ImageShape::new(1, 28, 28)
    }

    fn full_bnn(device: &<TestBackend as Backend>::Device) -> FullBnn<TestBackend> {
        FullBnn::new(full_bnn_settings(2).unwrap(), shape(), 10, Seed::new(1), device).unwrap()
    }

    #[test]
    fn test_same_index_same_weights() {
        let device = Default::default();
        let net = full_bnn(&device);
        let x = Tensor::<TestBackend, 4>::ones([2, 1, 28, 28], &device);
        let a = tensor_to_vec(net.logits(x.clone(), WeightDraw::Sample(4)).unwrap()).unwrap();
        let b = tensor_to_vec(net.logits(x.clone(), WeightDraw::Sample(4)).unwrap()).unwrap();
        let c = tensor_to_vec(net.logits(x, WeightDraw::Sample(5)).unwrap()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sample_idx_mismatch() {
        let device = Default::default();
        let net = full_bnn(&device);
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let spec = SampleSpec::samples(3).with_idxs(vec![0, 1]);
        let err = predictive(&net, x, &spec).unwrap_err();
        assert!(matches!(
            err,
            ModelError::CoreError(CoreError::SampleCountMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_hmc_not_implemented() {
        let device = Default::default();
        let mut settings = full_bnn_settings(2).unwrap();
        settings.inference = Inference::Hmc;
        let err = FullBnn::<TestBackend>::new(settings, shape(), 10, Seed::new(0), &device).unwrap_err();
        assert!(matches!(err, ModelError::NotImplemented(_)));
    }

    #[test]
    fn test_kl_zero_at_prior() {
        let device = Default::default();
        let rho_one = (1.0f32.exp() - 1.0).ln();
        let layer = GaussianLayer::<TestBackend>::from_mean(
            Tensor::zeros([5], &device),
            Tensor::zeros([2], &device),
            rho_one,
        );
        let kl = layer.kl_to_standard_normal().into_scalar();
        assert!(kl.abs() < 1e-4);
    }

    #[test]
    fn test_scale_roundtrip() {
        let device = Default::default();
        let scale = Tensor::<TestBackend, 1>::from_floats([0.01, 0.5, 2.0], &device);
        let layer = GaussianLayer::from_mean_and_scale(
            Tensor::zeros([3], &device),
            scale,
            Tensor::zeros([1], &device),
            Tensor::ones([1], &device),
        );
        let (w_scale, _) = layer.scales();
        let values = tensor_to_vec(w_scale).unwrap();
        for (got, want) in values.iter().zip([0.01, 0.5, 2.0]) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn test_red_bnn_mean_matches_base() {
        let device = Default::default();
        let base = BaseNet::<TestBackend>::new(base_settings(2).unwrap(), shape(), 10, &device).unwrap();
        let red = RedBnn::new(base.clone(), red_bnn_settings(2).unwrap(), Seed::new(0)).unwrap();
        let x = Tensor::<TestBackend, 4>::ones([2, 1, 28, 28], &device);

        let a = tensor_to_vec(base.logits(x.clone(), WeightDraw::Mean).unwrap()).unwrap();
        let b = tensor_to_vec(red.logits(x.clone(), WeightDraw::Mean).unwrap()).unwrap();
        for (u, v) in a.iter().zip(&b) {
            assert!((u - v).abs() < 1e-5);
        }
        let s = tensor_to_vec(red.logits(x, WeightDraw::Sample(0)).unwrap()).unwrap();
        assert_ne!(a, s);
        assert!(red.is_bayesian());
    }

    #[test]
    fn test_full_bnn_save_and_load() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let net = full_bnn(&device);
        net.save(dir.path()).unwrap();
        let loaded =
            FullBnn::<TestBackend>::load(full_bnn_settings(2).unwrap(), shape(), 10, dir.path(), &device)
                .unwrap();
        assert_eq!(loaded.seed(), Seed::new(1));

        let x = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let a = tensor_to_vec(net.logits(x.clone(), WeightDraw::Sample(2)).unwrap()).unwrap();
        let b = tensor_to_vec(loaded.logits(x, WeightDraw::Sample(2)).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
