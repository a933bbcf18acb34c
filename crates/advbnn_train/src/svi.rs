//! Stochastic variational inference.
//!
//! The guide is the mean-field Gaussian held by the network, the prior is
//! `N(0, 1)`. Each step draws one reparameterised sample and minimises
//! `mean CE(batch) + KL(q || p) / N`, the negative ELBO divided by the
//! number of training images `N`.

use advbnn_core::SampleSpec;
use advbnn_data::ImageLoader;
use advbnn_models::forward::{apply_layer, forward_layers};
use advbnn_models::{
    Features, FullBnn, GaussianLayer, GaussianPosterior, Inference, LayerWeight, LayeredNet,
    Network, RedBnn,
};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};
use crate::evaluation::evaluate_accuracy;
use crate::training::{train_base, Objective, Trainer, TrainingOutput};

/// Fit the posterior of a fully Bayesian network.
///
/// # Errors
///
/// Returns an error for an invalid configuration or an empty loader.
pub fn train_full_svi<B: AutodiffBackend>(
    net: FullBnn<B>,
    train: &ImageLoader,
    valid: Option<&ImageLoader>,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutput<FullBnn<B>>> {
    info!(name = %net.name(), n_train = train.len(), "training fullBNN with SVI");
    let trainer = Trainer::<B>::new(config.clone(), device.clone())?;
    let arch = net.architecture().clone();
    let n_layers = arch.n_layers();
    let n_train = train.len() as f32;
    let valid_spec = SampleSpec::samples(config.valid_samples);

    let output = trainer.fit_with_forward(
        net.posterior().clone(),
        train,
        |posterior: &GaussianPosterior<B>, x| {
            let (weights, kl) = posterior.reparameterized(&arch)?;
            let logits = forward_layers(&arch, &weights, x, n_layers)?.into_flat();
            Ok(Objective::logits(logits).with_penalty(kl.div_scalar(n_train)))
        },
        |posterior: &GaussianPosterior<B>| match valid {
            Some(loader) => {
                let current = net.clone().with_posterior(posterior.clone()).valid();
                Ok(Some(evaluate_accuracy::<B::InnerBackend, _>(
                    &current,
                    loader,
                    &valid_spec,
                    device,
                )?))
            }
            None => Ok(None),
        },
    )?;
    Ok(output.map(|posterior| net.with_posterior(posterior)))
}

/// Fit the last-layer posterior of a redBNN; the base network stays frozen.
///
/// # Errors
///
/// Returns an error for an invalid configuration, an empty loader, or an
/// architecture that does not end in a linear layer.
pub fn train_red_svi<B: AutodiffBackend>(
    net: RedBnn<B>,
    train: &ImageLoader,
    valid: Option<&ImageLoader>,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutput<RedBnn<B>>> {
    info!(name = %net.name(), n_train = train.len(), "training redBNN last layer with SVI");
    let trainer = Trainer::<B>::new(config.clone(), device.clone())?;
    let spec = net.last_spec()?;
    let n_train = train.len() as f32;
    let valid_spec = SampleSpec::samples(config.valid_samples);

    let output = trainer.fit_with_forward(
        net.last_layer().clone(),
        train,
        |layer: &GaussianLayer<B>, x| {
            let features = net.base().features(x)?.detach();
            let (w, b) = layer.sample_random();
            let weight = LayerWeight::from_flat(&spec, w, b)?;
            let logits = apply_layer(&spec, Some(&weight), Features::Flat(features))?.into_flat();
            let kl = layer.kl_to_standard_normal();
            Ok(Objective::logits(logits).with_penalty(kl.div_scalar(n_train)))
        },
        |layer: &GaussianLayer<B>| match valid {
            Some(loader) => {
                let current = net.clone().with_last_layer(layer.clone()).valid();
                Ok(Some(evaluate_accuracy::<B::InnerBackend, _>(
                    &current,
                    loader,
                    &valid_spec,
                    device,
                )?))
            }
            None => Ok(None),
        },
    )?;
    Ok(output.map(|layer| net.with_last_layer(layer)))
}

/// Train any network with the procedure its family uses.
///
/// Deterministic networks train with plain Adam, fullBNNs with SVI,
/// redBNNs with SVI or Laplace according to their settings.
///
/// # Errors
///
/// Returns [`TrainError::Unsupported`] for HMC, or any training error.
pub fn train_network<B: AutodiffBackend>(
    net: Network<B>,
    train: &ImageLoader,
    valid: Option<&ImageLoader>,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutput<Network<B>>> {
    match net {
        Network::Base(net) => Ok(train_base(net, train, valid, config, device)?.map(Network::Base)),
        Network::Full(net) => {
            Ok(train_full_svi(net, train, valid, config, device)?.map(Network::Full))
        }
        Network::Red(net) => match net.settings().inference {
            Inference::Svi => Ok(train_red_svi(net, train, valid, config, device)?.map(Network::Red)),
            Inference::Laplace => {
                Ok(crate::laplace::fit_laplace(net, train, valid, config, device)?.map(Network::Red))
            }
            Inference::Hmc => Err(TrainError::Unsupported("hmc inference".to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::tests::{synthetic_loaders, TestBackend};
    use advbnn_core::{ImageShape, Seed, WeightDraw};
    use advbnn_core::tensor::tensor_to_vec;
    use advbnn_models::{base_settings, full_bnn_settings, red_bnn_settings, BaseNet};

    #[test]
    fn test_full_svi_reduces_loss() {
        let device = Default::default();
        let (train, _) = synthetic_loaders();
        let net = FullBnn::<TestBackend>::new(
            full_bnn_settings(2).unwrap(),
            ImageShape::new(1, 28, 28),
            10,
            Seed::new(0),
            &device,
        )
        .unwrap();
        let output = train_full_svi(net, &train, None, &TrainConfig::new(3, 0.01), &device).unwrap();
        assert_eq!(output.train_losses.len(), 3);
        assert!(output.train_losses[2] < output.train_losses[0]);
        assert!(output.valid_accs.is_empty());
    }

    #[test]
    fn test_red_svi_keeps_base_frozen() {
        let device = Default::default();
        let (train, test) = synthetic_loaders();
        let base = BaseNet::<TestBackend>::new(
            base_settings(2).unwrap(),
            ImageShape::new(1, 28, 28),
            10,
            &device,
        )
        .unwrap();
        let mut settings = red_bnn_settings(2).unwrap();
        settings.inference = Inference::Svi;
        let net = RedBnn::new(base.clone(), settings, Seed::new(0)).unwrap();

        let output =
            train_red_svi(net, &train, Some(&test), &TrainConfig::new(1, 0.01).with_valid_samples(2), &device)
                .unwrap();
        assert_eq!(output.valid_accs.len(), 1);

        let x = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let before = tensor_to_vec(base.features(x.clone()).unwrap()).unwrap();
        let after = tensor_to_vec(output.model.base().features(x.clone()).unwrap()).unwrap();
        assert_eq!(before, after);
        assert!(output.model.logits(x, WeightDraw::Sample(0)).is_ok());
    }
}
