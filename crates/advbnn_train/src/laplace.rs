//! Diagonal Laplace approximation of a redBNN last layer.
//!
//! The last layer is first fitted to its MAP estimate under a `N(0, 1)`
//! prior. The posterior is then `N(w_map, H⁻¹)` with the diagonal of the
//! generalised Gauss-Newton precision of the softmax likelihood plus the
//! prior precision:
//!
//! - weights: `H_jk = Σ_n p_nk (1 - p_nk) φ_nj² + 1`
//! - biases: `H_k = Σ_n p_nk (1 - p_nk) + 1`
//!
//! where `φ_n` are the frozen base features and `p_n` the MAP softmax.

use advbnn_data::ImageLoader;
use advbnn_models::forward::apply_layer;
use advbnn_models::{Features, GaussianLayer, LayerSpec, LayerWeight, LayeredNet, ModelError, RedBnn};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use advbnn_core::SampleSpec;

use crate::config::TrainConfig;
use crate::error::Result;
use crate::evaluation::evaluate_accuracy;
use crate::training::{Objective, Trainer, TrainingOutput};

/// MAP fit followed by the diagonal Laplace posterior of the last layer.
///
/// The history covers the MAP epochs; validation uses the posterior mean.
///
/// # Errors
///
/// Returns an error for an invalid configuration, an empty loader, or an
/// architecture that does not end in a linear layer.
pub fn fit_laplace<B: AutodiffBackend>(
    net: RedBnn<B>,
    train: &ImageLoader,
    valid: Option<&ImageLoader>,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutput<RedBnn<B>>> {
    info!(name = %net.name(), n_train = train.len(), "fitting redBNN last layer with Laplace");
    let trainer = Trainer::<B>::new(config.clone(), device.clone())?;
    let spec = net.last_spec()?;
    let n_train = train.len() as f32;

    let output = trainer.fit_with_forward(
        net.last_layer().clone(),
        train,
        |layer: &GaussianLayer<B>, x| {
            let features = net.base().features(x)?.detach();
            let (w, b) = layer.mean();
            let sq_norm = w.clone().powf_scalar(2.0).sum() + b.clone().powf_scalar(2.0).sum();
            let weight = LayerWeight::from_flat(&spec, w, b)?;
            let logits = apply_layer(&spec, Some(&weight), Features::Flat(features))?.into_flat();
            Ok(Objective::logits(logits).with_penalty(sq_norm.div_scalar(2.0 * n_train)))
        },
        |layer: &GaussianLayer<B>| match valid {
            Some(loader) => {
                let current = net.clone().with_last_layer(layer.clone()).valid();
                Ok(Some(evaluate_accuracy::<B::InnerBackend, _>(
                    &current,
                    loader,
                    &SampleSpec::PosteriorMean,
                    device,
                )?))
            }
            None => Ok(None),
        },
    )?;

    let map_layer = output.model.clone();
    let posterior = laplace_posterior(&net, &map_layer, &spec, train, device)?;
    info!("Laplace posterior fitted");
    Ok(output.map(|_| net.with_last_layer(posterior)))
}

fn laplace_posterior<B: AutodiffBackend>(
    net: &RedBnn<B>,
    map_layer: &GaussianLayer<B>,
    spec: &LayerSpec,
    train: &ImageLoader,
    device: &B::Device,
) -> Result<GaussianLayer<B>> {
    let (d_in, d_out) = match *spec {
        LayerSpec::Linear { d_in, d_out } => (d_in, d_out),
        other => {
            return Err(ModelError::LayerMismatch(format!(
                "Laplace needs a linear last layer, got {other:?}"
            ))
            .into())
        }
    };
    let (w, b) = map_layer.mean();
    let (w, b) = (w.detach(), b.detach());
    let weight = LayerWeight::from_flat(spec, w.clone(), b.clone())?;

    let mut h_weight = Tensor::<B, 2>::ones([d_in, d_out], device);
    let mut h_bias = Tensor::<B, 1>::ones([d_out], device);
    for batch in train.iter::<B>(device, 0) {
        let features = net.base().features(batch.images)?.detach();
        let logits = apply_layer(spec, Some(&weight), Features::Flat(features.clone()))?.into_flat();
        let probs = softmax(logits.detach(), 1);
        let curvature = probs.clone() * probs.neg().add_scalar(1.0);

        h_weight = h_weight + features.powf_scalar(2.0).transpose().matmul(curvature.clone());
        h_bias = h_bias + curvature.sum_dim(0).reshape([d_out]);
    }

    let w_scale = h_weight.sqrt().recip().reshape([d_in * d_out]);
    let b_scale = h_bias.sqrt().recip();
    Ok(GaussianLayer::from_mean_and_scale(w, w_scale, b, b_scale))
}
