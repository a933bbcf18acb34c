//! LRP heatmaps of deterministic and Bayesian networks.

use advbnn_core::tensor::{argmax_rows, array4_to_tensor, int_tensor_to_vec, tensor_to_array4};
use advbnn_core::{CoreError, WeightDraw};
use advbnn_models::LayeredNet;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use ndarray::{s, Array4, Axis};
use tracing::{debug, info};

use crate::error::{ExplainError, Result};
use crate::propagation::relevance;
use crate::rules::{ExplanationMode, LrpRule};

/// Images explained per propagation pass.
pub const EXPLAIN_BATCH_SIZE: usize = 128;

fn mode_draws<B, N>(net: &N, mode: ExplanationMode) -> Result<Vec<WeightDraw>>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    match mode.n_samples() {
        Some(0) => Err(CoreError::ZeroSamples.into()),
        Some(n) if net.is_bayesian() => Ok((0..n).map(WeightDraw::Sample).collect()),
        _ => Ok(vec![WeightDraw::Mean]),
    }
}

/// Mean over `draws` of the truncated network output, reduced to its argmax.
fn mean_prediction<B, N>(net: &N, x: Tensor<B, 4>, draws: &[WeightDraw], layer_idx: i64) -> Result<Vec<usize>>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    let mut total: Option<Tensor<B, 2>> = None;
    for &draw in draws {
        let out = net.logits_upto(x.clone(), draw, layer_idx)?;
        total = Some(match total {
            Some(t) => t + out,
            None => out,
        });
    }
    let total = total.ok_or(CoreError::ZeroSamples)?;
    Ok(int_tensor_to_vec(argmax_rows(total))?)
}

fn explain_batch<B, N>(
    net: &N,
    images: Tensor<B, 4>,
    rule: LrpRule,
    mode: ExplanationMode,
    draws: &[WeightDraw],
    layer_idx: i64,
) -> Result<Tensor<B, 4>>
where
    B: AutodiffBackend,
    N: LayeredNet<B> + ?Sized,
{
    let arch = net.architecture();
    let upto = arch.resolve_layer_idx(layer_idx)?;
    let classes = match mode {
        ExplanationMode::AvgPrediction(_) if draws.len() > 1 => {
            Some(mean_prediction(net, images.clone(), draws, layer_idx)?)
        }
        _ => None,
    };

    let mut total: Option<Tensor<B, 4>> = None;
    for &draw in draws {
        let weights = net.layer_weights(draw)?;
        let heatmaps = relevance(arch, &weights, images.clone(), rule, upto, classes.as_deref())?;
        total = Some(match total {
            Some(t) => t + heatmaps,
            None => heatmaps,
        });
    }
    let total = total.ok_or(CoreError::ZeroSamples)?;
    Ok(total.div_scalar(draws.len() as f32))
}

/// LRP heatmaps of `x`, one per image and of the same shape.
///
/// `layer_idx` selects the explained output as in
/// [`advbnn_models::Architecture::resolve_layer_idx`]: `-1` explains the
/// logits, smaller indices explain intermediate activations.
///
/// Sampled modes average the heatmaps of posterior draws `0..n`.
/// [`ExplanationMode::AvgPrediction`] explains the class of the mean
/// prediction in every draw; [`ExplanationMode::AvgHeatmap`] lets each draw
/// explain its own prediction. Deterministic networks are explained once
/// whatever the mode.
///
/// # Errors
///
/// Returns an error for zero samples, out-of-range layer indices, or if
/// relevance cannot be propagated.
pub fn compute_explanations<B, N>(
    x: &Array4<f32>,
    net: &N,
    rule: LrpRule,
    mode: ExplanationMode,
    layer_idx: i64,
    device: &B::Device,
) -> Result<Array4<f32>>
where
    B: AutodiffBackend,
    N: LayeredNet<B> + ?Sized,
{
    let draws = mode_draws(net, mode)?;
    let n = x.len_of(Axis(0));
    info!(
        rule = %rule,
        mode = ?mode,
        layer_idx,
        n_images = n,
        "Computing LRP explanations"
    );

    let mut batches = Vec::with_capacity(n.div_ceil(EXPLAIN_BATCH_SIZE));
    for start in (0..n).step_by(EXPLAIN_BATCH_SIZE) {
        let end = (start + EXPLAIN_BATCH_SIZE).min(n);
        let images = array4_to_tensor::<B>(&x.slice(s![start..end, .., .., ..]).to_owned(), device);
        let heatmaps = explain_batch(net, images, rule, mode, &draws, layer_idx)?;
        batches.push(tensor_to_array4(heatmaps)?);
        debug!(start, end, "explained batch");
    }

    if batches.is_empty() {
        return Ok(Array4::zeros(x.raw_dim()));
    }
    let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|e| ExplainError::Shape(e.to_string()))
}
