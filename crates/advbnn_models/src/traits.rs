//! The common interface of deterministic and Bayesian networks.

use advbnn_core::{SampleSpec, WeightDraw};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::architecture::Architecture;
use crate::error::Result;
use crate::forward::{forward_layers, LayerWeights};

/// A sequential classifier whose weights can be materialised per draw.
///
/// Attacks and explanations only need the architecture and the weights of
/// one draw, so they work the same for every network family.
pub trait LayeredNet<B: Backend> {
    /// Layer layout.
    fn architecture(&self) -> &Architecture;

    /// Weights of every learnable layer for one draw.
    ///
    /// Deterministic networks ignore the draw.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be assembled.
    fn layer_weights(&self, draw: WeightDraw) -> Result<LayerWeights<B>>;

    /// Whether different draws give different weights.
    fn is_bayesian(&self) -> bool;

    /// Model name used for file names.
    fn name(&self) -> String;

    /// Flattened output of the first layers selected by `layer_idx`.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range layer indices.
    fn logits_upto(&self, x: Tensor<B, 4>, draw: WeightDraw, layer_idx: i64) -> Result<Tensor<B, 2>> {
        let arch = self.architecture();
        let upto = arch.resolve_layer_idx(layer_idx)?;
        let weights = self.layer_weights(draw)?;
        Ok(forward_layers(arch, &weights, x, upto)?.into_flat())
    }

    /// Logits of the full network.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be assembled.
    fn logits(&self, x: Tensor<B, 4>, draw: WeightDraw) -> Result<Tensor<B, 2>> {
        self.logits_upto(x, draw, -1)
    }
}

/// Predictive class probabilities.
///
/// Deterministic networks return the softmax of their logits. Bayesian
/// networks average the softmax over the draws of `spec`, or use the
/// posterior mean for [`SampleSpec::PosteriorMean`] and
/// [`SampleSpec::Deterministic`].
///
/// # Errors
///
/// Returns [`advbnn_core::CoreError::SampleCountMismatch`] (wrapped) when
/// explicit sample indices don't match the sample count.
pub fn predictive<B, N>(net: &N, x: Tensor<B, 4>, spec: &SampleSpec) -> Result<Tensor<B, 2>>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    let draws = spec.draws()?;
    let draws = if net.is_bayesian() {
        draws
    } else {
        vec![WeightDraw::Mean]
    };

    let n_draws = draws.len();
    let mut total: Option<Tensor<B, 2>> = None;
    for draw in draws {
        let probs = softmax(net.logits(x.clone(), draw)?, 1);
        total = Some(match total {
            Some(acc) => acc + probs,
            None => probs,
        });
    }
    match total {
        Some(total) => Ok(total.div_scalar(n_draws as f32)),
        None => Ok(softmax(net.logits(x, WeightDraw::Mean)?, 1)),
    }
}
