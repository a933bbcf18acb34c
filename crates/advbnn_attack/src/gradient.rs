//! Signs of input gradients of the classification loss.

use advbnn_core::tensor::sign;
use advbnn_core::WeightDraw;
use advbnn_models::LayeredNet;
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{AttackError, Result};

/// Cross-entropy summed over the batch, so each image gets its own
/// gradient regardless of the batch size.
fn summed_cross_entropy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [n, _] = logits.dims();
    let picked = log_softmax(logits, 1).gather(1, labels.reshape([n, 1]));
    picked.sum().neg()
}

/// `sign(∇ₓ L)` averaged over `draws`.
///
/// With one draw this is the usual gradient sign; with several posterior
/// samples each entry lies in `[-1, 1]`.
///
/// # Errors
///
/// Returns an error if `draws` is empty or the forward pass fails.
pub fn loss_gradient_sign<B, N>(
    net: &N,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    draws: &[WeightDraw],
) -> Result<Tensor<B, 4>>
where
    B: AutodiffBackend,
    N: LayeredNet<B> + ?Sized,
{
    if draws.is_empty() {
        return Err(AttackError::InvalidInput("no weight draws".to_string()));
    }
    let mut total: Option<Tensor<B, 4>> = None;
    for &draw in draws {
        let x = images.clone().detach().require_grad();
        let logits = net.logits(x.clone(), draw)?;
        let grads = summed_cross_entropy(logits, labels.clone()).backward();
        let grad = x.grad(&grads).ok_or(AttackError::MissingGradient)?;
        let grad_sign = sign(Tensor::<B, 4>::from_inner(grad));
        total = Some(match total {
            Some(acc) => acc + grad_sign,
            None => grad_sign,
        });
    }
    total
        .map(|t| t.div_scalar(draws.len() as f32))
        .ok_or(AttackError::MissingGradient)
}

/// The draws an attack differentiates through.
///
/// Deterministic networks always use their single set of weights.
///
/// # Errors
///
/// Returns an error for invalid sample specs.
pub fn attack_draws<B, N>(net: &N, spec: &advbnn_core::SampleSpec) -> Result<Vec<WeightDraw>>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    let draws = spec.draws()?;
    if net.is_bayesian() {
        Ok(draws)
    } else {
        Ok(vec![WeightDraw::Mean])
    }
}
