//! Layer-wise relevance propagation through a sequential network.
//!
//! The forward pass records the input of every layer. Relevance then flows
//! backwards: activations pass it through unchanged, flatten reshapes it,
//! learnable layers redistribute it with an [`LrpRule`] and max-pooling
//! routes it to the pooled inputs.
//!
//! Every rule only needs `z = op(x, W) + b` and its transpose
//! `s ↦ ∂⟨op(x, W), s⟩/∂x`. Linear layers provide the transpose in closed
//! form; convolutions and pooling get it from autodiff.

use advbnn_core::tensor::{argmax_rows, int_tensor_to_vec, one_hot, sign_nonzero};
use advbnn_models::forward::{apply_layer, conv, max_pool};
use advbnn_models::{Architecture, Features, LayerSpec, LayerWeight};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{ExplainError, Result};
use crate::rules::{LrpRule, ALPHA_BETA_STABILIZER, EPSILON, GAMMA, GAMMA_STABILIZER};

/// Stabiliser of max-pool relevance routing.
const POOL_STABILIZER: f32 = 1e-9;

/// Which part of the weights a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
enum WeightPart {
    Full,
    Gamma(f32),
    Positive,
    Negative,
}

impl WeightPart {
    fn weight<B: Backend, const D: usize>(self, w: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            WeightPart::Full => w,
            WeightPart::Gamma(gamma) => w.clone() + w.clamp_min(0.0).mul_scalar(gamma),
            WeightPart::Positive => w.clamp_min(0.0),
            WeightPart::Negative => w.clamp_max(0.0),
        }
    }

    fn bias<B: Backend>(self, b: Tensor<B, 1>) -> Tensor<B, 1> {
        match self {
            WeightPart::Full => b,
            WeightPart::Gamma(gamma) => b.clone() + b.clamp_min(0.0).mul_scalar(gamma),
            WeightPart::Positive | WeightPart::Negative => b.zeros_like(),
        }
    }
}

/// An affine layer `z = op(x, W) + b`.
trait AffineOp<B: AutodiffBackend, const D: usize> {
    fn forward(&self, x: Tensor<B, D>, part: WeightPart, with_bias: bool) -> Tensor<B, D>;

    fn transpose(&self, x: &Tensor<B, D>, s: Tensor<B, D>, part: WeightPart) -> Result<Tensor<B, D>>;
}

struct LinearOp<B: Backend> {
    weight: Tensor<B, 2>,
    bias: Tensor<B, 1>,
}

impl<B: AutodiffBackend> AffineOp<B, 2> for LinearOp<B> {
    fn forward(&self, x: Tensor<B, 2>, part: WeightPart, with_bias: bool) -> Tensor<B, 2> {
        let z = x.matmul(part.weight(self.weight.clone()));
        if with_bias {
            z + part.bias(self.bias.clone()).unsqueeze::<2>()
        } else {
            z
        }
    }

    fn transpose(&self, _x: &Tensor<B, 2>, s: Tensor<B, 2>, part: WeightPart) -> Result<Tensor<B, 2>> {
        Ok(s.matmul(part.weight(self.weight.clone()).transpose()))
    }
}

struct ConvOp<B: Backend> {
    weight: Tensor<B, 4>,
    bias: Tensor<B, 1>,
}

impl<B: AutodiffBackend> AffineOp<B, 4> for ConvOp<B> {
    fn forward(&self, x: Tensor<B, 4>, part: WeightPart, with_bias: bool) -> Tensor<B, 4> {
        let bias = if with_bias {
            part.bias(self.bias.clone())
        } else {
            self.bias.zeros_like()
        };
        conv(x, part.weight(self.weight.clone()), bias)
    }

    fn transpose(&self, x: &Tensor<B, 4>, s: Tensor<B, 4>, part: WeightPart) -> Result<Tensor<B, 4>> {
        let xg = x.clone().detach().require_grad();
        let z = self.forward(xg.clone(), part, false);
        input_gradient(&xg, (z * s.detach()).sum())
    }
}

fn input_gradient<B: AutodiffBackend, const D: usize>(x: &Tensor<B, D>, objective: Tensor<B, 1>) -> Result<Tensor<B, D>> {
    let grads = objective.backward();
    let grad = x
        .grad(&grads)
        .ok_or_else(|| ExplainError::Propagation("no gradient reached the layer input".to_string()))?;
    Ok(Tensor::from_inner(grad))
}

fn stabilize<B: Backend, const D: usize>(z: Tensor<B, D>, eps: f32) -> Tensor<B, D> {
    z.clone() + sign_nonzero(z).mul_scalar(eps)
}

fn z_rule<B, O, const D: usize>(op: &O, x: Tensor<B, D>, r: Tensor<B, D>, part: WeightPart, eps: f32) -> Result<Tensor<B, D>>
where
    B: AutodiffBackend,
    O: AffineOp<B, D>,
{
    let z = op.forward(x.clone(), part, true);
    let s = r / stabilize(z, eps);
    let c = op.transpose(&x, s, part)?;
    Ok(x * c)
}

fn alpha_beta_term<B, O, const D: usize>(op: &O, x1: Tensor<B, D>, x2: Tensor<B, D>, r: Tensor<B, D>) -> Result<Tensor<B, D>>
where
    B: AutodiffBackend,
    O: AffineOp<B, D>,
{
    let z = op.forward(x1.clone(), WeightPart::Positive, false)
        + op.forward(x2.clone(), WeightPart::Negative, false);
    let zero = z.clone().equal_elem(0.0).float().mul_scalar(ALPHA_BETA_STABILIZER);
    let s = r / (z + zero);
    let c1 = op.transpose(&x1, s.clone(), WeightPart::Positive)?;
    let c2 = op.transpose(&x2, s, WeightPart::Negative)?;
    Ok(x1 * c1 + x2 * c2)
}

fn rule_relevance<B, O, const D: usize>(op: &O, rule: LrpRule, x: Tensor<B, D>, r: Tensor<B, D>) -> Result<Tensor<B, D>>
where
    B: AutodiffBackend,
    O: AffineOp<B, D>,
{
    match (rule, rule.alpha_beta()) {
        (LrpRule::Epsilon, _) => z_rule(op, x, r, WeightPart::Full, EPSILON),
        (LrpRule::Gamma, _) => z_rule(op, x, r, WeightPart::Gamma(GAMMA), GAMMA_STABILIZER),
        (_, Some((alpha, beta))) => {
            let x_pos = x.clone().clamp_min(0.0);
            let x_neg = x.clamp_max(0.0);
            let positive = alpha_beta_term(op, x_pos.clone(), x_neg.clone(), r.clone())?;
            if beta == 0.0 {
                return Ok(positive.mul_scalar(alpha));
            }
            let negative = alpha_beta_term(op, x_neg, x_pos, r)?;
            Ok(positive.mul_scalar(alpha) - negative.mul_scalar(beta))
        }
        (rule, None) => Err(ExplainError::NotImplemented(format!("rule {rule}"))),
    }
}

fn pool_relevance<B: AutodiffBackend>(x: Tensor<B, 4>, r: Tensor<B, 4>, kernel: usize, stride: usize) -> Result<Tensor<B, 4>> {
    let xg = x.clone().detach().require_grad();
    let z = max_pool(xg.clone(), kernel, stride);
    let s = r / stabilize(z.clone().detach(), POOL_STABILIZER);
    let c = input_gradient(&xg, (z * s).sum())?;
    Ok(x * c)
}

fn detach_weight<B: Backend>(weight: LayerWeight<B>) -> LayerWeight<B> {
    match weight {
        LayerWeight::Linear { weight, bias } => LayerWeight::Linear {
            weight: weight.detach(),
            bias: bias.detach(),
        },
        LayerWeight::Conv { weight, bias } => LayerWeight::Conv {
            weight: weight.detach(),
            bias: bias.detach(),
        },
    }
}

fn reshape_like<B: Backend>(relevance: Features<B>, like: &Features<B>) -> Features<B> {
    match like {
        Features::Spatial(t) => {
            let dims = t.dims();
            Features::Spatial(relevance.into_flat().reshape(dims))
        }
        Features::Flat(_) => Features::Flat(relevance.into_flat()),
    }
}

fn spatial<B: Backend>(features: Features<B>, what: &str) -> Result<Tensor<B, 4>> {
    match features {
        Features::Spatial(t) => Ok(t),
        Features::Flat(_) => Err(ExplainError::Propagation(format!("{what} expects spatial relevance"))),
    }
}

/// Relevance of every input pixel for the first `upto` layers.
///
/// Relevance starts at the output as the value of the explained unit and
/// zero elsewhere. The explained unit of each image is `classes[i]` when
/// given, otherwise the argmax of the output.
///
/// # Errors
///
/// Returns an error if the weights don't fit the architecture or `classes`
/// has the wrong length.
pub fn relevance<B: AutodiffBackend>(
    arch: &Architecture,
    weights: &[LayerWeight<B>],
    x: Tensor<B, 4>,
    rule: LrpRule,
    upto: usize,
    classes: Option<&[usize]>,
) -> Result<Tensor<B, 4>> {
    let device = x.device();
    let [n, _, _, _] = x.dims();
    let upto = upto.min(arch.n_layers());
    let specs = &arch.layers[..upto];

    let weights: Vec<LayerWeight<B>> = weights.iter().cloned().map(detach_weight).collect();
    let mut inputs = Vec::with_capacity(upto);
    let mut layer_weights = Vec::with_capacity(upto);
    let mut learnable = weights.iter();
    let mut features = Features::Spatial(x.detach());
    for spec in specs {
        let weight = if spec.is_learnable() {
            Some(learnable.next().ok_or_else(|| {
                ExplainError::Propagation("fewer weights than learnable layers".to_string())
            })?)
        } else {
            None
        };
        inputs.push(features.clone());
        layer_weights.push(weight);
        features = apply_layer(spec, weight, features)?;
    }

    let output = features.clone().into_flat();
    let width = output.dims()[1];
    let classes = match classes {
        Some(classes) if classes.len() != n => {
            return Err(ExplainError::Shape(format!(
                "{} classes for {n} images",
                classes.len()
            )))
        }
        Some(classes) => classes.to_vec(),
        None => int_tensor_to_vec(argmax_rows(output.clone()))?,
    };
    let start = output * one_hot::<B>(&classes, width, &device);
    let mut r = reshape_like(Features::Flat(start), &features);

    for ((spec, input), weight) in specs.iter().zip(inputs).zip(layer_weights).rev() {
        r = match (spec, weight) {
            (LayerSpec::Flatten, _) | (LayerSpec::Activation(_), _) => reshape_like(r, &input),
            (LayerSpec::Linear { .. }, Some(LayerWeight::Linear { weight, bias })) => {
                let op = LinearOp {
                    weight: weight.clone(),
                    bias: bias.clone(),
                };
                let x = input.clone().into_flat();
                let r_in = rule_relevance(&op, rule, x, r.into_flat())?;
                reshape_like(Features::Flat(r_in), &input)
            }
            (LayerSpec::Conv2d { .. }, Some(LayerWeight::Conv { weight, bias })) => {
                let op = ConvOp {
                    weight: weight.clone(),
                    bias: bias.clone(),
                };
                let x = spatial(input, "conv")?;
                Features::Spatial(rule_relevance(&op, rule, x, spatial(r, "conv")?)?)
            }
            (LayerSpec::MaxPool2d { kernel, stride }, _) => {
                let x = spatial(input, "max-pool")?;
                Features::Spatial(pool_relevance(x, spatial(r, "max-pool")?, *kernel, *stride)?)
            }
            (spec, _) => {
                return Err(ExplainError::Propagation(format!(
                    "missing weights for {spec:?}"
                )))
            }
        };
    }

    match r {
        Features::Spatial(t) => Ok(t),
        Features::Flat(t) => Err(ExplainError::Propagation(format!(
            "relevance ended flat with shape {:?}",
            t.dims()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advbnn_core::tensor::tensor_to_vec;
    use advbnn_core::ImageShape;
    use advbnn_models::{Activation, ArchKind};
    use burn_autodiff::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn fc_arch() -> Architecture {
        Architecture::build(
            ArchKind::Fc2,
            Activation::Relu,
            ImageShape::new(1, 4, 4),
            3,
            16,
            "synthetic",
        )
        .unwrap()
    }

    fn bias_free_weights(arch: &Architecture, device: &<TestBackend as Backend>::Device) -> Vec<LayerWeight<TestBackend>> {
        arch.learnable_layers()
            .iter()
            .enumerate()
            .map(|(l, spec)| {
                let (n_w, n_b) = spec.n_params();
                let w: Vec<f32> = (0..n_w)
                    .map(|i| (((i * 7 + l * 3) % 11) as f32 - 4.0) / 10.0)
                    .collect();
                let w = Tensor::<TestBackend, 1>::from_data(TensorData::new(w, [n_w]), device);
                LayerWeight::from_flat(spec, w, Tensor::zeros([n_b], device)).unwrap()
            })
            .collect()
    }

    fn input(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        let values: Vec<f32> = (0..32).map(|i| ((i * 5) % 9) as f32 / 9.0).collect();
        Tensor::<TestBackend, 4>::from_data(TensorData::new(values, [2, 1, 4, 4]), device)
    }

    fn top_logits(arch: &Architecture, weights: &[LayerWeight<TestBackend>], x: Tensor<TestBackend, 4>) -> Vec<f32> {
        let logits = advbnn_models::forward::forward_layers(arch, weights, x, arch.n_layers())
            .unwrap()
            .into_flat();
        tensor_to_vec(logits.max_dim(1)).unwrap()
    }

    #[test]
    fn test_gamma_rule_conserves_relevance_without_bias() {
        let device = Default::default();
        let arch = fc_arch();
        let weights = bias_free_weights(&arch, &device);
        let x = input(&device);

        let top = top_logits(&arch, &weights, x.clone());
        let heatmaps = relevance(&arch, &weights, x, LrpRule::Gamma, arch.n_layers(), None).unwrap();
        assert_eq!(heatmaps.dims(), [2, 1, 4, 4]);

        let totals = tensor_to_vec(heatmaps.reshape([2, 16]).sum_dim(1)).unwrap();
        for (total, logit) in totals.iter().zip(&top) {
            assert!((total - logit).abs() <= 1e-3 * (1.0 + logit.abs()), "{total} vs {logit}");
        }
    }

    #[test]
    fn test_epsilon_rule_approximately_conserves_relevance() {
        let device = Default::default();
        let arch = fc_arch();
        let weights = bias_free_weights(&arch, &device);
        let x = input(&device).mul_scalar(20.0);

        let top = top_logits(&arch, &weights, x.clone());
        let heatmaps = relevance(&arch, &weights, x, LrpRule::Epsilon, arch.n_layers(), None).unwrap();
        let totals = tensor_to_vec(heatmaps.reshape([2, 16]).sum_dim(1)).unwrap();
        for (total, logit) in totals.iter().zip(&top) {
            assert!(total < logit);
            assert!((total - logit).abs() <= 0.05 * logit.abs(), "{total} vs {logit}");
        }
    }

    #[test]
    fn test_alpha1beta0_keeps_the_sign_of_the_output() {
        let device = Default::default();
        let arch = fc_arch();
        let weights = bias_free_weights(&arch, &device);
        let x = input(&device);

        let top = top_logits(&arch, &weights, x.clone());
        let heatmaps =
            relevance(&arch, &weights, x, LrpRule::Alpha1Beta0, arch.n_layers(), None).unwrap();
        let values = tensor_to_vec(heatmaps).unwrap();
        for (image, logit) in values.chunks(16).zip(&top) {
            assert!(image.iter().all(|v| v * logit >= -1e-6));
        }
    }

    #[test]
    fn test_conv_and_pool_layers() {
        let device = Default::default();
        let arch = Architecture::build(
            ArchKind::Conv,
            Activation::Relu,
            ImageShape::new(1, 28, 28),
            10,
            16,
            "mnist",
        )
        .unwrap();
        let weights: Vec<_> = arch
            .learnable_layers()
            .iter()
            .map(|spec| {
                let (n_w, n_b) = spec.n_params();
                let w: Vec<f32> = (0..n_w).map(|i| ((i % 13) as f32 - 6.0) / 50.0).collect();
                let w = Tensor::<TestBackend, 1>::from_data(TensorData::new(w, [n_w]), &device);
                LayerWeight::from_flat(spec, w, Tensor::zeros([n_b], &device)).unwrap()
            })
            .collect();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device).mul_scalar(0.5);

        for rule in LrpRule::ALL {
            let heatmaps = relevance(&arch, &weights, x.clone(), rule, arch.n_layers(), None).unwrap();
            assert_eq!(heatmaps.dims(), [1, 1, 28, 28]);
            assert!(tensor_to_vec(heatmaps).unwrap().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_truncated_network() {
        let device = Default::default();
        let arch = fc_arch();
        let weights = bias_free_weights(&arch, &device);
        let upto = arch.resolve_layer_idx(2).unwrap();
        let heatmaps = relevance(&arch, &weights, input(&device), LrpRule::Gamma, upto, None).unwrap();
        assert_eq!(heatmaps.dims(), [2, 1, 4, 4]);
    }

    #[test]
    fn test_class_count_mismatch() {
        let device = Default::default();
        let arch = fc_arch();
        let weights = bias_free_weights(&arch, &device);
        let err = relevance(&arch, &weights, input(&device), LrpRule::Epsilon, arch.n_layers(), Some(&[0]))
            .unwrap_err();
        assert!(matches!(err, ExplainError::Shape(_)));
    }
}
