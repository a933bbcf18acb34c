//! Functional forward pass over an [`Architecture`] and explicit weights.

use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, relu, sigmoid, tanh};
use burn::tensor::module::{conv2d, max_pool2d};
use burn::tensor::ops::ConvOptions;

use crate::architecture::{Activation, Architecture, LayerSpec};
use crate::error::{ModelError, Result};

/// Weights of one learnable layer.
#[derive(Debug, Clone)]
pub enum LayerWeight<B: Backend> {
    /// Linear weight `(d_in, d_out)` and bias `(d_out,)`.
    Linear {
        /// Weight matrix.
        weight: Tensor<B, 2>,
        /// Bias vector.
        bias: Tensor<B, 1>,
    },
    /// Conv weight `(c_out, c_in, k, k)` and bias `(c_out,)`.
    Conv {
        /// Kernel.
        weight: Tensor<B, 4>,
        /// Bias vector.
        bias: Tensor<B, 1>,
    },
}

impl<B: Backend> LayerWeight<B> {
    /// Build layer weights from flat weight and bias vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `spec` is not learnable or the lengths don't match.
    pub fn from_flat(spec: &LayerSpec, weight: Tensor<B, 1>, bias: Tensor<B, 1>) -> Result<Self> {
        let (n_w, n_b) = spec.n_params();
        if weight.dims()[0] != n_w || bias.dims()[0] != n_b {
            return Err(ModelError::LayerMismatch(format!(
                "{spec:?} expects {n_w} weights and {n_b} biases, got {} and {}",
                weight.dims()[0],
                bias.dims()[0]
            )));
        }
        match *spec {
            LayerSpec::Linear { d_in, d_out } => Ok(LayerWeight::Linear {
                weight: weight.reshape([d_in, d_out]),
                bias,
            }),
            LayerSpec::Conv2d {
                c_in,
                c_out,
                kernel,
            } => Ok(LayerWeight::Conv {
                weight: weight.reshape([c_out, c_in, kernel, kernel]),
                bias,
            }),
            _ => Err(ModelError::LayerMismatch(format!(
                "{spec:?} has no weights"
            ))),
        }
    }

    /// Flatten into `(weight, bias)` vectors.
    #[must_use]
    pub fn into_flat(self) -> (Tensor<B, 1>, Tensor<B, 1>) {
        match self {
            LayerWeight::Linear { weight, bias } => {
                let n: usize = weight.dims().iter().product();
                (weight.reshape([n]), bias)
            }
            LayerWeight::Conv { weight, bias } => {
                let n: usize = weight.dims().iter().product();
                (weight.reshape([n]), bias)
            }
        }
    }
}

/// Weights of every learnable layer, in architecture order.
pub type LayerWeights<B> = Vec<LayerWeight<B>>;

/// Activations flowing between layers.
#[derive(Debug, Clone)]
pub enum Features<B: Backend> {
    /// Image-shaped `(N, C, H, W)`.
    Spatial(Tensor<B, 4>),
    /// Flat `(N, D)`.
    Flat(Tensor<B, 2>),
}

impl<B: Backend> Features<B> {
    /// Flatten to `(N, D)`.
    #[must_use]
    pub fn into_flat(self) -> Tensor<B, 2> {
        match self {
            Features::Flat(t) => t,
            Features::Spatial(t) => {
                let [n, c, h, w] = t.dims();
                t.reshape([n, c * h * w])
            }
        }
    }

    /// Number of values per example.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Features::Flat(t) => t.dims()[1],
            Features::Spatial(t) => {
                let [_, c, h, w] = t.dims();
                c * h * w
            }
        }
    }
}

/// Apply an activation to a tensor of any rank.
pub fn activate<B: Backend, const D: usize>(activation: Activation, x: Tensor<B, D>) -> Tensor<B, D> {
    match activation {
        Activation::Relu => relu(x),
        Activation::Leaky => leaky_relu(x, 0.01),
        Activation::Sigm => sigmoid(x),
        Activation::Tanh => tanh(x),
    }
}

/// Apply one linear layer to `(N, d_in)` inputs.
pub fn linear<B: Backend>(x: Tensor<B, 2>, weight: Tensor<B, 2>, bias: Tensor<B, 1>) -> Tensor<B, 2> {
    x.matmul(weight) + bias.unsqueeze::<2>()
}

/// Apply one valid stride-1 convolution.
pub fn conv<B: Backend>(x: Tensor<B, 4>, weight: Tensor<B, 4>, bias: Tensor<B, 1>) -> Tensor<B, 4> {
    conv2d(x, weight, Some(bias), ConvOptions::new([1, 1], [0, 0], [1, 1], 1))
}

/// Apply square max pooling.
pub fn max_pool<B: Backend>(x: Tensor<B, 4>, kernel: usize, stride: usize) -> Tensor<B, 4> {
    max_pool2d(x, [kernel, kernel], [stride, stride], [0, 0], [1, 1])
}

/// Apply a single layer.
///
/// `weight` must be `Some` exactly for learnable layers.
///
/// # Errors
///
/// Returns an error if weights are missing or of the wrong kind, or a
/// spatial layer receives flat features.
pub fn apply_layer<B: Backend>(
    spec: &LayerSpec,
    weight: Option<&LayerWeight<B>>,
    x: Features<B>,
) -> Result<Features<B>> {
    match (spec, weight, x) {
        (LayerSpec::Flatten, _, x) => Ok(Features::Flat(x.into_flat())),
        (LayerSpec::Activation(act), _, Features::Flat(t)) => Ok(Features::Flat(activate(*act, t))),
        (LayerSpec::Activation(act), _, Features::Spatial(t)) => {
            Ok(Features::Spatial(activate(*act, t)))
        }
        (LayerSpec::Linear { .. }, Some(LayerWeight::Linear { weight, bias }), x) => Ok(
            Features::Flat(linear(x.into_flat(), weight.clone(), bias.clone())),
        ),
        (LayerSpec::Conv2d { .. }, Some(LayerWeight::Conv { weight, bias }), Features::Spatial(t)) => {
            Ok(Features::Spatial(conv(t, weight.clone(), bias.clone())))
        }
        (LayerSpec::MaxPool2d { kernel, stride }, _, Features::Spatial(t)) => {
            Ok(Features::Spatial(max_pool(t, *kernel, *stride)))
        }
        (spec, _, x) => Err(ModelError::LayerMismatch(format!(
            "cannot apply {spec:?} to {} features",
            match x {
                Features::Flat(_) => "flat",
                Features::Spatial(_) => "spatial",
            }
        ))),
    }
}

/// Run the first `upto` layers of `arch`.
///
/// # Errors
///
/// Returns an error if the weights don't match the architecture.
pub fn forward_layers<B: Backend>(
    arch: &Architecture,
    weights: &[LayerWeight<B>],
    x: Tensor<B, 4>,
    upto: usize,
) -> Result<Features<B>> {
    let n_learnable = arch.learnable_positions().len();
    if weights.len() != n_learnable {
        return Err(ModelError::LayerMismatch(format!(
            "architecture has {n_learnable} learnable layers, got {} weights",
            weights.len()
        )));
    }

    let mut features = Features::Spatial(x);
    let mut next_weight = 0;
    for spec in arch.layers.iter().take(upto) {
        let weight = if spec.is_learnable() {
            next_weight += 1;
            Some(&weights[next_weight - 1])
        } else {
            None
        };
        features = apply_layer(spec, weight, features)?;
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::ArchKind;
    use advbnn_core::tensor::tensor_to_vec;
    use advbnn_core::ImageShape;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_linear_matches_manual() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0]], &device);
        let w = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, -1.0], [0.5, 1.0, 2.0]], &device);
        let b = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 0.0], &device);
        let y = tensor_to_vec(linear(x, w, b)).unwrap();
        assert_eq!(y, vec![2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_conv_arch_output_shape() {
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
        let weights: LayerWeights<TestBackend> = arch
            .learnable_layers()
            .iter()
            .map(|spec| {
                let (n_w, n_b) = spec.n_params();
                LayerWeight::from_flat(
                    spec,
                    Tensor::zeros([n_w], &device),
                    Tensor::ones([n_b], &device),
                )
                .unwrap()
            })
            .collect();

        let x = Tensor::<TestBackend, 4>::zeros([2, 1, 28, 28], &device);
        let features = forward_layers(&arch, &weights, x.clone(), 5).unwrap();
        match features {
            Features::Spatial(t) => assert_eq!(t.dims(), [2, 16, 8, 8]),
            Features::Flat(_) => panic!("expected spatial features"),
        }
        let logits = forward_layers(&arch, &weights, x, arch.n_layers()).unwrap().into_flat();
        assert_eq!(logits.dims(), [2, 10]);
    }

    #[test]
    fn test_weight_count_mismatch() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let arch = Architecture::build(
            ArchKind::Fc,
            Activation::Relu,
            ImageShape::new(1, 4, 4),
            2,
            16,
            "synthetic",
        )
        .unwrap();
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 4, 4], &device);
        assert!(forward_layers::<TestBackend>(&arch, &[], x, 4).is_err());
    }

    #[test]
    fn test_flat_roundtrip() {
        let device = Default::default();
        let spec = LayerSpec::Linear { d_in: 2, d_out: 3 };
        let w = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &device);
        let b = Tensor::<TestBackend, 1>::zeros([3], &device);
        let layer = LayerWeight::from_flat(&spec, w, b.clone()).unwrap();
        let (flat, _) = layer.into_flat();
        assert_eq!(tensor_to_vec(flat).unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(LayerWeight::<TestBackend>::from_flat(&LayerSpec::Flatten, b.clone(), b).is_err());
    }
}
