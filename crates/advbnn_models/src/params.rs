//! Learnable parameters of a deterministic network.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use crate::architecture::{Architecture, LayerSpec};
use crate::error::{ModelError, Result};
use crate::forward::{LayerWeight, LayerWeights};

/// Weights of every learnable layer of an [`Architecture`].
///
/// Linear and conv layers are kept in two lists, each in architecture
/// order; [`NetParams::weights`] interleaves them back.
#[derive(Module, Debug)]
pub struct NetParams<B: Backend> {
    /// Linear layers in order.
    pub linears: Vec<Linear<B>>,
    /// Conv layers in order.
    pub convs: Vec<Conv2d<B>>,
}

impl<B: Backend> NetParams<B> {
    /// Initialize fresh parameters with burn's default initializers.
    pub fn init(arch: &Architecture, device: &B::Device) -> Self {
        let mut linears = Vec::new();
        let mut convs = Vec::new();
        for spec in &arch.layers {
            match *spec {
                LayerSpec::Linear { d_in, d_out } => {
                    linears.push(LinearConfig::new(d_in, d_out).init(device));
                }
                LayerSpec::Conv2d {
                    c_in,
                    c_out,
                    kernel,
                } => convs.push(Conv2dConfig::new([c_in, c_out], [kernel, kernel]).init(device)),
                _ => {}
            }
        }
        Self { linears, convs }
    }

    /// Current weights, in architecture order.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters don't match `arch`.
    pub fn weights(&self, arch: &Architecture) -> Result<LayerWeights<B>> {
        let mut linears = self.linears.iter();
        let mut convs = self.convs.iter();
        let mut weights = Vec::new();
        for spec in arch.learnable_layers() {
            let weight = match spec {
                LayerSpec::Linear { .. } => linears.next().map(|l| {
                    let weight = l.weight.val();
                    let [_, d_out] = weight.dims();
                    LayerWeight::Linear {
                        bias: bias_or_zeros(l.bias.as_ref(), d_out, &weight.device()),
                        weight,
                    }
                }),
                LayerSpec::Conv2d { .. } => convs.next().map(|c| {
                    let weight = c.weight.val();
                    let [c_out, _, _, _] = weight.dims();
                    LayerWeight::Conv {
                        bias: bias_or_zeros(c.bias.as_ref(), c_out, &weight.device()),
                        weight,
                    }
                }),
                _ => None,
            };
            weights.push(weight.ok_or_else(|| {
                ModelError::LayerMismatch(format!("missing parameters for {spec:?}"))
            })?);
        }
        Ok(weights)
    }

    /// Replace the last linear layer's weight and bias.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no linear layer or shapes differ.
    pub fn with_last_linear(mut self, weight: Tensor<B, 2>, bias: Tensor<B, 1>) -> Result<Self> {
        let last = self
            .linears
            .last_mut()
            .ok_or_else(|| ModelError::LayerMismatch("no linear layer".to_string()))?;
        if last.weight.dims() != weight.dims() {
            return Err(ModelError::LayerMismatch(format!(
                "last layer weight is {:?}, got {:?}",
                last.weight.dims(),
                weight.dims()
            )));
        }
        last.weight = Param::from_tensor(weight);
        last.bias = Some(Param::from_tensor(bias));
        Ok(self)
    }
}

fn bias_or_zeros<B: Backend>(
    bias: Option<&Param<Tensor<B, 1>>>,
    len: usize,
    device: &B::Device,
) -> Tensor<B, 1> {
    bias.map(Param::val)
        .unwrap_or_else(|| Tensor::zeros([len], device))
}
