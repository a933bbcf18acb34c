//! Architecture descriptors.
//!
//! An [`Architecture`] is an ordered list of [`LayerSpec`]s. Learnable layers
//! (linear and conv) carry their weight shapes; the weights themselves live
//! in the network types and are passed to [`crate::forward`] separately, so
//! deterministic and Bayesian networks share one forward pass.

use std::fmt;
use std::str::FromStr;

use advbnn_core::ImageShape;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Elementwise activation between learnable layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified linear unit.
    Relu,
    /// Leaky ReLU with slope 0.01.
    Leaky,
    /// Logistic sigmoid.
    Sigm,
    /// Hyperbolic tangent.
    Tanh,
}

impl Activation {
    /// Name used in settings and model names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Leaky => "leaky",
            Activation::Sigm => "sigm",
            Activation::Tanh => "tanh",
        }
    }
}

impl FromStr for Activation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Activation::Relu),
            "leaky" => Ok(Activation::Leaky),
            "sigm" => Ok(Activation::Sigm),
            "tanh" => Ok(Activation::Tanh),
            other => Err(ModelError::InvalidActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchKind {
    /// One hidden linear layer.
    Fc,
    /// Two hidden linear layers.
    Fc2,
    /// Four hidden linear layers.
    Fc4,
    /// Two conv + max-pool blocks and a linear head.
    Conv,
}

impl ArchKind {
    /// Name used in settings and model names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ArchKind::Fc => "fc",
            ArchKind::Fc2 => "fc2",
            ArchKind::Fc4 => "fc4",
            ArchKind::Conv => "conv",
        }
    }
}

impl FromStr for ArchKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fc" => Ok(ArchKind::Fc),
            "fc2" => Ok(ArchKind::Fc2),
            "fc4" => Ok(ArchKind::Fc4),
            "conv" => Ok(ArchKind::Conv),
            other => Err(ModelError::InvalidArchitecture(other.to_string())),
        }
    }
}

impl fmt::Display for ArchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One layer of a sequential network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerSpec {
    /// Flatten `(N, C, H, W)` to `(N, C*H*W)`.
    Flatten,
    /// Affine layer with weight `(d_in, d_out)`.
    Linear {
        /// Input features.
        d_in: usize,
        /// Output features.
        d_out: usize,
    },
    /// Valid (unpadded) stride-1 convolution with weight `(c_out, c_in, k, k)`.
    Conv2d {
        /// Input channels.
        c_in: usize,
        /// Output channels.
        c_out: usize,
        /// Square kernel size.
        kernel: usize,
    },
    /// Elementwise activation.
    Activation(Activation),
    /// Square max pooling.
    MaxPool2d {
        /// Window size.
        kernel: usize,
        /// Stride.
        stride: usize,
    },
}

impl LayerSpec {
    /// Whether the layer has weights.
    #[must_use]
    pub const fn is_learnable(&self) -> bool {
        matches!(self, LayerSpec::Linear { .. } | LayerSpec::Conv2d { .. })
    }

    /// Number of weight and bias values, `(0, 0)` for parameter-free layers.
    #[must_use]
    pub const fn n_params(&self) -> (usize, usize) {
        match *self {
            LayerSpec::Linear { d_in, d_out } => (d_in * d_out, d_out),
            LayerSpec::Conv2d {
                c_in,
                c_out,
                kernel,
            } => (c_out * c_in * kernel * kernel, c_out),
            _ => (0, 0),
        }
    }
}

/// A complete network layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    /// Architecture family.
    pub kind: ArchKind,
    /// Activation between learnable layers.
    pub activation: Activation,
    /// Shape of one input image.
    pub input_shape: ImageShape,
    /// Number of output classes.
    pub n_classes: usize,
    /// Hidden width (conv channels for the second conv block).
    pub hidden_size: usize,
    /// Ordered layers.
    pub layers: Vec<LayerSpec>,
}

impl Architecture {
    /// Build the layer list of an architecture family.
    ///
    /// # Errors
    ///
    /// - [`ModelError::InvalidHiddenSize`] unless `hidden_size` is a power of two ≥ 16
    /// - [`ModelError::NotImplemented`] for `conv` outside single-channel 28×28 datasets
    pub fn build(
        kind: ArchKind,
        activation: Activation,
        input_shape: ImageShape,
        n_classes: usize,
        hidden_size: usize,
        dataset: &str,
    ) -> Result<Self> {
        if !hidden_size.is_power_of_two() || hidden_size < 16 {
            return Err(ModelError::InvalidHiddenSize(hidden_size));
        }

        let input_size = input_shape.n_pixels();
        let h = hidden_size;
        let act = LayerSpec::Activation(activation);
        let layers = match kind {
            ArchKind::Fc => vec![
                LayerSpec::Flatten,
                LayerSpec::Linear { d_in: input_size, d_out: h },
                act,
                LayerSpec::Linear { d_in: h, d_out: n_classes },
            ],
            ArchKind::Fc2 => vec![
                LayerSpec::Flatten,
                LayerSpec::Linear { d_in: input_size, d_out: h },
                act,
                LayerSpec::Linear { d_in: h, d_out: h },
                act,
                LayerSpec::Linear { d_in: h, d_out: n_classes },
            ],
            ArchKind::Fc4 => {
                let mut layers = vec![
                    LayerSpec::Flatten,
                    LayerSpec::Linear { d_in: input_size, d_out: h },
                    act,
                ];
                for _ in 0..3 {
                    layers.push(LayerSpec::Linear { d_in: h, d_out: h });
                    layers.push(act);
                }
                layers.push(LayerSpec::Linear { d_in: h, d_out: n_classes });
                layers
            }
            ArchKind::Conv => {
                let supported = matches!(dataset, "mnist" | "fashion_mnist" | "synthetic");
                if !supported || input_shape.height != 28 || input_shape.width != 28 {
                    return Err(ModelError::NotImplemented(format!(
                        "conv architecture on dataset {dataset} with input {input_shape}"
                    )));
                }
                // 28 -conv5-> 24 -pool2-> 12 -conv5-> 8 -pool2,s1-> 7
                vec![
                    LayerSpec::Conv2d { c_in: input_shape.channels, c_out: 16, kernel: 5 },
                    act,
                    LayerSpec::MaxPool2d { kernel: 2, stride: 2 },
                    LayerSpec::Conv2d { c_in: 16, c_out: h, kernel: 5 },
                    act,
                    LayerSpec::MaxPool2d { kernel: 2, stride: 1 },
                    LayerSpec::Flatten,
                    LayerSpec::Linear { d_in: h * 7 * 7, d_out: n_classes },
                ]
            }
        };

        Ok(Self {
            kind,
            activation,
            input_shape,
            n_classes,
            hidden_size,
            layers,
        })
    }

    /// Total number of layers, learnable or not.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Positions of the learnable layers.
    #[must_use]
    pub fn learnable_positions(&self) -> Vec<usize> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_learnable())
            .map(|(i, _)| i)
            .collect()
    }

    /// Specs of the learnable layers, in order.
    #[must_use]
    pub fn learnable_layers(&self) -> Vec<LayerSpec> {
        self.layers.iter().copied().filter(LayerSpec::is_learnable).collect()
    }

    /// Total number of weights and biases.
    #[must_use]
    pub fn n_params(&self) -> usize {
        self.layers
            .iter()
            .map(|l| {
                let (w, b) = l.n_params();
                w + b
            })
            .sum()
    }

    /// Input width of the final linear layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the architecture does not end in a linear layer.
    pub fn feature_size(&self) -> Result<usize> {
        match self.layers.last() {
            Some(LayerSpec::Linear { d_in, .. }) => Ok(*d_in),
            other => Err(ModelError::LayerMismatch(format!(
                "last layer should be linear, got {other:?}"
            ))),
        }
    }

    /// Number of leading layers to run for a layer index.
    ///
    /// `-1` selects the full network, other negative indices count from the
    /// end (`-2` drops the last layer), non-negative indices count from the
    /// start (`0` keeps only the first layer).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::LayerIndex`] when `|idx| > n_layers`.
    pub fn resolve_layer_idx(&self, idx: i64) -> Result<usize> {
        let n = self.n_layers();
        if idx.unsigned_abs() as usize > n {
            return Err(ModelError::LayerIndex { idx, n_layers: n });
        }
        let upto = if idx < 0 {
            n as i64 + idx + 1
        } else {
            idx + 1
        };
        Ok(upto.clamp(0, n as i64) as usize)
    }
}
