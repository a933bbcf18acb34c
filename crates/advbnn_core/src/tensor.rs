//! Conversions between host `ndarray` arrays and burn tensors.
//!
//! Datasets, attacks and heatmaps live on the host as `ndarray` arrays and
//! move to the backend one batch at a time.

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::{Array2, Array4};

use crate::error::{CoreError, Result};

/// Upload a `(N, C, H, W)` array as a 4D tensor.
pub fn array4_to_tensor<B: Backend>(array: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let shape = array.shape().to_vec();
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Upload a `(N, D)` array as a 2D tensor.
pub fn array2_to_tensor<B: Backend>(array: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let shape = array.shape().to_vec();
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Read any tensor back as a flat `f32` vector.
///
/// # Errors
///
/// Returns an error if the backend data cannot be read as `f32`.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::TensorData(format!("{e:?}")))
}

/// Download a 4D tensor into a `(N, C, H, W)` array.
///
/// # Errors
///
/// Returns an error if the data cannot be read back.
pub fn tensor_to_array4<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array4<f32>> {
    let [n, c, h, w] = tensor.dims();
    let values = tensor_to_vec(tensor)?;
    Array4::from_shape_vec((n, c, h, w), values).map_err(|e| CoreError::InvalidShape {
        expected: format!("({n}, {c}, {h}, {w})"),
        got: e.to_string(),
    })
}

/// Download a 2D tensor into an `(N, D)` array.
///
/// # Errors
///
/// Returns an error if the data cannot be read back.
pub fn tensor_to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [n, d] = tensor.dims();
    let values = tensor_to_vec(tensor)?;
    Array2::from_shape_vec((n, d), values).map_err(|e| CoreError::InvalidShape {
        expected: format!("({n}, {d})"),
        got: e.to_string(),
    })
}

/// Read an integer tensor back as `usize` values.
///
/// # Errors
///
/// Returns an error if the backend data cannot be read back.
pub fn int_tensor_to_vec<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| CoreError::TensorData(format!("{e:?}")))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

/// Element-wise sign with `sign(0) = 0`.
pub fn sign<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let positive = tensor.clone().greater_elem(0.0).float();
    let negative = tensor.lower_elem(0.0).float();
    positive - negative
}

/// Element-wise sign with `sign(0) = 1`, used to stabilise denominators.
pub fn sign_nonzero<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let negative = tensor.lower_elem(0.0).float();
    negative.mul_scalar(-2.0).add_scalar(1.0)
}

/// Row-wise argmax of a `(N, K)` tensor.
pub fn argmax_rows<B: Backend>(tensor: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [n, _] = tensor.dims();
    tensor.argmax(1).reshape([n])
}

/// One-hot `(N, K)` float mask from class indices.
pub fn one_hot<B: Backend>(classes: &[usize], n_classes: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; classes.len() * n_classes];
    for (row, &class) in classes.iter().enumerate() {
        if class < n_classes {
            values[row * n_classes + class] = 1.0;
        }
    }
    Tensor::from_data(TensorData::new(values, [classes.len(), n_classes]), device)
}

/// Class indices of one-hot label rows.
#[must_use]
pub fn labels_from_one_hot(labels: &Array2<f32>) -> Vec<usize> {
    labels
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}
