//! Accuracy of trained networks.

use advbnn_core::tensor::argmax_rows;
use advbnn_core::SampleSpec;
use advbnn_data::ImageLoader;
use advbnn_models::{predictive, LayeredNet};
use burn::prelude::*;

use crate::error::Result;

/// Top-1 accuracy in percent of `net` on every image of `loader`.
///
/// Bayesian networks predict with the mean of the predictive distribution
/// over the draws of `spec`.
///
/// # Errors
///
/// Returns an error if `spec` is invalid or the forward pass fails.
pub fn evaluate_accuracy<B, N>(
    net: &N,
    loader: &ImageLoader,
    spec: &SampleSpec,
    device: &B::Device,
) -> Result<f32>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    let mut correct = 0usize;
    let mut total = 0usize;
    for batch in loader.iter::<B>(device, 0) {
        let [batch_size] = batch.labels.dims();
        let probs = predictive(net, batch.images, spec)?;
        let hits: i64 = argmax_rows(probs)
            .equal(batch.labels)
            .int()
            .sum()
            .into_scalar()
            .elem();
        correct += hits as usize;
        total += batch_size;
    }
    if total == 0 {
        return Ok(0.0);
    }
    Ok(100.0 * correct as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use advbnn_core::ImageShape;
    use advbnn_data::ImageDataset;
    use advbnn_models::{base_settings, BaseNet};
    use burn_ndarray::NdArray;
    use ndarray::Array4;

    #[test]
    fn test_accuracy_is_a_percentage() {
        let device = Default::default();
        let net =
            BaseNet::<NdArray>::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, &device)
                .unwrap();
        let classes: Vec<usize> = (0..20).map(|i| i % 10).collect();
        let dataset = ImageDataset::from_classes(Array4::zeros((20, 1, 28, 28)), &classes, 10).unwrap();
        let loader = ImageLoader::builder(dataset).batch_size(8).build().unwrap();

        let acc = evaluate_accuracy(&net, &loader, &SampleSpec::Deterministic, &device).unwrap();
        // constant input: one predicted class, which matches 2 of 20 labels
        assert!((acc - 10.0).abs() < 1e-4);
    }
}
