//! Accuracy and softmax robustness under attack.

use advbnn_core::tensor::{array4_to_tensor, argmax_rows, int_tensor_to_vec, tensor_to_array2};
use advbnn_core::SampleSpec;
use advbnn_models::{predictive, LayeredNet};
use burn::prelude::*;
use ndarray::{s, Array1, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AttackError, Result};

/// Result of evaluating a network on clean and attacked images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackEvaluation {
    /// Top-1 accuracy on the clean images, in percent.
    pub original_accuracy: f32,
    /// Top-1 accuracy on the attacks, in percent.
    pub adversarial_accuracy: f32,
    /// `1 - max_k |p_k(x) - p_k(x')|` per image.
    pub softmax_robustness: Vec<f32>,
    /// Images whose predicted class changed under attack.
    pub successful_idxs: Vec<usize>,
    /// Predicted class of each clean image.
    pub original_predictions: Vec<usize>,
    /// Predicted class of each attack.
    pub adversarial_predictions: Vec<usize>,
}

/// Per-row `1 - max_k |p_k - q_k|`.
#[must_use]
pub fn softmax_robustness(original: &Array2<f32>, adversarial: &Array2<f32>) -> Array1<f32> {
    (original - adversarial)
        .mapv(f32::abs)
        .map_axis(Axis(1), |row| 1.0 - row.iter().copied().fold(0.0, f32::max))
}

fn predict<B, N>(
    net: &N,
    x: &Array4<f32>,
    spec: &SampleSpec,
    batch_size: usize,
    device: &B::Device,
) -> Result<(Array2<f32>, Vec<usize>)>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    let n = x.len_of(Axis(0));
    let mut probs = Vec::new();
    let mut classes = Vec::with_capacity(n);
    for start in (0..n).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(n);
        let images = array4_to_tensor::<B>(&x.slice(s![start..end, .., .., ..]).to_owned(), device);
        let batch_probs = predictive(net, images, spec)?;
        classes.extend(int_tensor_to_vec(argmax_rows(batch_probs.clone()))?);
        probs.push(tensor_to_array2(batch_probs)?);
    }
    let views: Vec<_> = probs.iter().map(|p| p.view()).collect();
    let probs = if views.is_empty() {
        Array2::zeros((0, 0))
    } else {
        ndarray::concatenate(Axis(0), &views).map_err(|e| AttackError::InvalidInput(e.to_string()))?
    };
    Ok((probs, classes))
}

fn accuracy(predicted: &[usize], labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predicted.iter().zip(labels).filter(|(p, l)| p == l).count();
    100.0 * correct as f32 / labels.len() as f32
}

/// Evaluate `net` on clean images and their attacks.
///
/// Bayesian networks average the predictive over the draws of `spec`, which
/// always uses samples `0..n` unless explicit indices are given, so the
/// result is reproducible.
///
/// # Errors
///
/// Returns an error if the inputs disagree in shape or `spec` is invalid.
pub fn evaluate_attack<B, N>(
    net: &N,
    x: &Array4<f32>,
    x_attack: &Array4<f32>,
    labels: &[usize],
    spec: &SampleSpec,
    device: &B::Device,
) -> Result<AttackEvaluation>
where
    B: Backend,
    N: LayeredNet<B> + ?Sized,
{
    if x.shape() != x_attack.shape() || x.len_of(Axis(0)) != labels.len() {
        return Err(AttackError::InvalidInput(format!(
            "images {:?}, attacks {:?} and {} labels disagree",
            x.shape(),
            x_attack.shape(),
            labels.len()
        )));
    }
    let batch_size = 128;
    let (original_probs, original_classes) = predict(net, x, spec, batch_size, device)?;
    let (adversarial_probs, adversarial_classes) = predict(net, x_attack, spec, batch_size, device)?;

    let original_accuracy = accuracy(&original_classes, labels);
    let adversarial_accuracy = accuracy(&adversarial_classes, labels);
    let softmax_robustness = if labels.is_empty() {
        Vec::new()
    } else {
        softmax_robustness(&original_probs, &adversarial_probs).to_vec()
    };
    let successful_idxs = original_classes
        .iter()
        .zip(&adversarial_classes)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect();

    info!(
        spec = %spec,
        original_accuracy,
        adversarial_accuracy,
        "Evaluated against the attacks"
    );
    Ok(AttackEvaluation {
        original_accuracy,
        adversarial_accuracy,
        softmax_robustness,
        successful_idxs,
        original_predictions: original_classes,
        adversarial_predictions: adversarial_classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use advbnn_core::{ImageShape, Seed};
    use advbnn_models::{base_settings, full_bnn_settings, BaseNet, FullBnn};
    use burn_ndarray::NdArray;
    use ndarray::array;

    #[test]
    fn test_softmax_robustness() {
        let p = array![[0.9, 0.1], [0.5, 0.5]];
        let q = array![[0.6, 0.4], [0.5, 0.5]];
        let rob = softmax_robustness(&p, &q);
        assert!((rob[0] - 0.7).abs() < 1e-6);
        assert_eq!(rob[1], 1.0);
    }

    #[test]
    fn test_unchanged_images_are_robust() {
        let device = Default::default();
        let net =
            BaseNet::<NdArray>::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, &device)
                .unwrap();
        let x = Array4::from_shape_fn((6, 1, 28, 28), |(n, _, h, w)| ((n + h + w) % 7) as f32 / 7.0);
        let labels = vec![0, 1, 2, 3, 4, 5];

        let eval = evaluate_attack(&net, &x, &x, &labels, &SampleSpec::Deterministic, &device).unwrap();
        assert_eq!(eval.original_accuracy, eval.adversarial_accuracy);
        assert!(eval.softmax_robustness.iter().all(|r| (r - 1.0).abs() < 1e-6));
        assert!(eval.successful_idxs.is_empty());
    }

    #[test]
    fn test_bayesian_evaluation_is_reproducible() {
        let device = Default::default();
        let net = FullBnn::<NdArray>::new(
            full_bnn_settings(2).unwrap(),
            ImageShape::new(1, 28, 28),
            10,
            Seed::new(0),
            &device,
        )
        .unwrap();
        let x = Array4::from_elem((4, 1, 28, 28), 0.3f32);
        let x_attack = Array4::from_elem((4, 1, 28, 28), 0.6f32);
        let labels = vec![0, 1, 2, 3];
        let spec = SampleSpec::samples(3);

        let a = evaluate_attack(&net, &x, &x_attack, &labels, &spec, &device).unwrap();
        let b = evaluate_attack(&net, &x, &x_attack, &labels, &spec, &device).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.softmax_robustness.len(), 4);
    }

    #[test]
    fn test_shape_mismatch() {
        let device = Default::default();
        let net =
            BaseNet::<NdArray>::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, &device)
                .unwrap();
        let x = Array4::zeros((2, 1, 28, 28));
        let err = evaluate_attack(&net, &x, &x, &[0], &SampleSpec::Deterministic, &device).unwrap_err();
        assert!(matches!(err, AttackError::InvalidInput(_)));
    }
}
