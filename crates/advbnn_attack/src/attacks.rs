//! FGSM and PGD.

use advbnn_core::tensor::{array4_to_tensor, tensor_to_array4};
use advbnn_core::{SampleSpec, WeightDraw};
use advbnn_models::LayeredNet;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use ndarray::{s, Array4, Axis};
use tracing::{debug, info};

use crate::error::{AttackError, Result};
use crate::gradient::{attack_draws, loss_gradient_sign};
use crate::method::{AttackConfig, AttackMethod, StepSize, DEFAULT_PGD_STEP};

/// One FGSM step: `clip(x + ε · sign(∇ₓ L), 0, 1)`.
///
/// # Errors
///
/// Returns an error if the gradient cannot be computed.
pub fn fgsm<B, N>(
    net: &N,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    draws: &[WeightDraw],
    epsilon: f32,
) -> Result<Tensor<B, 4>>
where
    B: AutodiffBackend,
    N: LayeredNet<B> + ?Sized,
{
    let grad_sign = loss_gradient_sign(net, images.clone(), labels, draws)?;
    Ok((images.detach() + grad_sign.mul_scalar(epsilon)).clamp(0.0, 1.0))
}

/// `iters` gradient-sign steps of size `alpha`, each projected back onto
/// the ε-ball around `images` and clipped to `[0, 1]`.
///
/// # Errors
///
/// Returns an error if a gradient cannot be computed.
pub fn pgd<B, N>(
    net: &N,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    draws: &[WeightDraw],
    epsilon: f32,
    alpha: f32,
    iters: usize,
) -> Result<Tensor<B, 4>>
where
    B: AutodiffBackend,
    N: LayeredNet<B> + ?Sized,
{
    let original = images.detach();
    let mut image = original.clone();
    for _ in 0..iters {
        let grad_sign = loss_gradient_sign(net, image.clone(), labels.clone(), draws)?;
        let perturbed = image + grad_sign.mul_scalar(alpha);
        let eta = (perturbed - original.clone()).clamp(-epsilon, epsilon);
        image = (original.clone() + eta).clamp(0.0, 1.0).detach();
    }
    Ok(image)
}

fn step_size<B: Backend>(step: StepSize, images: &Tensor<B, 4>) -> f32 {
    match step {
        StepSize::Fixed(alpha) => alpha,
        StepSize::InverseMax => {
            let max: f32 = images.clone().max().into_scalar().elem();
            if max > 0.0 {
                2.0 / max
            } else {
                DEFAULT_PGD_STEP
            }
        }
    }
}

/// Attack every image of `x` in batches.
///
/// Bayesian networks differentiate through the draws of `spec` (draw `i`
/// uses posterior sample `i`); [`SampleSpec::PosteriorMean`] attacks the
/// posterior-mean network. Deterministic networks ignore `spec`.
///
/// # Errors
///
/// Returns an error if `x` and `labels` disagree in length, the
/// configuration is invalid or the sample spec is malformed.
pub fn attack<B, N>(
    net: &N,
    x: &Array4<f32>,
    labels: &[usize],
    method: AttackMethod,
    spec: &SampleSpec,
    config: &AttackConfig,
    device: &B::Device,
) -> Result<Array4<f32>>
where
    B: AutodiffBackend,
    N: LayeredNet<B> + ?Sized,
{
    config.validate()?;
    let n = x.len_of(Axis(0));
    if labels.len() != n {
        return Err(AttackError::InvalidInput(format!(
            "{n} images but {} labels",
            labels.len()
        )));
    }
    let draws = attack_draws(net, spec)?;
    info!(
        method = %method,
        n_images = n,
        n_draws = draws.len(),
        "Producing attacks"
    );

    let mut batches = Vec::with_capacity(n.div_ceil(config.batch_size));
    for start in (0..n).step_by(config.batch_size) {
        let end = (start + config.batch_size).min(n);
        let images = array4_to_tensor::<B>(&x.slice(s![start..end, .., .., ..]).to_owned(), device);
        let targets: Vec<i64> = labels[start..end].iter().map(|&l| l as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [end - start]), device);

        let perturbed = match method {
            AttackMethod::Fgsm => fgsm(net, images, targets, &draws, config.epsilon)?,
            AttackMethod::Pgd => {
                let alpha = step_size(config.step, &images);
                pgd(net, images, targets, &draws, config.epsilon, alpha, config.iters)?
            }
        };
        batches.push(tensor_to_array4(perturbed)?);
        debug!(start, end, "attacked batch");
    }

    if batches.is_empty() {
        return Ok(x.clone());
    }
    let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
    ndarray::concatenate(Axis(0), &views)
        .map_err(|e| AttackError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use advbnn_core::{ImageShape, Seed};
    use advbnn_data::synthetic::SyntheticConfig;
    use advbnn_models::{base_settings, full_bnn_settings, BaseNet, FullBnn};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn inputs() -> (Array4<f32>, Vec<usize>) {
        let (_, test) = SyntheticConfig::new().with_sizes(1, 12).generate().unwrap();
        let labels = test.classes();
        (test.images().clone(), labels)
    }

    fn base_net(device: &<TestBackend as Backend>::Device) -> BaseNet<TestBackend> {
        BaseNet::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, device).unwrap()
    }

    fn assert_in_ball(x: &Array4<f32>, adv: &Array4<f32>, eps: f32) {
        assert_eq!(x.shape(), adv.shape());
        for (a, b) in x.iter().zip(adv.iter()) {
            assert!((0.0..=1.0).contains(b));
            assert!((a - b).abs() <= eps + 1e-5);
        }
    }

    #[test]
    fn test_fgsm_stays_in_ball() {
        let device = Default::default();
        let net = base_net(&device);
        let (x, y) = inputs();
        let config = AttackConfig::default().with_batch_size(5);
        let adv = attack(&net, &x, &y, AttackMethod::Fgsm, &SampleSpec::Deterministic, &config, &device)
            .unwrap();
        assert_in_ball(&x, &adv, 0.25);
        assert_ne!(x, adv);
    }

    #[test]
    fn test_pgd_stays_in_ball() {
        let device = Default::default();
        let net = base_net(&device);
        let (x, y) = inputs();
        let config = AttackConfig::default()
            .with_epsilon(0.1)
            .with_step(StepSize::Fixed(0.05))
            .with_iters(5);
        let adv = attack(&net, &x, &y, AttackMethod::Pgd, &SampleSpec::Deterministic, &config, &device)
            .unwrap();
        assert_in_ball(&x, &adv, 0.1);
    }

    #[test]
    fn test_bayesian_sign_average_is_bounded() {
        let device = Default::default();
        let net = FullBnn::<TestBackend>::new(
            full_bnn_settings(2).unwrap(),
            ImageShape::new(1, 28, 28),
            10,
            Seed::new(0),
            &device,
        )
        .unwrap();
        let (x, y) = inputs();
        let images = array4_to_tensor::<TestBackend>(&x, &device);
        let targets: Vec<i64> = y.iter().map(|&l| l as i64).collect();
        let targets = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(targets, [y.len()]), &device);
        let draws = SampleSpec::samples(3).draws().unwrap();

        let grad_sign = loss_gradient_sign(&net, images, targets, &draws).unwrap();
        let values = tensor_to_array4(grad_sign).unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        // averages of three signs are multiples of 1/3
        assert!(values
            .iter()
            .all(|v| ((v * 3.0).round() - v * 3.0).abs() < 1e-4));
    }

    #[test]
    fn test_label_count_mismatch() {
        let device = Default::default();
        let net = base_net(&device);
        let (x, y) = inputs();
        let err = attack(
            &net,
            &x,
            &y[..3],
            AttackMethod::Fgsm,
            &SampleSpec::Deterministic,
            &AttackConfig::default(),
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, AttackError::InvalidInput(_)));
    }

    #[test]
    fn test_inverse_max_step() {
        let device = Default::default();
        let x = Tensor::<NdArray, 4>::ones([1, 1, 2, 2], &device).mul_scalar(0.5);
        assert_eq!(step_size(StepSize::InverseMax, &x), 4.0);
        assert_eq!(step_size(StepSize::Fixed(0.1), &x), 0.1);
    }
}
