//! Integration tests for the attack and explanation pipelines.
//!
//! These tests train small networks on the synthetic dataset, attack them
//! and explain the attacks end to end.

use burn::tensor::backend::Backend;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use ndarray::{Array4, Array5, Axis};

use advbnn::all::*;

type TrainBackend = Autodiff<NdArray>;

fn synthetic_data() -> DatasetSplits {
    load_dataset("synthetic", &LoadOptions::default().with_n_inputs(300))
        .expect("Failed to load synthetic data")
}

fn loader(dataset: &ImageDataset, shuffle: bool) -> ImageLoader {
    ImageLoader::builder(dataset.clone())
        .batch_size(32)
        .shuffle(shuffle)
        .build()
        .expect("Failed to build loader")
}

fn train_base_net(data: &DatasetSplits, device: &<TrainBackend as Backend>::Device) -> BaseNet<TrainBackend> {
    let settings = base_settings(2).unwrap();
    let net = BaseNet::<TrainBackend>::new(settings, data.input_shape, data.n_classes, device).unwrap();
    train_base(net, &loader(&data.train, true), None, &TrainConfig::new(3, 0.01), device)
        .expect("Training failed")
        .model
}

fn assert_in_ball(x: &Array4<f32>, adv: &Array4<f32>, epsilon: f32) {
    assert_eq!(x.shape(), adv.shape());
    for (a, b) in x.iter().zip(adv) {
        assert!((a - b).abs() <= epsilon + 1e-5);
        assert!((0.0..=1.0).contains(b));
    }
}

#[test]
fn test_deterministic_pipeline() {
    let device = Default::default();
    let data = synthetic_data();
    let net = train_base_net(&data, &device);

    let accuracy = evaluate_accuracy(
        &net.valid(),
        &loader(&data.test, false),
        &SampleSpec::Deterministic,
        &device,
    )
    .unwrap();
    assert!(accuracy > 50.0, "test accuracy {accuracy}");

    let (subset, idxs) = balanced_subset(&data.test, data.n_classes, 20, Seed::new(0)).unwrap();
    assert_eq!(idxs.len(), 20);
    let images = subset.images();
    let labels = subset.classes();
    for class in 0..data.n_classes {
        assert_eq!(labels.iter().filter(|&&l| l == class).count(), 2);
    }

    let spec = SampleSpec::Deterministic;
    let config = AttackConfig::default();
    let attacks = attack(&net, images, &labels, AttackMethod::Fgsm, &spec, &config, &device).unwrap();
    assert_in_ball(images, &attacks, config.epsilon);

    let evaluation = evaluate_attack(&net.valid(), images, &attacks, &labels, &spec, &device).unwrap();
    assert_eq!(evaluation.softmax_robustness.len(), 20);
    assert!(evaluation
        .softmax_robustness
        .iter()
        .all(|r| (0.0..=1.0 + 1e-6).contains(r)));
    for &i in &evaluation.successful_idxs {
        assert_ne!(
            evaluation.original_predictions[i],
            evaluation.adversarial_predictions[i]
        );
    }

    let lrp = compute_explanations(images, &net, LrpRule::Epsilon, ExplanationMode::Deterministic, -1, &device)
        .unwrap();
    let attack_lrp = compute_explanations(
        &attacks,
        &net,
        LrpRule::Epsilon,
        ExplanationMode::Deterministic,
        -1,
        &device,
    )
    .unwrap();
    assert_eq!(lrp.shape(), images.shape());

    let same = lrp_robustness(&lrp, &lrp, 10, RobustnessMethod::Imagewise).unwrap();
    assert!(same.robustness.iter().all(|r| (r - 1.0).abs() < 1e-6));
    let moved = lrp_robustness(&lrp, &attack_lrp, 10, RobustnessMethod::Imagewise).unwrap();
    assert!(moved.robustness.iter().all(|r| (0.0..=1.0).contains(r)));
    assert_eq!(moved.pixel_idxs.len(), 20);

    let dir = tempfile::tempdir().unwrap();
    let style = PlotStyle::default().without_captions().with_panel_size(16);
    let plotted = AttackExplanations {
        images,
        explanations: &lrp,
        attacks: &attacks,
        attack_explanations: &attack_lrp,
        predictions: &evaluation.original_predictions,
        attack_predictions: &evaluation.adversarial_predictions,
        labels: &labels,
        pixel_idxs: &moved.pixel_idxs,
    };
    let path = plot_attacks_explanations(&plotted, &dir.path().join("lrp/det.png"), &style).unwrap();
    assert!(path.exists());
}

#[test]
fn test_attacks_and_heatmaps_are_cached() {
    let device = Default::default();
    let data = synthetic_data();
    let net = train_base_net(&data, &device);
    let images = data.test.take(8);
    let labels = images.classes();
    let dir = tempfile::tempdir().unwrap();

    let config = AttackConfig::default().with_iters(3).with_epsilon(0.1);
    let attacks = attack(
        &net,
        images.images(),
        &labels,
        AttackMethod::Pgd,
        &SampleSpec::Deterministic,
        &config,
        &device,
    )
    .unwrap();
    assert_in_ball(images.images(), &attacks, 0.1);

    save_attack(&attacks, dir.path(), &net.name(), AttackMethod::Pgd, None).unwrap();
    let loaded = load_attack(dir.path(), &net.name(), AttackMethod::Pgd, None).unwrap();
    assert_eq!(loaded, attacks);
    assert!(load_attack(dir.path(), &net.name(), AttackMethod::Fgsm, None).is_err());

    let heatmaps = compute_explanations(
        &attacks,
        &net,
        LrpRule::Gamma,
        ExplanationMode::Deterministic,
        -1,
        &device,
    )
    .unwrap();
    let spec = SampleSpec::Deterministic;
    save_heatmaps(&heatmaps, dir.path(), HeatmapKind::AttackLrp, &spec, None).unwrap();
    let cached = load_heatmaps(dir.path(), HeatmapKind::AttackLrp, &spec, None).unwrap();
    assert_eq!(cached, heatmaps);
}

#[test]
fn test_bayesian_pipeline() {
    let device = Default::default();
    let data = synthetic_data();
    let net = FullBnn::<TrainBackend>::new(
        full_bnn_settings(2).unwrap(),
        data.input_shape,
        data.n_classes,
        Seed::new(0),
        &device,
    )
    .unwrap();
    let net = train_network(
        net.into(),
        &loader(&data.train, true),
        Some(&loader(&data.val, false)),
        &TrainConfig::new(2, 0.01),
        &device,
    )
    .expect("SVI failed")
    .model;
    assert!(net.is_bayesian());

    let images = data.test.take(12);
    let labels = images.classes();
    let n_samples_list = [1, 2];
    let config = AttackConfig::default();

    let mut heatmaps = Vec::new();
    let mut series = Vec::new();
    for &n in &n_samples_list {
        let spec = SampleSpec::samples(n);
        let attacks = attack(&net, images.images(), &labels, AttackMethod::Fgsm, &spec, &config, &device).unwrap();
        assert_in_ball(images.images(), &attacks, config.epsilon);

        let mode = ExplanationMode::AvgHeatmap(n);
        let lrp = compute_explanations(images.images(), &net, LrpRule::Epsilon, mode, -1, &device).unwrap();
        let attack_lrp = compute_explanations(&attacks, &net, LrpRule::Epsilon, mode, -1, &device).unwrap();
        let evaluation =
            evaluate_attack(&net.valid(), images.images(), &attacks, &labels, &spec, &device).unwrap();
        let robustness = lrp_robustness(&lrp, &attack_lrp, 10, RobustnessMethod::Pixelwise).unwrap();
        assert!(robustness.robustness.iter().all(|r| *r <= 0.0));

        series.push(
            RobustnessSeries::new(spec.label(), robustness.robustness.to_vec())
                .with_softmax_robustness(evaluation.softmax_robustness),
        );
        heatmaps.push(lrp);
    }

    let again = compute_explanations(
        images.images(),
        &net,
        LrpRule::Epsilon,
        ExplanationMode::AvgHeatmap(2),
        -1,
        &device,
    )
    .unwrap();
    assert_eq!(again, heatmaps[1]);

    let mean = compute_explanations(
        images.images(),
        &net,
        LrpRule::Epsilon,
        ExplanationMode::PosteriorMean,
        -1,
        &device,
    )
    .unwrap();
    assert_eq!(mean.shape(), images.images().shape());

    let views: Vec<_> = heatmaps.iter().map(|h| h.view()).collect();
    let stacked: Array5<f32> = ndarray::stack(Axis(0), &views).unwrap();
    let norms = vanishing_norm_idxs(&stacked, &n_samples_list, Norm::L2).unwrap();
    assert!(norms.vanishing_idxs.iter().all(|i| norms.non_null_idxs.contains(i)));

    let dir = tempfile::tempdir().unwrap();
    let style = PlotStyle::default().without_captions().with_panel_size(16);
    assert!(lrp_robustness_distributions(&series, &dir.path().join("dist.png"), &style).is_ok());
    assert!(lrp_robustness_scatterplot(&series, &dir.path().join("scatter.png"), &style).is_ok());
}

#[test]
fn test_red_bnn_laplace_persists() {
    let device = Default::default();
    let data = synthetic_data();
    let base = train_base_net(&data, &device);
    let settings = red_bnn_settings(2).unwrap();
    let red = RedBnn::new(base.clone(), settings.clone(), Seed::new(3)).unwrap();
    let red = train_network(
        red.into(),
        &loader(&data.train, true),
        None,
        &TrainConfig::from_red(&settings),
        &device,
    )
    .expect("Laplace fit failed")
    .model;

    let accuracy =
        evaluate_accuracy(&red.valid(), &loader(&data.test, false), &SampleSpec::samples(3), &device).unwrap();
    assert!((0.0..=100.0).contains(&accuracy));

    let dir = tempfile::tempdir().unwrap();
    red.save(dir.path()).unwrap();
    let loaded: Network<TrainBackend> = RedBnn::load(base, settings, dir.path(), &device).unwrap().into();

    let x = tensor::array4_to_tensor::<TrainBackend>(&data.test.take(4).images().clone(), &device);
    for draw in [WeightDraw::Mean, WeightDraw::Sample(0), WeightDraw::Sample(5)] {
        let a = tensor::tensor_to_vec(red.logits(x.clone(), draw).unwrap()).unwrap();
        let b = tensor::tensor_to_vec(loaded.logits(x.clone(), draw).unwrap()).unwrap();
        for (u, v) in a.iter().zip(&b) {
            assert!((u - v).abs() < 1e-5);
        }
    }
}
