//! `advbnn lrp-robustness`: how much attacks move the LRP explanations of a
//! deterministic network, a Bayesian network at several sample counts, and
//! the Bayesian posterior mean.

use std::path::{Path, PathBuf};

use advbnn_attack::{attack, evaluate_attack, AttackConfig, AttackEvaluation, AttackMethod};
use advbnn_core::SampleSpec;
use advbnn_explain::{
    compute_explanations, heatmap_name, load_heatmaps, lrp_robustness, save_heatmaps,
    vanishing_norm_idxs, ExplanationMode, HeatmapKind, LrpRobustness, LrpRule, Norm,
    RobustnessMethod,
};
use advbnn_models::{ModelType, Network};
use advbnn_plot::{
    lrp_robustness_distributions, lrp_robustness_scatterplot, plot_attacks_explanations,
    plot_vanishing_explanations, AttackExplanations, PlotStyle, RobustnessSeries,
};
use anyhow::{bail, Context, Result};
use burn_ndarray::NdArrayDevice;
use clap::Args;
use ndarray::{Array4, Array5, Axis};
use tracing::{info, warn};

use crate::experiment::{CommonArgs, Registered};
use crate::TrainBackend;

/// Arguments of `advbnn lrp-robustness`.
#[derive(Args, Debug, Clone)]
pub struct LrpRobustnessArgs {
    /// Bayesian network family: fullBNN or redBNN
    #[arg(long, default_value = "fullBNN", value_name = "MODEL")]
    pub model: ModelType,

    /// Index of the registered settings
    #[arg(long, default_value = "0", value_name = "IDX")]
    pub model_idx: usize,

    /// Number of explained test images (default 500, 60 with --debug)
    #[arg(long, value_name = "N")]
    pub n_inputs: Option<usize>,

    /// Most relevant pixels compared per heatmap (default 200, 10 with --debug)
    #[arg(long, value_name = "K")]
    pub topk: Option<usize>,

    /// Attack: fgsm or pgd
    #[arg(long, default_value = "fgsm", value_name = "METHOD")]
    pub attack_method: AttackMethod,

    /// Robustness measure: intersection, imagewise or pixelwise
    #[arg(long, default_value = "intersection", value_name = "METHOD")]
    pub lrp_method: RobustnessMethod,

    /// LRP rule: epsilon, gamma, alpha1beta0 or alpha2beta1
    #[arg(long, default_value = "epsilon", value_name = "RULE")]
    pub rule: LrpRule,

    /// Layer explained, -1 for the logits
    #[arg(long, default_value = "-1", allow_negative_numbers = true, value_name = "IDX")]
    pub layer_idx: i64,

    /// How posterior samples are combined: avg_heatmap or avg_prediction
    #[arg(long, default_value = "avg_heatmap", value_name = "MODE")]
    pub lrp_mode: String,

    /// Load cached attacks and heatmaps instead of computing them
    #[arg(long)]
    pub load: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Everything computed for one network and sample specification.
struct Outcome {
    label: String,
    attacks: Array4<f32>,
    lrp: Array4<f32>,
    attack_lrp: Array4<f32>,
    evaluation: AttackEvaluation,
    robustness: LrpRobustness,
}

impl Outcome {
    fn series(&self) -> RobustnessSeries {
        RobustnessSeries::new(self.label.clone(), self.robustness.robustness.to_vec())
            .with_softmax_robustness(self.evaluation.softmax_robustness.clone())
    }
}

/// Attack, explain and compare, caching under `savedir`.
struct Pipeline<'a> {
    images: &'a Array4<f32>,
    labels: &'a [usize],
    savedir: &'a Path,
    method: AttackMethod,
    config: AttackConfig,
    rule: LrpRule,
    layer_idx: i64,
    topk: usize,
    robustness_method: RobustnessMethod,
    load: bool,
    device: &'a NdArrayDevice,
}

impl Pipeline<'_> {
    fn cached(
        &self,
        kind: HeatmapKind,
        spec: &SampleSpec,
        n_samples: Option<usize>,
        compute: impl FnOnce() -> Result<Array4<f32>>,
    ) -> Result<Array4<f32>> {
        if self.load {
            return load_heatmaps(self.savedir, kind, spec, n_samples).with_context(|| {
                format!(
                    "No cached {} under {}; run without --load first",
                    heatmap_name(kind, spec, n_samples),
                    self.savedir.display()
                )
            });
        }
        let values = compute()?;
        save_heatmaps(&values, self.savedir, kind, spec, n_samples)?;
        Ok(values)
    }

    fn run(
        &self,
        net: &Network<TrainBackend>,
        spec: &SampleSpec,
        mode: ExplanationMode,
        n_samples: Option<usize>,
    ) -> Result<Outcome> {
        info!(spec = %spec, mode = ?mode, "LRP robustness pipeline");
        let attacks = self.cached(HeatmapKind::Attack, spec, n_samples, || {
            Ok(attack(
                net,
                self.images,
                self.labels,
                self.method,
                spec,
                &self.config,
                self.device,
            )?)
        })?;
        let lrp = self.cached(HeatmapKind::Lrp, spec, n_samples, || {
            Ok(compute_explanations(
                self.images,
                net,
                self.rule,
                mode,
                self.layer_idx,
                self.device,
            )?)
        })?;
        let attack_lrp = self.cached(HeatmapKind::AttackLrp, spec, n_samples, || {
            Ok(compute_explanations(
                &attacks,
                net,
                self.rule,
                mode,
                self.layer_idx,
                self.device,
            )?)
        })?;

        let evaluation =
            evaluate_attack(&net.valid(), self.images, &attacks, self.labels, spec, self.device)?;
        let robustness = lrp_robustness(&lrp, &attack_lrp, self.topk, self.robustness_method)?;
        Ok(Outcome {
            label: spec.label(),
            attacks,
            lrp,
            attack_lrp,
            evaluation,
            robustness,
        })
    }
}

pub fn handle_lrp_robustness(args: &LrpRobustnessArgs, style: &PlotStyle) -> Result<()> {
    let common = &args.common;
    let device = common.device()?;
    if args.model == ModelType::BaseNN {
        bail!("lrp-robustness needs a Bayesian network: use --model fullBNN or redBNN");
    }
    let registered = Registered::lookup(args.model, args.model_idx)?;
    let det_registered = registered.deterministic()?;

    let n_inputs = args.n_inputs.unwrap_or(if common.debug { 60 } else { 500 });
    let topk = args.topk.unwrap_or(if common.debug { 10 } else { 200 });
    let n_samples_list = common.sample_counts();
    let last_samples = n_samples_list.last().copied().unwrap_or(1);

    let data = common.load_data(registered.dataset(), Some(n_inputs))?;
    let test = data.test.take(n_inputs);
    let images = test.images();
    let labels = test.classes();

    let detnet = det_registered.load(&data, &common.savedir, common.debug, &device)?;
    let bayesnet = registered.load(&data, &common.savedir, common.debug, &device)?;
    let savedir = registered.savedir(&common.savedir, common.debug);

    let pipeline = Pipeline {
        images,
        labels: &labels,
        savedir: &savedir,
        method: args.attack_method,
        config: AttackConfig::default().with_epsilon(common.epsilon),
        rule: args.rule,
        layer_idx: args.layer_idx,
        topk,
        robustness_method: args.lrp_method,
        load: args.load,
        device: &device,
    };

    let mut outcomes = vec![pipeline.run(
        &detnet,
        &SampleSpec::Deterministic,
        ExplanationMode::Deterministic,
        None,
    )?];
    for &n in &n_samples_list {
        let mode = ExplanationMode::sampled(&args.lrp_mode, n)?;
        outcomes.push(pipeline.run(&bayesnet, &SampleSpec::samples(n), mode, Some(n))?);
    }
    outcomes.push(pipeline.run(
        &bayesnet,
        &SampleSpec::PosteriorMean,
        ExplanationMode::PosteriorMean,
        Some(last_samples),
    )?);

    println!();
    println!(
        "LRP robustness of {} ({}, {} images, top {topk} pixels)",
        registered.name(),
        args.rule,
        labels.len()
    );
    println!("─────────────────────────────────────────");
    for outcome in &outcomes {
        let robustness = &outcome.robustness.robustness;
        println!(
            "  {:<14} accuracy {:>6.2}% -> {:>6.2}%   successful {:>4}   mean LRP robustness {:.4}",
            outcome.label,
            outcome.evaluation.original_accuracy,
            outcome.evaluation.adversarial_accuracy,
            outcome.evaluation.successful_idxs.len(),
            robustness.mean().unwrap_or(f32::NAN),
        );
    }

    let plot_dir = savedir.join("lrp");
    let stem = format!(
        "{}_lrp_robustness{}_images={}_samples={}_pxls={}_atk={}",
        args.rule,
        registered.dataset(),
        labels.len(),
        last_samples,
        topk,
        args.attack_method
    );

    if args.lrp_method == RobustnessMethod::Imagewise {
        for outcome in &outcomes {
            let path = plot_dir.join(format!("{}_{stem}.png", outcome.label));
            plot_successful_attacks(outcome, images, &labels, &path, style)?;
        }
    }

    let series: Vec<RobustnessSeries> = outcomes.iter().map(Outcome::series).collect();
    let dist = plot_dir.join(format!("dist_{stem}.png"));
    lrp_robustness_distributions(&series, &dist, style)
        .context("Failed to plot LRP robustness distributions")?;
    let scatter = plot_dir.join(format!("scatterplot_{stem}.png"));
    lrp_robustness_scatterplot(&series, &scatter, style)
        .context("Failed to plot LRP robustness scatterplot")?;

    let bayesian: Vec<&Outcome> = outcomes[1..=n_samples_list.len()].iter().collect();
    let vanishing = plot_dir.join(format!("vanishing_{stem}.png"));
    plot_vanishing(&bayesian, images, &n_samples_list, &vanishing, style)?;

    println!("\nPlots saved to {} and {}", dist.display(), scatter.display());
    Ok(())
}

/// Attack explanations of the images whose prediction the attack flipped.
fn plot_successful_attacks(
    outcome: &Outcome,
    images: &Array4<f32>,
    labels: &[usize],
    path: &Path,
    style: &PlotStyle,
) -> Result<Option<PathBuf>> {
    let idxs = &outcome.evaluation.successful_idxs;
    if idxs.is_empty() {
        warn!(label = %outcome.label, "No successful attacks to plot");
        return Ok(None);
    }
    let pick = |values: &[usize]| -> Vec<usize> { idxs.iter().map(|&i| values[i]).collect() };
    let images = images.select(Axis(0), idxs);
    let explanations = outcome.lrp.select(Axis(0), idxs);
    let attacks = outcome.attacks.select(Axis(0), idxs);
    let attack_explanations = outcome.attack_lrp.select(Axis(0), idxs);
    let predictions = pick(&outcome.evaluation.original_predictions);
    let attack_predictions = pick(&outcome.evaluation.adversarial_predictions);
    let labels = pick(labels);
    let pixel_idxs: Vec<Vec<usize>> = idxs
        .iter()
        .map(|&i| outcome.robustness.pixel_idxs[i].clone())
        .collect();

    let data = AttackExplanations {
        images: &images,
        explanations: &explanations,
        attacks: &attacks,
        attack_explanations: &attack_explanations,
        predictions: &predictions,
        attack_predictions: &attack_predictions,
        labels: &labels,
        pixel_idxs: &pixel_idxs,
    };
    let path = plot_attacks_explanations(&data, path, style)
        .with_context(|| format!("Failed to plot {}", path.display()))?;
    Ok(Some(path))
}

/// Heatmaps whose norm shrinks as more posterior samples are averaged.
fn plot_vanishing(
    bayesian: &[&Outcome],
    images: &Array4<f32>,
    n_samples_list: &[usize],
    path: &Path,
    style: &PlotStyle,
) -> Result<Option<PathBuf>> {
    let views: Vec<_> = bayesian.iter().map(|outcome| outcome.lrp.view()).collect();
    let stacked: Array5<f32> = ndarray::stack(Axis(0), &views)?;
    let norms = vanishing_norm_idxs(&stacked, n_samples_list, Norm::Linfty)?;
    if norms.vanishing_idxs.len() < 2 {
        info!(vanishing = norms.vanishing_idxs.len(), "Too few vanishing heatmaps to plot");
        return Ok(None);
    }
    let path = plot_vanishing_explanations(
        images,
        &stacked,
        n_samples_list,
        &norms.vanishing_idxs,
        path,
        style,
    )
    .with_context(|| format!("Failed to plot {}", path.display()))?;
    Ok(Some(path))
}
