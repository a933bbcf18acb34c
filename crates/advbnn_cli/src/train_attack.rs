//! `advbnn train-attack`: train or load a network, then attack a
//! class-balanced test subset and evaluate it.

use advbnn_attack::{
    attack, attack_dir, attack_name, evaluate_attack, load_attack, save_attack, AttackConfig,
    AttackMethod,
};
use advbnn_core::{SampleSpec, Seed, Split};
use advbnn_data::{balanced_subset, ImageLoader};
use advbnn_models::ModelType;
use advbnn_plot::{plot_grid_attacks, random_idxs, PlotStyle};
use advbnn_train::evaluate_accuracy;
use anyhow::{Context, Result};
use clap::Args;
use ndarray::Axis;
use serde_json::json;
use tracing::info;

use crate::experiment::{save_history, save_json, train, CommonArgs, Registered, BATCH_SIZE};

/// Images shown in each attack grid.
const GRID_IMAGES: usize = 10;

/// Arguments of `advbnn train-attack`.
#[derive(Args, Debug, Clone)]
pub struct TrainAttackArgs {
    /// Network family: baseNN, fullBNN or redBNN
    #[arg(long, default_value = "baseNN", value_name = "MODEL")]
    pub model_type: ModelType,

    /// Index of the registered settings
    #[arg(long, default_value = "0", value_name = "IDX")]
    pub model_idx: usize,

    /// Attack: fgsm or pgd
    #[arg(long, default_value = "fgsm", value_name = "METHOD")]
    pub attack_method: AttackMethod,

    /// Number of attacked test images (default 1000, 100 with --debug)
    #[arg(long, value_name = "N")]
    pub atk_inputs: Option<usize>,

    /// Train the network (default)
    #[arg(long, overrides_with = "no_train")]
    pub train: bool,

    /// Load a saved network instead of training it
    #[arg(long, overrides_with = "train")]
    pub no_train: bool,

    /// Compute the attacks (default)
    #[arg(long, overrides_with = "no_attack")]
    pub attack: bool,

    /// Load saved attacks instead of computing them
    #[arg(long, overrides_with = "attack")]
    pub no_attack: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl TrainAttackArgs {
    fn should_train(&self) -> bool {
        self.train || !self.no_train
    }

    fn should_attack(&self) -> bool {
        self.attack || !self.no_attack
    }
}

pub fn handle_train_attack(args: &TrainAttackArgs, style: &PlotStyle) -> Result<()> {
    let common = &args.common;
    let device = common.device()?;
    let seed = Seed::new(common.seed);
    let registered = Registered::lookup(args.model_type, args.model_idx)?;
    let name = registered.name();

    let (n_inputs, atk_inputs) = if common.debug {
        (Some(100), 100)
    } else {
        (None, args.atk_inputs.unwrap_or(1000))
    };
    let data = common.load_data(registered.dataset(), n_inputs)?;
    let savedir = registered.savedir(&common.savedir, common.debug);

    let net = if args.should_train() {
        println!("Training {name}");
        let net = registered.build(&data, seed, &common.savedir, common.debug, &device)?;
        let output = train(net, &data, &registered.train_config(), seed, &device)?;
        output
            .model
            .save(&savedir)
            .with_context(|| format!("Failed to save {name} to {}", savedir.display()))?;
        let history = save_history(&output, &savedir, &name)?;
        println!(
            "  trained in {:.1}s, history saved to {}",
            output.training_time_secs,
            history.display()
        );
        output.model
    } else {
        registered.load(&data, &common.savedir, common.debug, &device)?
    };
    let eval_net = net.valid();

    let test_loader = ImageLoader::builder(data.test.clone())
        .batch_size(BATCH_SIZE)
        .split(Split::Test)
        .build()?;
    let (subset, _) = balanced_subset(&data.test, data.n_classes, atk_inputs, seed)?;
    let images = subset.images();
    let labels = subset.classes();
    info!(n_images = labels.len(), "Attacking a balanced test subset");

    let specs: Vec<SampleSpec> = if registered.is_bayesian() {
        common.sample_counts().into_iter().map(SampleSpec::samples).collect()
    } else {
        vec![SampleSpec::Deterministic]
    };
    let config = AttackConfig::default().with_epsilon(common.epsilon);
    let method = args.attack_method;

    println!();
    println!("{name} ({})", registered.model_type());
    println!("─────────────────────────────────────────");
    let mut results = Vec::with_capacity(specs.len());
    for spec in &specs {
        let n_samples = spec.n_samples();
        let test_accuracy = evaluate_accuracy(&eval_net, &test_loader, spec, &device)?;

        let attacks = if args.should_attack() {
            let attacks = attack(&net, images, &labels, method, spec, &config, &device)?;
            save_attack(&attacks, &savedir, &name, method, n_samples)?;
            attacks
        } else {
            load_attack(&savedir, &name, method, n_samples).with_context(|| {
                format!("No saved {method} attack for {name} ({spec}); run with --attack first")
            })?
        };
        let evaluation = evaluate_attack(&eval_net, images, &attacks, &labels, spec, &device)?;

        let shown = random_idxs(labels.len(), GRID_IMAGES, seed);
        let grid = attack_dir(&savedir).join(format!("{}.png", attack_name(&name, method, n_samples)));
        plot_grid_attacks(
            &images.select(Axis(0), &shown),
            &attacks.select(Axis(0), &shown),
            &grid,
            style,
        )
        .with_context(|| format!("Failed to plot {}", grid.display()))?;

        println!("  {spec}:");
        println!("    test accuracy:        {test_accuracy:.2}%");
        println!("    accuracy on images:   {:.2}%", evaluation.original_accuracy);
        println!("    accuracy on attacks:  {:.2}%", evaluation.adversarial_accuracy);
        println!(
            "    successful attacks:   {}/{}",
            evaluation.successful_idxs.len(),
            labels.len()
        );
        results.push(json!({
            "samples": n_samples,
            "test_accuracy": test_accuracy,
            "original_accuracy": evaluation.original_accuracy,
            "adversarial_accuracy": evaluation.adversarial_accuracy,
            "successful_attacks": evaluation.successful_idxs.len(),
        }));
    }

    let summary = json!({
        "model": name,
        "attack_method": method.to_string(),
        "epsilon": config.epsilon,
        "attacked_images": labels.len(),
        "results": results,
    });
    let path = save_json(&summary, &savedir, &format!("{name}_{method}_results.json"))?;
    println!("\nResults saved to {}", path.display());
    Ok(())
}
