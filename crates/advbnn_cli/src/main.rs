//! advbnn CLI for adversarial robustness experiments on deterministic and
//! Bayesian image classifiers.

mod experiment;
mod lrp_robustness;
mod train_attack;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advbnn_core::Seed;
use advbnn_plot::PlotStyle;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;

use crate::lrp_robustness::{handle_lrp_robustness, LrpRobustnessArgs};
use crate::train_attack::{handle_train_attack, TrainAttackArgs};

/// Backend type for training, attacks and explanations.
type TrainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "advbnn")]
#[command(author, version)]
#[command(about = "Adversarial robustness of deterministic and Bayesian image classifiers")]
#[command(long_about = "advbnn: attack deterministic and Bayesian networks with FGSM/PGD and
measure how much the attacks move their LRP explanations.

EXAMPLES:
  # Train a deterministic network on MNIST and attack it with FGSM
  advbnn train-attack --model-type baseNN --model-idx 0 --download

  # Train the matching Bayesian network and attack it with PGD
  advbnn train-attack --model-type fullBNN --model-idx 0 --attack-method pgd

  # Compare the LRP robustness of both networks
  advbnn lrp-robustness --model fullBNN --model-idx 0 --rule epsilon

  # Quick run on the built-in synthetic dataset
  advbnn train-attack --model-type baseNN --model-idx 2 --debug
  advbnn train-attack --model-type fullBNN --model-idx 2 --debug
  advbnn lrp-robustness --model fullBNN --model-idx 2 --debug

MODELS:
  baseNN   - deterministic network
  fullBNN  - Gaussian posterior over every weight, fitted with SVI
  redBNN   - trained baseNN with a Bayesian last layer (SVI or Laplace)")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Draw plots without text, for machines without system fonts
    #[arg(long, global = true)]
    no_captions: bool,

    /// Side of one image panel in plots, in pixels
    #[arg(long, default_value = "120", global = true, value_name = "PX")]
    panel_size: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train or load a network, attack it and evaluate the attacks
    TrainAttack(TrainAttackArgs),
    /// Compare LRP robustness of a Bayesian network and its deterministic counterpart
    LrpRobustness(LrpRobustnessArgs),
}

impl Cli {
    fn plot_style(&self, seed: u64) -> PlotStyle {
        let style = PlotStyle::default()
            .with_panel_size(self.panel_size)
            .with_seed(Seed::new(seed));
        if self.no_captions {
            style.without_captions()
        } else {
            style
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match &cli.command {
        Commands::TrainAttack(args) => handle_train_attack(args, &cli.plot_style(args.common.seed)),
        Commands::LrpRobustness(args) => {
            handle_lrp_robustness(args, &cli.plot_style(args.common.seed))
        }
    }
}
