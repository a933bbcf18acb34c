//! Registered networks and the plumbing shared by every subcommand.

use std::fs;
use std::path::{Path, PathBuf};

use advbnn_core::{Seed, Split};
use advbnn_data::{load_dataset, DatasetSplits, ImageLoader, LoadOptions};
use advbnn_models::{
    base_settings, full_bnn_settings, red_bnn_settings, save_dir, BaseNet, BaseSettings, FullBnn,
    FullBnnSettings, ModelType, Network, RedBnn, RedBnnSettings,
};
use advbnn_train::{train_network, TrainConfig, TrainingOutput};
use anyhow::{bail, Context, Result};
use burn_ndarray::NdArrayDevice;
use clap::Args;
use serde_json::json;
use tracing::info;

use crate::TrainBackend;

/// Batch size of every training and evaluation loader.
pub const BATCH_SIZE: usize = 128;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Small runs saved under `{savedir}/debug`
    #[arg(long)]
    pub debug: bool,

    /// Root directory of networks, attacks, heatmaps and plots
    #[arg(long, default_value = "experiments", value_name = "DIR")]
    pub savedir: PathBuf,

    /// Dataset root (default: ~/.cache/advbnn)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Download missing datasets
    #[arg(long)]
    pub download: bool,

    /// Compute device, only `cpu` is available
    #[arg(long, default_value = "cpu", value_name = "DEVICE")]
    pub device: String,

    /// Random seed
    #[arg(long, default_value = "0", value_name = "SEED")]
    pub seed: u64,

    /// Radius of the L∞ attack ball
    #[arg(long, default_value = "0.25", value_name = "EPS")]
    pub epsilon: f32,
}

impl CommonArgs {
    /// The burn device named by `--device`.
    pub fn device(&self) -> Result<NdArrayDevice> {
        match self.device.as_str() {
            "cpu" => Ok(NdArrayDevice::Cpu),
            other => bail!("Unsupported device '{other}'. Only 'cpu' is available."),
        }
    }

    /// Posterior sample counts attacked and explained.
    pub fn sample_counts(&self) -> Vec<usize> {
        if self.debug {
            vec![1, 2]
        } else {
            vec![1, 10, 50]
        }
    }

    /// Load a dataset, keeping the first `n_inputs` images of each split.
    pub fn load_data(&self, dataset: &str, n_inputs: Option<usize>) -> Result<DatasetSplits> {
        let mut options = LoadOptions::default().with_download(self.download);
        if let Some(root) = &self.data_dir {
            options = options.with_root(root);
        }
        if let Some(n) = n_inputs {
            options = options.with_n_inputs(n);
        }
        let data = load_dataset(dataset, &options)
            .with_context(|| format!("Failed to load dataset '{dataset}'"))?;
        info!(
            dataset,
            train = data.train.len(),
            val = data.val.len(),
            test = data.test.len(),
            "Loaded dataset"
        );
        Ok(data)
    }
}

/// A network registered by family and index.
#[derive(Debug, Clone)]
pub enum Registered {
    /// Deterministic network.
    Base { idx: usize, settings: BaseSettings },
    /// Fully Bayesian network.
    Full { idx: usize, settings: FullBnnSettings },
    /// Last-layer Bayesian network on top of the registered base `base_idx`.
    Red {
        idx: usize,
        base_idx: usize,
        settings: RedBnnSettings,
    },
}

impl Registered {
    /// Settings registered under `idx` for `model_type`.
    pub fn lookup(model_type: ModelType, idx: usize) -> Result<Self> {
        let registered = match model_type {
            ModelType::BaseNN => Registered::Base {
                idx,
                settings: base_settings(idx)?,
            },
            ModelType::FullBNN => Registered::Full {
                idx,
                settings: full_bnn_settings(idx)?,
            },
            ModelType::RedBNN => {
                let settings = red_bnn_settings(idx)?;
                let base_idx = base_idx_of(&settings.base)?;
                Registered::Red {
                    idx,
                    base_idx,
                    settings,
                }
            }
        };
        Ok(registered)
    }

    /// Deterministic network compared against this one: the base of a
    /// redBNN, or the baseNN with the same index.
    pub fn deterministic(&self) -> Result<Self> {
        match self {
            Registered::Base { .. } => Ok(self.clone()),
            Registered::Full { idx, .. } => Self::lookup(ModelType::BaseNN, *idx),
            Registered::Red { base_idx, .. } => Self::lookup(ModelType::BaseNN, *base_idx),
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Registered::Base { .. } => ModelType::BaseNN,
            Registered::Full { .. } => ModelType::FullBNN,
            Registered::Red { .. } => ModelType::RedBNN,
        }
    }

    pub fn dataset(&self) -> &str {
        match self {
            Registered::Base { settings, .. } => &settings.dataset,
            Registered::Full { settings, .. } => &settings.dataset,
            Registered::Red { settings, .. } => &settings.base.dataset,
        }
    }

    /// Model name, also the file name of its checkpoint.
    pub fn name(&self) -> String {
        match self {
            Registered::Base { settings, .. } => settings.name(),
            Registered::Full { settings, .. } => settings.name(),
            Registered::Red { settings, .. } => settings.name(),
        }
    }

    pub fn is_bayesian(&self) -> bool {
        !matches!(self, Registered::Base { .. })
    }

    pub fn train_config(&self) -> TrainConfig {
        match self {
            Registered::Base { settings, .. } => TrainConfig::from_base(settings),
            Registered::Full { settings, .. } => TrainConfig::from_full(settings),
            Registered::Red { settings, .. } => TrainConfig::from_red(settings),
        }
    }

    /// Directory of everything produced for this network.
    pub fn savedir(&self, root: &Path, debug: bool) -> PathBuf {
        match self {
            Registered::Base { idx, settings } => save_dir(
                root,
                ModelType::BaseNN,
                &settings.dataset,
                settings.architecture,
                None,
                debug,
                *idx,
            ),
            Registered::Full { idx, settings } => save_dir(
                root,
                ModelType::FullBNN,
                &settings.dataset,
                settings.architecture,
                Some(settings.inference),
                debug,
                *idx,
            ),
            Registered::Red { idx, settings, .. } => save_dir(
                root,
                ModelType::RedBNN,
                &settings.base.dataset,
                settings.base.architecture,
                Some(settings.inference),
                debug,
                *idx,
            ),
        }
    }

    /// A freshly initialized network. A redBNN starts from its saved base.
    pub fn build(
        &self,
        data: &DatasetSplits,
        seed: Seed,
        root: &Path,
        debug: bool,
        device: &NdArrayDevice,
    ) -> Result<Network<TrainBackend>> {
        let net: Network<TrainBackend> = match self {
            Registered::Base { settings, .. } => {
                BaseNet::new(settings.clone(), data.input_shape, data.n_classes, device)?.into()
            }
            Registered::Full { settings, .. } => {
                FullBnn::new(settings.clone(), data.input_shape, data.n_classes, seed, device)?.into()
            }
            Registered::Red { settings, .. } => {
                let base = self.load_base(data, root, debug, device)?;
                RedBnn::new(base, settings.clone(), seed)?.into()
            }
        };
        Ok(net)
    }

    /// Load the network saved in [`Registered::savedir`].
    pub fn load(
        &self,
        data: &DatasetSplits,
        root: &Path,
        debug: bool,
        device: &NdArrayDevice,
    ) -> Result<Network<TrainBackend>> {
        let dir = self.savedir(root, debug);
        let net = match self {
            Registered::Base { settings, .. } => {
                BaseNet::load(settings.clone(), data.input_shape, data.n_classes, &dir, device)
                    .map(Network::from)
            }
            Registered::Full { settings, .. } => {
                FullBnn::load(settings.clone(), data.input_shape, data.n_classes, &dir, device)
                    .map(Network::from)
            }
            Registered::Red { settings, .. } => {
                let base = self.load_base(data, root, debug, device)?;
                RedBnn::load(base, settings.clone(), &dir, device).map(Network::from)
            }
        };
        let net = net.with_context(|| {
            format!(
                "Failed to load {} from {}. Train it first with `advbnn train-attack`.",
                self.name(),
                dir.display()
            )
        })?;
        info!(name = %self.name(), dir = %dir.display(), "Loaded network");
        Ok(net)
    }

    fn load_base(
        &self,
        data: &DatasetSplits,
        root: &Path,
        debug: bool,
        device: &NdArrayDevice,
    ) -> Result<BaseNet<TrainBackend>> {
        let Registered::Red { base_idx, settings, .. } = self else {
            bail!("{} has no base network", self.name());
        };
        let base = Registered::Base {
            idx: *base_idx,
            settings: settings.base.clone(),
        };
        let dir = base.savedir(root, debug);
        BaseNet::load(settings.base.clone(), data.input_shape, data.n_classes, &dir, device)
            .with_context(|| {
                format!(
                    "Failed to load the base network of {} from {}. Train baseNN {} first.",
                    self.name(),
                    dir.display(),
                    base_idx
                )
            })
    }
}

fn base_idx_of(base: &BaseSettings) -> Result<usize> {
    (0..)
        .map_while(|idx| base_settings(idx).ok())
        .position(|settings| &settings == base)
        .with_context(|| format!("{} is not a registered baseNN", base.name()))
}

/// Train `net` on the train split, validating on the validation split.
pub fn train(
    net: Network<TrainBackend>,
    data: &DatasetSplits,
    config: &TrainConfig,
    seed: Seed,
    device: &NdArrayDevice,
) -> Result<TrainingOutput<Network<TrainBackend>>> {
    let train_loader = ImageLoader::builder(data.train.clone())
        .batch_size(BATCH_SIZE)
        .shuffle(true)
        .seed(seed)
        .split(Split::Train)
        .build()?;
    let valid_loader = if data.val.is_empty() {
        None
    } else {
        Some(
            ImageLoader::builder(data.val.clone())
                .batch_size(BATCH_SIZE)
                .split(Split::Val)
                .build()?,
        )
    };
    let output = train_network(net, &train_loader, valid_loader.as_ref(), config, device)
        .context("Training failed")?;
    Ok(output)
}

/// Write losses and accuracies per epoch as JSON next to the checkpoint.
pub fn save_history<M>(output: &TrainingOutput<M>, dir: &Path, name: &str) -> Result<PathBuf> {
    let history = json!({
        "train_losses": output.train_losses,
        "train_accs": output.train_accs,
        "valid_accs": output.valid_accs,
        "training_time_secs": output.training_time_secs,
    });
    save_json(&history, dir, &format!("{name}_history.json"))
}

/// Pretty-print `value` into `dir/filename`.
pub fn save_json(value: &serde_json::Value, dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(filename);
    fs::write(&path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
