//! The training loop.
//!
//! Every procedure in this crate optimises some burn module with Adam and a
//! cross-entropy objective, optionally plus a penalty (the KL term of the
//! ELBO or the Gaussian prior of a MAP fit). [`Trainer::fit_with_forward`]
//! owns that loop; the procedures only say how a batch becomes logits.

use std::time::Instant;

use advbnn_core::tensor::argmax_rows;
use advbnn_core::SampleSpec;
use advbnn_data::ImageLoader;
use advbnn_models::forward::forward_layers;
use advbnn_models::{BaseNet, LayeredNet, NetParams};
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use tracing::{debug, info};

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};
use crate::evaluation::evaluate_accuracy;

/// Output of one training forward pass.
#[derive(Debug, Clone)]
pub struct Objective<B: Backend> {
    /// Class logits `(N, K)`.
    pub logits: Tensor<B, 2>,
    /// Term added to the mean cross-entropy, shape `[1]`.
    pub penalty: Option<Tensor<B, 1>>,
}

impl<B: Backend> Objective<B> {
    /// Plain cross-entropy on `logits`.
    #[must_use]
    pub fn logits(logits: Tensor<B, 2>) -> Self {
        Self {
            logits,
            penalty: None,
        }
    }

    /// Cross-entropy plus `penalty`.
    #[must_use]
    pub fn with_penalty(mut self, penalty: Tensor<B, 1>) -> Self {
        self.penalty = Some(penalty);
        self
    }
}

/// Trained module with its history.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    /// Trained model.
    pub model: M,
    /// Mean training loss per epoch.
    pub train_losses: Vec<f32>,
    /// Training accuracy per epoch, in percent.
    pub train_accs: Vec<f32>,
    /// Validation accuracy per epoch, in percent, when validating.
    pub valid_accs: Vec<f32>,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

impl<M> TrainingOutput<M> {
    /// Replace the model, keeping the history.
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> TrainingOutput<N> {
        TrainingOutput {
            model: f(self.model),
            train_losses: self.train_losses,
            train_accs: self.train_accs,
            valid_accs: self.valid_accs,
            training_time_secs: self.training_time_secs,
        }
    }
}

/// Adam trainer on an autodiff backend.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a new trainer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, device })
    }

    /// Training configuration.
    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Device batches are loaded on.
    #[must_use]
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Optimise `module` with Adam.
    ///
    /// `forward_fn` maps a batch of images to logits and an optional
    /// penalty; `valid_fn` returns the validation accuracy of the current
    /// module, or `None` when there is nothing to validate on.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::EmptyDataset`] for an empty loader, or any error
    /// raised by the closures.
    pub fn fit_with_forward<M, F, V>(
        &self,
        module: M,
        train: &ImageLoader,
        forward_fn: F,
        valid_fn: V,
    ) -> Result<TrainingOutput<M>>
    where
        M: AutodiffModule<B> + Clone,
        F: Fn(&M, Tensor<B, 4>) -> Result<Objective<B>>,
        V: Fn(&M) -> Result<Option<f32>>,
    {
        if train.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let start_time = Instant::now();
        let mut optim = AdamConfig::new().init::<B, M>();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        let mut train_losses = Vec::with_capacity(self.config.n_epochs);
        let mut train_accs = Vec::with_capacity(self.config.n_epochs);
        let mut valid_accs = Vec::new();
        let mut model = module;

        for epoch in 0..self.config.n_epochs {
            let mut total_loss = 0.0f32;
            let mut correct = 0usize;
            let mut seen = 0usize;
            let mut n_batches = 0usize;

            for batch in train.iter::<B>(&self.device, epoch) {
                let [batch_size] = batch.labels.dims();
                let objective = forward_fn(&model, batch.images)?;

                let hits: i64 = argmax_rows(objective.logits.clone().detach())
                    .equal(batch.labels.clone())
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();
                correct += hits as usize;
                seen += batch_size;

                let mut loss = loss_fn.forward(objective.logits, batch.labels).mean();
                if let Some(penalty) = objective.penalty {
                    loss = loss + penalty;
                }
                total_loss += loss.clone().into_scalar().elem::<f32>();

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(self.config.lr, model, grads);
                n_batches += 1;
            }

            let train_loss = total_loss / n_batches.max(1) as f32;
            let train_acc = 100.0 * correct as f32 / seen.max(1) as f32;
            train_losses.push(train_loss);
            train_accs.push(train_acc);

            match valid_fn(&model)? {
                Some(valid_acc) => {
                    valid_accs.push(valid_acc);
                    info!(
                        epoch = epoch + 1,
                        n_epochs = self.config.n_epochs,
                        loss = train_loss,
                        train_acc,
                        valid_acc,
                        "epoch finished"
                    );
                }
                None => info!(
                    epoch = epoch + 1,
                    n_epochs = self.config.n_epochs,
                    loss = train_loss,
                    train_acc,
                    "epoch finished"
                ),
            }
        }

        let training_time_secs = start_time.elapsed().as_secs_f64();
        debug!(training_time_secs, "training complete");
        Ok(TrainingOutput {
            model,
            train_losses,
            train_accs,
            valid_accs,
            training_time_secs,
        })
    }
}

/// Train a deterministic network with Adam on cross-entropy.
///
/// # Errors
///
/// Returns an error for an invalid configuration, an empty loader, or
/// weights that don't fit the architecture.
pub fn train_base<B: AutodiffBackend>(
    net: BaseNet<B>,
    train: &ImageLoader,
    valid: Option<&ImageLoader>,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutput<BaseNet<B>>> {
    info!(name = %net.name(), n_train = train.len(), "training baseNN");
    let trainer = Trainer::<B>::new(config.clone(), device.clone())?;
    let arch = net.architecture().clone();
    let n_layers = arch.n_layers();

    let output = trainer.fit_with_forward(
        net.params().clone(),
        train,
        |params: &NetParams<B>, x| {
            let weights = params.weights(&arch)?;
            let logits = forward_layers(&arch, &weights, x, n_layers)?.into_flat();
            Ok(Objective::logits(logits))
        },
        |params: &NetParams<B>| match valid {
            Some(loader) => {
                let current = net.clone().with_params(params.clone()).valid();
                Ok(Some(evaluate_accuracy::<B::InnerBackend, _>(
                    &current,
                    loader,
                    &SampleSpec::Deterministic,
                    device,
                )?))
            }
            None => Ok(None),
        },
    )?;
    Ok(output.map(|params| net.with_params(params)))
}
