//! Model checkpointing.
//!
//! Weights are stored with Burn's named MessagePack recorder at full
//! precision as `{dir}/{name}_weights.mpk`, next to a JSON metadata file
//! `{dir}/{name}_meta.json` describing how to rebuild the network.
//!
//! Model names contain dots (`lr=0.001`), so paths are always built with an
//! explicit `.mpk` extension before they reach the recorder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use advbnn_core::{ImageShape, Seed};
use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ModelError, Result};
use crate::settings::ModelType;

/// Path of the weights file for a model name.
#[must_use]
pub fn weights_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}_weights.mpk"))
}

/// Path of the metadata file for a model name.
#[must_use]
pub fn metadata_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}_meta.json"))
}

/// Save a module's record under `dir`.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_module<B, M>(module: &M, dir: &Path, name: &str) -> Result<PathBuf>
where
    B: Backend,
    M: Module<B>,
{
    std::fs::create_dir_all(dir)?;
    let path = weights_path(dir, name);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(module.clone().into_record(), path.clone())
        .map_err(|e| ModelError::Checkpoint(format!("save {}: {e}", path.display())))?;
    info!(path = %path.display(), "Saved weights");
    Ok(path)
}

/// Load a record saved by [`save_module`] into `module`.
///
/// # Errors
///
/// Returns an error if the file is missing or does not match the module.
pub fn load_module<B, M>(module: M, dir: &Path, name: &str, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = weights_path(dir, name);
    if !path.exists() {
        return Err(ModelError::Checkpoint(format!(
            "no weights at {}",
            path.display()
        )));
    }
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(path.clone(), device)
        .map_err(|e| ModelError::Checkpoint(format!("load {}: {e}", path.display())))?;
    info!(path = %path.display(), "Loaded weights");
    Ok(module.load_record(record))
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model name.
    pub name: String,
    /// Network family.
    pub model_type: ModelType,
    /// Settings as JSON.
    pub settings_json: String,
    /// Input image shape.
    pub input_shape: ImageShape,
    /// Number of classes.
    pub n_classes: usize,
    /// Seed from which posterior draws are derived.
    pub seed: Seed,
    /// Additional metadata.
    pub extra: BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for a model.
    pub fn new(
        name: impl Into<String>,
        model_type: ModelType,
        input_shape: ImageShape,
        n_classes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            model_type,
            settings_json: String::new(),
            input_shape,
            n_classes,
            seed: Seed::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Set the settings JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be serialized.
    pub fn with_settings<S: Serialize>(mut self, settings: &S) -> Result<Self> {
        self.settings_json =
            serde_json::to_string(settings).map_err(|e| ModelError::Checkpoint(e.to_string()))?;
        Ok(self)
    }

    /// Set the posterior seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to `{dir}/{name}_meta.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ModelError::Checkpoint(e.to_string()))?;
        std::fs::write(metadata_path(dir, &self.name), json)?;
        Ok(())
    }

    /// Load metadata for a model name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let json = std::fs::read_to_string(metadata_path(dir, name))?;
        serde_json::from_str(&json).map_err(|e| ModelError::Checkpoint(e.to_string()))
    }
}
