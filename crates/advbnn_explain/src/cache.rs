//! Cached heatmaps under `{savedir}/lrp/pkl/`.

use std::path::{Path, PathBuf};

use advbnn_core::SampleSpec;
use advbnn_data::{load_array4, save_array};
use ndarray::Array4;
use tracing::info;

use crate::error::Result;

/// What a cached heatmap batch explains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatmapKind {
    /// The adversarial images themselves.
    Attack,
    /// Heatmaps of the clean images.
    Lrp,
    /// Heatmaps of the adversarial images.
    AttackLrp,
}

impl HeatmapKind {
    const fn name(self) -> &'static str {
        match self {
            HeatmapKind::Attack => "attack",
            HeatmapKind::Lrp => "lrp",
            HeatmapKind::AttackLrp => "attack_lrp",
        }
    }
}

/// Directory holding cached heatmaps.
#[must_use]
pub fn lrp_dir(savedir: &Path) -> PathBuf {
    savedir.join("lrp").join("pkl")
}

/// `det_{kind}`, `bay_{kind}_samp={n}` or `mode_{kind}_samp={n}`.
///
/// The posterior-mean pipeline is keyed by the sample count of the
/// Bayesian run it is compared with.
#[must_use]
pub fn heatmap_name(kind: HeatmapKind, spec: &SampleSpec, n_samples: Option<usize>) -> String {
    let kind = kind.name();
    match (spec, spec.n_samples().or(n_samples)) {
        (SampleSpec::Samples { .. }, Some(n)) => format!("bay_{kind}_samp={n}"),
        (SampleSpec::PosteriorMean, Some(n)) => format!("mode_{kind}_samp={n}"),
        _ => format!("det_{kind}"),
    }
}

/// Save a heatmap batch as `.npy`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_heatmaps(
    heatmaps: &Array4<f32>,
    savedir: &Path,
    kind: HeatmapKind,
    spec: &SampleSpec,
    n_samples: Option<usize>,
) -> Result<PathBuf> {
    let dir = lrp_dir(savedir);
    let name = heatmap_name(kind, spec, n_samples);
    save_array(heatmaps, &dir, &name)?;
    info!(name = %name, dir = %dir.display(), "Saved heatmaps");
    Ok(dir.join(format!("{name}.npy")))
}

/// Load a batch saved with [`save_heatmaps`].
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_heatmaps(
    savedir: &Path,
    kind: HeatmapKind,
    spec: &SampleSpec,
    n_samples: Option<usize>,
) -> Result<Array4<f32>> {
    let name = heatmap_name(kind, spec, n_samples);
    Ok(load_array4(&lrp_dir(savedir), &name)?)
}
