//! `.npy` persistence for attacks, heatmaps and robustness vectors.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array4, ArrayD, Dimension, Ix4};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use tracing::debug;

use crate::error::{DataError, Result};

/// Save an array as `{dir}/{name}.npy`, creating `dir` if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_array<D: Dimension>(
    array: &ndarray::Array<f32, D>,
    dir: &Path,
    name: &str,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}.npy"));
    let writer = BufWriter::new(File::create(&path)?);
    array
        .write_npy(writer)
        .map_err(|e| DataError::FormatError(format!("Failed to write {}: {e}", path.display())))?;
    debug!(path = %path.display(), shape = ?array.shape(), "Saved array");
    Ok(())
}

/// Load `{dir}/{name}.npy` with dynamic dimensionality.
///
/// # Errors
///
/// Returns an error if the file is missing or not an `f32` array.
pub fn load_array(dir: &Path, name: &str) -> Result<ArrayD<f32>> {
    let path = dir.join(format!("{name}.npy"));
    if !path.exists() {
        return Err(DataError::MissingFile(path.display().to_string()));
    }
    let reader = BufReader::new(File::open(&path)?);
    let array = ArrayD::<f32>::read_npy(reader)
        .map_err(|e| DataError::FormatError(format!("Failed to read {}: {e}", path.display())))?;
    debug!(path = %path.display(), shape = ?array.shape(), "Loaded array");
    Ok(array)
}

/// Load `{dir}/{name}.npy` as a `(N, C, H, W)` array.
///
/// # Errors
///
/// Returns an error if the file is missing or not 4-dimensional.
pub fn load_array4(dir: &Path, name: &str) -> Result<Array4<f32>> {
    load_array(dir, name)?
        .into_dimensionality::<Ix4>()
        .map_err(|e| DataError::InvalidShape(e.to_string()))
}
