//! Comparing heatmaps of clean and adversarial images.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array, Array1, Array2, Array4, Array5, ArrayD, ArrayView2, ArrayViewD, Axis, Dimension, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ExplainError, Result};

/// The most relevant pixels of one or more heatmaps.
#[derive(Debug, Clone, PartialEq)]
pub struct InformativePixels {
    /// Flat pixel indices, least relevant first.
    pub idxs: Vec<usize>,
    /// Heatmap values on those pixels, leading dimensions kept.
    pub values: ArrayD<f32>,
}

/// Select the `topk` pixels with the largest relevance.
///
/// Accepts a single heatmap `(C, H, W)`, a batch `(N, C, H, W)` or a batch
/// per sample count `(S, N, C, H, W)`. Spatial dimensions are flattened and
/// relevance is summed over the leading dimensions before ranking.
///
/// # Errors
///
/// Returns [`ExplainError::Shape`] for arrays of any other rank.
pub fn select_informative_pixels(heatmaps: ArrayViewD<'_, f32>, topk: usize) -> Result<InformativePixels> {
    let n_leading = match heatmaps.ndim() {
        3 => 0,
        4 => 1,
        5 => 2,
        ndim => {
            return Err(ExplainError::Shape(format!(
                "heatmaps should have rank 3, 4 or 5, got {ndim}"
            )))
        }
    };
    let shape = heatmaps.shape();
    let leading = &shape[..n_leading];
    let n_pixels: usize = shape[n_leading..].iter().product();
    let n_rows: usize = leading.iter().product();

    let flat = heatmaps
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((n_rows, n_pixels))
        .map_err(|e| ExplainError::Shape(e.to_string()))?;
    let summed = flat.sum_axis(Axis(0));

    let mut order: Vec<usize> = (0..n_pixels).collect();
    order.sort_by(|&a, &b| summed[a].total_cmp(&summed[b]));
    let idxs = order.split_off(n_pixels.saturating_sub(topk));

    let mut values_shape = leading.to_vec();
    values_shape.push(idxs.len());
    let values = flat
        .select(Axis(1), &idxs)
        .into_shape_with_order(IxDyn(&values_shape))
        .map_err(|e| ExplainError::Shape(e.to_string()))?;

    debug!(topk, n_pixels, "selected informative pixels");
    Ok(InformativePixels { idxs, values })
}

/// How two heatmaps of the same image are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobustnessMethod {
    /// Fraction of shared top-k pixels.
    Imagewise,
    /// Negative distance on the shared top-k pixels of all images.
    Pixelwise,
}

impl RobustnessMethod {
    /// Method name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            RobustnessMethod::Imagewise => "imagewise",
            RobustnessMethod::Pixelwise => "pixelwise",
        }
    }
}

impl FromStr for RobustnessMethod {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imagewise" | "intersection" => Ok(RobustnessMethod::Imagewise),
            "pixelwise" => Ok(RobustnessMethod::Pixelwise),
            other => Err(ExplainError::NotImplemented(format!(
                "LRP robustness method {other}"
            ))),
        }
    }
}

impl fmt::Display for RobustnessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-image LRP robustness.
#[derive(Debug, Clone, PartialEq)]
pub struct LrpRobustness {
    /// One score per image.
    pub robustness: Array1<f32>,
    /// Top-k pixels shared by each pair of heatmaps, sorted.
    pub pixel_idxs: Vec<Vec<usize>>,
    /// Union of [`LrpRobustness::pixel_idxs`], sorted.
    pub union_idxs: Vec<usize>,
}

fn common_pixels(original: ArrayViewD<'_, f32>, adversarial: ArrayViewD<'_, f32>, topk: usize) -> Result<Vec<usize>> {
    let orig: BTreeSet<usize> = select_informative_pixels(original, topk)?.idxs.into_iter().collect();
    let adv: BTreeSet<usize> = select_informative_pixels(adversarial, topk)?.idxs.into_iter().collect();
    Ok(orig.intersection(&adv).copied().collect())
}

/// Compare the heatmaps of clean images with those of their attacks.
///
/// # Errors
///
/// Returns [`ExplainError::Shape`] when the two batches differ in shape.
pub fn lrp_robustness(
    original: &Array4<f32>,
    adversarial: &Array4<f32>,
    topk: usize,
    method: RobustnessMethod,
) -> Result<LrpRobustness> {
    if original.shape() != adversarial.shape() {
        return Err(ExplainError::Shape(format!(
            "original heatmaps {:?} vs adversarial heatmaps {:?}",
            original.shape(),
            adversarial.shape()
        )));
    }

    let pixel_idxs = original
        .outer_iter()
        .zip(adversarial.outer_iter())
        .map(|(o, a)| common_pixels(o.into_dyn(), a.into_dyn(), topk))
        .collect::<Result<Vec<_>>>()?;
    let union_idxs: Vec<usize> = pixel_idxs
        .iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let robustness = match method {
        RobustnessMethod::Imagewise => {
            let topk = topk.max(1) as f32;
            pixel_idxs.iter().map(|idxs| idxs.len() as f32 / topk).collect()
        }
        RobustnessMethod::Pixelwise => -lrp_distances(original, adversarial, Some(&union_idxs))?,
    };
    info!(
        method = %method,
        topk,
        mean = robustness.mean().unwrap_or(f32::NAN),
        "LRP robustness"
    );
    Ok(LrpRobustness {
        robustness,
        pixel_idxs,
        union_idxs,
    })
}

fn flatten_images(heatmaps: &Array4<f32>) -> Result<Array2<f32>> {
    let n = heatmaps.len_of(Axis(0));
    let n_pixels = heatmaps.len().checked_div(n).unwrap_or(0);
    heatmaps
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((n, n_pixels))
        .map_err(|e| ExplainError::Shape(e.to_string()))
}

fn row_distances(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Array1<f32> {
    (&a - &b).map_axis(Axis(1), |row| row.iter().map(|v| v * v).sum::<f32>().sqrt())
}

/// Per-image L2 distance between heatmaps, optionally on selected pixels.
///
/// # Errors
///
/// Returns [`ExplainError::Shape`] for mismatched batches or pixel indices
/// out of range.
pub fn lrp_distances(
    original: &Array4<f32>,
    adversarial: &Array4<f32>,
    pxl_idxs: Option<&[usize]>,
) -> Result<Array1<f32>> {
    if original.shape() != adversarial.shape() {
        return Err(ExplainError::Shape(format!(
            "{:?} vs {:?}",
            original.shape(),
            adversarial.shape()
        )));
    }
    if original.is_empty() {
        return Ok(Array1::zeros(original.len_of(Axis(0))));
    }
    let original = flatten_images(original)?;
    let adversarial = flatten_images(adversarial)?;
    match pxl_idxs {
        Some(idxs) => {
            let n_pixels = original.len_of(Axis(1));
            if let Some(bad) = idxs.iter().find(|&&i| i >= n_pixels) {
                return Err(ExplainError::Shape(format!(
                    "pixel index {bad} out of range for {n_pixels} pixels"
                )));
            }
            Ok(row_distances(
                original.select(Axis(1), idxs).view(),
                adversarial.select(Axis(1), idxs).view(),
            ))
        }
        None => Ok(row_distances(original.view(), adversarial.view())),
    }
}

/// Rescale to `[-1, 1]`; constant inputs map to zeros.
#[must_use]
pub fn normalize<D: Dimension>(lrp: &Array<f32, D>) -> Array<f32, D> {
    let min = lrp.iter().copied().fold(f32::INFINITY, f32::min);
    let max = lrp.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range == 0.0 {
        return Array::zeros(lrp.raw_dim());
    }
    lrp.mapv(|v| 2.0 * (v - min) / range - 1.0)
}

/// Heatmap norm used by [`vanishing_norm_idxs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Norm {
    /// Largest absolute value.
    Linfty,
    /// Euclidean norm.
    L2,
}

impl Norm {
    fn of(&self, values: ArrayViewD<'_, f32>) -> f32 {
        match self {
            Norm::Linfty => values.iter().fold(0.0_f32, |m, v| m.max(v.abs())),
            Norm::L2 => values.iter().map(|v| v * v).sum::<f32>().sqrt(),
        }
    }
}

impl FromStr for Norm {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linfty" => Ok(Norm::Linfty),
            "l2" => Ok(Norm::L2),
            other => Err(ExplainError::UnknownNorm(other.to_string())),
        }
    }
}

/// Images whose heatmap norm shrinks with the number of samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VanishingNorms {
    /// Non-null images whose norm never increases along the sample counts.
    pub vanishing_idxs: Vec<usize>,
    /// Every image with a non-zero norm at the first sample count.
    pub non_null_idxs: Vec<usize>,
}

/// Find heatmaps whose norm is non-increasing in the number of samples.
///
/// `inputs` holds one heatmap batch per entry of `n_samples_list`, in the
/// same order.
///
/// # Errors
///
/// Returns [`ExplainError::Shape`] when the first dimension differs from
/// the length of `n_samples_list`.
pub fn vanishing_norm_idxs(inputs: &Array5<f32>, n_samples_list: &[usize], norm: Norm) -> Result<VanishingNorms> {
    let n_counts = inputs.len_of(Axis(0));
    if n_counts != n_samples_list.len() {
        return Err(ExplainError::Shape(format!(
            "first dimension {n_counts} should equal the number of sample counts {}",
            n_samples_list.len()
        )));
    }

    let n_images = inputs.len_of(Axis(1));
    let mut result = VanishingNorms::default();
    for idx in 0..n_images {
        let image = inputs.index_axis(Axis(1), idx);
        let norms: Vec<f32> = image.outer_iter().map(|h| norm.of(h.into_dyn())).collect();
        let Some(&first) = norms.first() else {
            continue;
        };
        if first == 0.0 {
            continue;
        }
        result.non_null_idxs.push(idx);
        if norms.windows(2).all(|w| w[1] <= w[0]) {
            result.vanishing_idxs.push(idx);
        }
    }

    let pct = |count: usize| 100.0 * count as f32 / n_images.max(1) as f32;
    info!(
        vanishing = pct(result.vanishing_idxs.len()),
        increasing = pct(result.non_null_idxs.len() - result.vanishing_idxs.len()),
        null = pct(n_images - result.non_null_idxs.len()),
        "Heatmap norms (%)"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn heatmaps(n: usize) -> Array4<f32> {
        Array4::from_shape_fn((n, 1, 4, 4), |(i, _, h, w)| ((i * 3 + h * 4 + w) % 10) as f32 - 3.0)
    }

    #[test]
    fn test_select_informative_pixels() {
        let single = Array3::from_shape_fn((1, 2, 3), |(_, h, w)| (h * 3 + w) as f32);
        let pixels = select_informative_pixels(single.view().into_dyn(), 2).unwrap();
        assert_eq!(pixels.idxs, vec![4, 5]);
        assert_eq!(pixels.values.shape(), &[2]);

        let batch = heatmaps(3);
        let pixels = select_informative_pixels(batch.view().into_dyn(), 5).unwrap();
        assert_eq!(pixels.idxs.len(), 5);
        assert_eq!(pixels.values.shape(), &[3, 5]);

        let stacked = batch.clone().insert_axis(Axis(0));
        let pixels = select_informative_pixels(stacked.view().into_dyn(), 100).unwrap();
        assert_eq!(pixels.values.shape(), &[1, 3, 16]);
    }

    #[test]
    fn test_select_rejects_other_ranks() {
        let flat = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            select_informative_pixels(flat.view().into_dyn(), 1),
            Err(ExplainError::Shape(_))
        ));
    }

    #[test]
    fn test_identical_heatmaps() {
        let h = heatmaps(4);
        let imagewise = lrp_robustness(&h, &h, 5, RobustnessMethod::Imagewise).unwrap();
        assert!(imagewise.robustness.iter().all(|&r| r == 1.0));
        assert!(imagewise.pixel_idxs.iter().all(|idxs| idxs.len() == 5));

        let pixelwise = lrp_robustness(&h, &h, 5, RobustnessMethod::Pixelwise).unwrap();
        assert!(pixelwise.robustness.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_disjoint_heatmaps() {
        let mut original = Array4::<f32>::zeros((1, 1, 2, 2));
        original[[0, 0, 0, 0]] = 1.0;
        let mut adversarial = Array4::<f32>::zeros((1, 1, 2, 2));
        adversarial[[0, 0, 1, 1]] = 1.0;
        let result = lrp_robustness(&original, &adversarial, 1, RobustnessMethod::Imagewise).unwrap();
        assert_eq!(result.robustness, array![0.0]);
        assert!(result.union_idxs.is_empty());
    }

    #[test]
    fn test_method_names() {
        assert_eq!("intersection".parse::<RobustnessMethod>().unwrap(), RobustnessMethod::Imagewise);
        assert!(matches!(
            "average".parse::<RobustnessMethod>(),
            Err(ExplainError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_lrp_distances() {
        let a = heatmaps(2);
        let b = &a + 1.0;
        let all = lrp_distances(&a, &b, None).unwrap();
        assert!((all[0] - 4.0).abs() < 1e-6);
        let some = lrp_distances(&a, &b, Some(&[0, 3, 8, 9])).unwrap();
        assert!((some[1] - 2.0).abs() < 1e-6);
        assert!(lrp_distances(&a, &b, Some(&[16])).is_err());

        let empty = Array4::<f32>::zeros((0, 1, 4, 4));
        assert_eq!(lrp_distances(&empty, &empty, None).unwrap().len(), 0);
    }

    #[test]
    fn test_normalize() {
        let x = array![0.0_f32, 5.0, 10.0];
        assert_eq!(normalize(&x), array![-1.0, 0.0, 1.0]);
        assert_eq!(normalize(&array![2.0_f32, 2.0]), array![0.0, 0.0]);
    }

    #[test]
    fn test_vanishing_norms() {
        let mut inputs = Array5::<f32>::zeros((3, 3, 1, 2, 2));
        for (s, scale) in [3.0_f32, 2.0, 1.0].into_iter().enumerate() {
            inputs[[s, 0, 0, 0, 0]] = scale;
        }
        for (s, scale) in [1.0_f32, 2.0, 0.5].into_iter().enumerate() {
            inputs[[s, 1, 0, 1, 1]] = scale;
        }

        for norm in [Norm::Linfty, Norm::L2] {
            let result = vanishing_norm_idxs(&inputs, &[1, 10, 50], norm).unwrap();
            assert_eq!(result.vanishing_idxs, vec![0]);
            assert_eq!(result.non_null_idxs, vec![0, 1]);
        }

        assert!(matches!(
            vanishing_norm_idxs(&inputs, &[1, 10], Norm::L2),
            Err(ExplainError::Shape(_))
        ));
        assert!(matches!("l1".parse::<Norm>(), Err(ExplainError::UnknownNorm(_))));
    }
}
