//! Images next to their LRP heatmaps.

use std::path::{Path, PathBuf};

use ndarray::{Array4, Array5, ArrayView3, Axis};

use crate::colormap::CenteredNorm;
use crate::error::{PlotError, Result};
use crate::grid::{check_same_shape, draw_grid, mask_pixels, random_idxs, Panel, PlotStyle, Raster, Row};

/// Columns of every heatmap grid.
pub const MAX_COLUMNS: usize = 6;

/// Images in the first row, their heatmaps in the second, up to six columns.
///
/// # Errors
///
/// Returns [`PlotError::Shape`] when images and explanations differ in
/// shape, or an error if the file cannot be rendered.
pub fn plot_explanations(
    images: &Array4<f32>,
    explanations: &Array4<f32>,
    path: &Path,
    style: &PlotStyle,
) -> Result<PathBuf> {
    check_same_shape("images vs explanations", images.shape(), explanations.shape())?;
    let cols = images.len_of(Axis(0)).min(MAX_COLUMNS);
    let norm = CenteredNorm::from_values(explanations.slice(ndarray::s![..cols, .., .., ..]).iter());

    let image_row = (0..cols)
        .map(|i| Panel::new(Raster::image(images.index_axis(Axis(0), i))))
        .collect();
    let lrp_row = (0..cols)
        .map(|i| Panel::new(Raster::heatmap(explanations.index_axis(Axis(0), i), &norm)))
        .collect();
    draw_grid(
        &[Row::new("images", image_row), Row::new("lrp", lrp_row)],
        path,
        style,
    )
}

/// Everything shown by [`plot_attacks_explanations`].
#[derive(Debug, Clone, Copy)]
pub struct AttackExplanations<'a> {
    /// Clean images.
    pub images: &'a Array4<f32>,
    /// Heatmaps of the clean images.
    pub explanations: &'a Array4<f32>,
    /// Adversarial images.
    pub attacks: &'a Array4<f32>,
    /// Heatmaps of the adversarial images.
    pub attack_explanations: &'a Array4<f32>,
    /// Predicted class of each clean image.
    pub predictions: &'a [usize],
    /// Predicted class of each adversarial image.
    pub attack_predictions: &'a [usize],
    /// True class of each image.
    pub labels: &'a [usize],
    /// Flat indices of the pixels to show, per image.
    pub pixel_idxs: &'a [Vec<usize>],
}

impl AttackExplanations<'_> {
    fn validate(&self) -> Result<usize> {
        let shape = self.images.shape();
        check_same_shape("images vs explanations", shape, self.explanations.shape())?;
        check_same_shape("images vs attacks", shape, self.attacks.shape())?;
        check_same_shape("images vs attack explanations", shape, self.attack_explanations.shape())?;
        let n = shape[0];
        for (what, len) in [
            ("predictions", self.predictions.len()),
            ("attack predictions", self.attack_predictions.len()),
            ("labels", self.labels.len()),
            ("pixel indices", self.pixel_idxs.len()),
        ] {
            if len != n {
                return Err(PlotError::Shape(format!("{len} {what} for {n} images")));
            }
        }
        Ok(n)
    }
}

/// Four rows on up to six randomly chosen images: images, their heatmaps,
/// attacks and the attack heatmaps. Heatmaps only show the selected pixels.
///
/// # Errors
///
/// Returns [`PlotError::Shape`] when the inputs don't line up, or an error
/// if the file cannot be rendered.
pub fn plot_attacks_explanations(data: &AttackExplanations<'_>, path: &Path, style: &PlotStyle) -> Result<PathBuf> {
    let n = data.validate()?;
    let idxs = random_idxs(n, MAX_COLUMNS, style.seed);

    let masked = |heatmaps: &Array4<f32>| -> Vec<ndarray::Array3<f32>> {
        idxs.iter()
            .map(|&i| mask_pixels(heatmaps.index_axis(Axis(0), i), &data.pixel_idxs[i]))
            .collect()
    };
    let explanations = masked(data.explanations);
    let attack_explanations = masked(data.attack_explanations);
    let norm = CenteredNorm::from_values(explanations.iter().flatten());
    let attack_norm = CenteredNorm::from_values(attack_explanations.iter().flatten());

    let image_panel = |array: ArrayView3<'_, f32>| Panel::new(Raster::image(array));
    let rows = [
        Row::new(
            "images",
            idxs.iter()
                .map(|&i| {
                    image_panel(data.images.index_axis(Axis(0), i)).with_caption(format!(
                        "label={} pred={}",
                        data.labels[i], data.predictions[i]
                    ))
                })
                .collect(),
        ),
        Row::new(
            "lrp(images)",
            explanations
                .iter()
                .map(|h| Panel::new(Raster::heatmap(h.view(), &norm)))
                .collect(),
        ),
        Row::new(
            "im. attacks",
            idxs.iter()
                .map(|&i| {
                    image_panel(data.attacks.index_axis(Axis(0), i))
                        .with_caption(format!("pred={}", data.attack_predictions[i]))
                })
                .collect(),
        ),
        Row::new(
            "lrp(attacks)",
            attack_explanations
                .iter()
                .map(|h| Panel::new(Raster::heatmap(h.view(), &attack_norm)))
                .collect(),
        ),
    ];
    draw_grid(&rows, path, style)
}

/// Images in the first row, then one row of heatmaps per sample count.
///
/// `samples_explanations` is `(S, N, C, H, W)` with one batch per entry of
/// `n_samples_list`; `idxs` are the images to show, usually those whose
/// heatmap norm vanishes. At most five sample counts and six images are
/// drawn, each image with its own color scale.
///
/// # Errors
///
/// Returns [`PlotError::Shape`] for mismatched inputs and
/// [`PlotError::NotEnoughExamples`] for fewer than two images.
pub fn plot_vanishing_explanations(
    images: &Array4<f32>,
    samples_explanations: &Array5<f32>,
    n_samples_list: &[usize],
    idxs: &[usize],
    path: &Path,
    style: &PlotStyle,
) -> Result<PathBuf> {
    check_same_shape("images vs explanations", images.shape(), &samples_explanations.shape()[1..])?;
    if samples_explanations.len_of(Axis(0)) != n_samples_list.len() {
        return Err(PlotError::Shape(format!(
            "{} heatmap batches for {} sample counts",
            samples_explanations.len_of(Axis(0)),
            n_samples_list.len()
        )));
    }
    let n_images = images.len_of(Axis(0));
    if let Some(bad) = idxs.iter().find(|&&i| i >= n_images) {
        return Err(PlotError::Shape(format!("image index {bad} out of {n_images}")));
    }
    if idxs.len() <= 1 {
        return Err(PlotError::NotEnoughExamples(format!(
            "{} images to compare",
            idxs.len()
        )));
    }

    let chosen: Vec<usize> = random_idxs(idxs.len(), MAX_COLUMNS, style.seed)
        .into_iter()
        .map(|i| idxs[i])
        .collect();
    let norms: Vec<CenteredNorm> = chosen
        .iter()
        .map(|&i| CenteredNorm::from_values(samples_explanations.index_axis(Axis(1), i).iter()))
        .collect();

    let mut rows = vec![Row::new(
        "images",
        chosen
            .iter()
            .map(|&i| Panel::new(Raster::image(images.index_axis(Axis(0), i))))
            .collect(),
    )];
    for (s, n_samples) in n_samples_list.iter().enumerate().take(5) {
        let batch = samples_explanations.index_axis(Axis(0), s);
        rows.push(Row::new(
            format!("samp={n_samples}"),
            chosen
                .iter()
                .zip(&norms)
                .map(|(&i, norm)| Panel::new(Raster::heatmap(batch.index_axis(Axis(0), i), norm)))
                .collect(),
        ));
    }
    draw_grid(&rows, path, style)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> PlotStyle {
        PlotStyle::default().without_captions().with_panel_size(16)
    }

    fn batch(n: usize) -> Array4<f32> {
        Array4::from_shape_fn((n, 1, 5, 5), |(i, _, h, w)| ((i + h + w) % 4) as f32 / 3.0)
    }

    #[test]
    fn test_plot_explanations() {
        let dir = tempfile::tempdir().unwrap();
        let images = batch(8);
        let lrp = images.mapv(|v| v - 0.5);
        let path = plot_explanations(&images, &lrp, &dir.path().join("lrp/expl.png"), &style()).unwrap();
        assert!(path.exists());

        let wrong = batch(7);
        assert!(matches!(
            plot_explanations(&images, &wrong, &dir.path().join("x.png"), &style()),
            Err(PlotError::Shape(_))
        ));
    }

    #[test]
    fn test_plot_attacks_explanations() {
        let dir = tempfile::tempdir().unwrap();
        let images = batch(4);
        let lrp = images.mapv(|v| v - 0.5);
        let labels = vec![0, 1, 2, 3];
        let pixel_idxs = vec![vec![0, 1, 2]; 4];
        let data = AttackExplanations {
            images: &images,
            explanations: &lrp,
            attacks: &images,
            attack_explanations: &lrp,
            predictions: &labels,
            attack_predictions: &labels,
            labels: &labels,
            pixel_idxs: &pixel_idxs,
        };
        assert!(plot_attacks_explanations(&data, &dir.path().join("atk.png"), &style()).is_ok());

        let short = AttackExplanations {
            labels: &labels[..2],
            ..data
        };
        assert!(matches!(
            plot_attacks_explanations(&short, &dir.path().join("atk.png"), &style()),
            Err(PlotError::Shape(_))
        ));
    }

    #[test]
    fn test_plot_vanishing_explanations() {
        let dir = tempfile::tempdir().unwrap();
        let images = batch(3);
        let heatmaps = Array5::from_shape_fn((2, 3, 1, 5, 5), |(s, i, _, h, w)| {
            ((h * w + i) as f32 - 4.0) / (s + 1) as f32
        });
        let path = dir.path().join("vanishing.png");
        assert!(plot_vanishing_explanations(&images, &heatmaps, &[1, 10], &[0, 2], &path, &style()).is_ok());
        assert!(matches!(
            plot_vanishing_explanations(&images, &heatmaps, &[1, 10], &[0], &path, &style()),
            Err(PlotError::NotEnoughExamples(_))
        ));
        assert!(matches!(
            plot_vanishing_explanations(&images, &heatmaps, &[1], &[0, 1], &path, &style()),
            Err(PlotError::Shape(_))
        ));
    }
}
