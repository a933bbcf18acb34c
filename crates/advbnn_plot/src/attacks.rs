//! Clean images above their adversarial versions.

use std::path::{Path, PathBuf};

use ndarray::Array4;

use crate::error::Result;
use crate::grid::{check_same_shape, draw_grid, Panel, PlotStyle, Raster, Row};

/// Two-row grid: originals on top, perturbed images below, one column per
/// image.
///
/// # Errors
///
/// Returns [`crate::PlotError::Shape`] when the batches differ in shape, or
/// an error if the file cannot be rendered.
pub fn plot_grid_attacks(
    original: &Array4<f32>,
    perturbed: &Array4<f32>,
    path: &Path,
    style: &PlotStyle,
) -> Result<PathBuf> {
    check_same_shape("original vs perturbed", original.shape(), perturbed.shape())?;
    let row = |label: &str, images: &Array4<f32>| {
        Row::new(
            label,
            images
                .outer_iter()
                .map(|image| Panel::new(Raster::image(image)))
                .collect(),
        )
    };
    draw_grid(
        &[row("original", original), row("perturbed", perturbed)],
        path,
        style,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlotError;

    #[test]
    fn test_plot_grid_attacks() {
        let dir = tempfile::tempdir().unwrap();
        let original = Array4::from_shape_fn((3, 1, 6, 6), |(i, _, h, _)| (i + h) as f32 / 8.0);
        let perturbed = original.mapv(|v| (v + 0.25).min(1.0));
        let style = PlotStyle::default().without_captions().with_panel_size(12);

        let path = plot_grid_attacks(&original, &perturbed, &dir.path().join("attacks/grid.png"), &style)
            .unwrap();
        assert!(path.exists());

        let fewer = original.slice(ndarray::s![..2, .., .., ..]).to_owned();
        assert!(matches!(
            plot_grid_attacks(&original, &fewer, &path, &style),
            Err(PlotError::Shape(_))
        ));
    }
}
