//! Grids of image panels rendered to PNG.

use std::fs;
use std::path::{Path, PathBuf};

use advbnn_core::Seed;
use ndarray::{Array3, ArrayView3, Axis};
use plotters::prelude::*;
use rand::seq::index::sample;
use tracing::info;

use crate::colormap::{greys, CenteredNorm};
use crate::error::{PlotError, Result};

/// Look of every plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotStyle {
    /// Side of one image panel in pixels.
    pub panel_size: u32,
    /// Whether to draw titles, labels and axes. Text needs system fonts.
    pub captions: bool,
    /// Seed for picking the plotted images.
    pub seed: Seed,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            panel_size: 120,
            captions: true,
            seed: Seed::new(0),
        }
    }
}

impl PlotStyle {
    /// Set the panel size.
    #[must_use]
    pub fn with_panel_size(mut self, panel_size: u32) -> Self {
        self.panel_size = panel_size.max(8);
        self
    }

    /// Render without any text.
    #[must_use]
    pub fn without_captions(mut self) -> Self {
        self.captions = false;
        self
    }

    /// Set the seed for image selection.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }
}

/// Pixel colors of one panel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Raster {
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<RGBColor>,
}

impl Raster {
    /// Greyscale image; multi-channel images are averaged over channels.
    pub fn image(image: ArrayView3<'_, f32>) -> Self {
        let (_, height, width) = image.dim();
        let mean = image.mean_axis(Axis(0)).unwrap_or_else(|| ndarray::Array2::zeros((height, width)));
        Self {
            height,
            width,
            pixels: mean.iter().map(|&v| greys(v)).collect(),
        }
    }

    /// Relevance summed over channels, colored with `norm`.
    pub fn heatmap(heatmap: ArrayView3<'_, f32>, norm: &CenteredNorm) -> Self {
        let (_, height, width) = heatmap.dim();
        let summed = heatmap.sum_axis(Axis(0));
        Self {
            height,
            width,
            pixels: summed.iter().map(|&v| norm.color(v)).collect(),
        }
    }
}

/// One panel with an optional caption below the row label.
#[derive(Debug, Clone)]
pub(crate) struct Panel {
    pub raster: Raster,
    pub caption: Option<String>,
}

impl Panel {
    pub fn new(raster: Raster) -> Self {
        Self {
            raster,
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// A labelled row of panels.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub label: String,
    pub panels: Vec<Panel>,
}

impl Row {
    pub fn new(label: impl Into<String>, panels: Vec<Panel>) -> Self {
        Self {
            label: label.into(),
            panels,
        }
    }
}

fn draw_raster<DB: DrawingBackend>(area: &DrawingArea<DB, plotters::coord::Shift>, raster: &Raster) -> Result<()> {
    let (pw, ph) = area.dim_in_pixel();
    if raster.width == 0 || raster.height == 0 {
        return Ok(());
    }
    let cell = (pw as usize / raster.width).min(ph as usize / raster.height).max(1) as i32;
    let x_off = (pw as i32 - cell * raster.width as i32).max(0) / 2;
    let y_off = (ph as i32 - cell * raster.height as i32).max(0) / 2;
    for (i, color) in raster.pixels.iter().enumerate() {
        let (r, c) = ((i / raster.width) as i32, (i % raster.width) as i32);
        let x0 = x_off + c * cell;
        let y0 = y_off + r * cell;
        area.draw(&Rectangle::new([(x0, y0), (x0 + cell, y0 + cell)], color.filled()))
            .map_err(PlotError::drawing)?;
    }
    Ok(())
}

/// Render `rows` as a grid, one panel per cell, into `path`.
pub(crate) fn draw_grid(rows: &[Row], path: &Path, style: &PlotStyle) -> Result<PathBuf> {
    let n_cols = rows.iter().map(|r| r.panels.len()).max().unwrap_or(0);
    if rows.is_empty() || n_cols == 0 {
        return Err(PlotError::NotEnoughExamples(format!(
            "nothing to draw in {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let size = style.panel_size;
    let dims = (size * n_cols as u32, size * rows.len() as u32);
    let root = BitMapBackend::new(path, dims).into_drawing_area();
    root.fill(&WHITE).map_err(PlotError::drawing)?;

    let cells = root.split_evenly((rows.len(), n_cols));
    for (r, row) in rows.iter().enumerate() {
        for (c, panel) in row.panels.iter().enumerate() {
            let area = &cells[r * n_cols + c];
            let caption = match (c, &panel.caption) {
                (0, Some(caption)) => Some(format!("{}: {caption}", row.label)),
                (0, None) => Some(row.label.clone()),
                (_, caption) => caption.clone(),
            };
            match caption {
                Some(text) if style.captions => {
                    let titled = area
                        .titled(&text, ("sans-serif", f64::from(size / 10).max(8.0)))
                        .map_err(PlotError::drawing)?;
                    draw_raster(&titled, &panel.raster)?;
                }
                _ => draw_raster(area, &panel.raster)?,
            }
        }
    }

    root.present().map_err(PlotError::drawing)?;
    info!(path = %path.display(), rows = rows.len(), cols = n_cols, "Saved plot");
    Ok(path.to_path_buf())
}

/// `k` distinct indices out of `0..n`, sorted, chosen with `seed`.
#[must_use]
pub fn random_idxs(n: usize, k: usize, seed: Seed) -> Vec<usize> {
    let mut rng = seed.to_rng();
    let mut idxs = sample(&mut rng, n, k.min(n)).into_vec();
    idxs.sort_unstable();
    idxs
}

/// Zero every value outside the flat pixel indices `keep`.
pub(crate) fn mask_pixels(image: ArrayView3<'_, f32>, keep: &[usize]) -> Array3<f32> {
    let mut masked = Array3::zeros(image.raw_dim());
    let n = image.len();
    let src = image.as_standard_layout();
    if let (Some(dst), Some(src)) = (masked.as_slice_mut(), src.as_slice()) {
        for &i in keep.iter().filter(|&&i| i < n) {
            dst[i] = src[i];
        }
    }
    masked
}

pub(crate) fn check_same_shape(what: &str, a: &[usize], b: &[usize]) -> Result<()> {
    if a != b {
        return Err(PlotError::Shape(format!("{what}: {a:?} != {b:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_idxs() {
        let a = random_idxs(100, 6, Seed::new(0));
        assert_eq!(a, random_idxs(100, 6, Seed::new(0)));
        assert_eq!(a.len(), 6);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(random_idxs(3, 6, Seed::new(0)), vec![0, 1, 2]);
    }

    #[test]
    fn test_mask_pixels() {
        let image = Array3::from_shape_fn((1, 2, 2), |(_, h, w)| (h * 2 + w + 1) as f32);
        let masked = mask_pixels(image.view(), &[1, 3, 99]);
        assert_eq!(masked.iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0, 0.0, 4.0]);
    }

    #[test]
    fn test_draw_grid_without_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.png");
        let image = Array3::<f32>::ones((1, 4, 4));
        let rows = vec![Row::new("images", vec![Panel::new(Raster::image(image.view())); 3])];
        let style = PlotStyle::default().without_captions().with_panel_size(16);
        assert_eq!(draw_grid(&rows, &path, &style).unwrap(), path);
        assert!(path.exists());

        assert!(matches!(
            draw_grid(&[], &path, &style),
            Err(PlotError::NotEnoughExamples(_))
        ));
    }
}
