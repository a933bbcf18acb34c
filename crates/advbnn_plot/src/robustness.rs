//! Distributions of LRP robustness and its relation to softmax robustness.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::info;

use crate::error::{PlotError, Result};
use crate::grid::PlotStyle;

/// Bins of every robustness histogram.
pub const N_BINS: usize = 20;

const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

fn series_color(i: usize) -> RGBColor {
    PALETTE[i % PALETTE.len()]
}

/// LRP robustness of one model, e.g. a deterministic network or a Bayesian
/// one at a given sample count.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustnessSeries {
    /// Legend label.
    pub label: String,
    /// One LRP robustness score per image.
    pub lrp_robustness: Vec<f32>,
    /// One softmax robustness score per image, for scatterplots.
    pub softmax_robustness: Option<Vec<f32>>,
}

impl RobustnessSeries {
    /// Series with LRP robustness only.
    pub fn new(label: impl Into<String>, lrp_robustness: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            lrp_robustness,
            softmax_robustness: None,
        }
    }

    /// Attach per-image softmax robustness.
    #[must_use]
    pub fn with_softmax_robustness(mut self, softmax_robustness: Vec<f32>) -> Self {
        self.softmax_robustness = Some(softmax_robustness);
        self
    }
}

fn value_range<'a>(values: impl Iterator<Item = &'a f32>) -> (f32, f32) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < 1e-6 {
        return (lo - 0.5, hi + 0.5);
    }
    (lo, hi)
}

/// Counts of `values` in `n_bins` equal bins over `[lo, hi]`.
///
/// Values outside the range and non-finite values are skipped; `hi` falls in
/// the last bin.
#[must_use]
pub fn histogram_counts(values: &[f32], lo: f32, hi: f32, n_bins: usize) -> Vec<usize> {
    let mut counts = vec![0; n_bins];
    if n_bins == 0 || hi <= lo {
        return counts;
    }
    let width = (hi - lo) / n_bins as f32;
    for &v in values.iter().filter(|v| v.is_finite() && **v >= lo && **v <= hi) {
        let bin = (((v - lo) / width) as usize).min(n_bins - 1);
        counts[bin] += 1;
    }
    counts
}

fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// One histogram panel per series, stacked vertically on a shared range.
///
/// # Errors
///
/// Returns [`PlotError::NotEnoughExamples`] without series, or an error if
/// the file cannot be rendered.
pub fn lrp_robustness_distributions(series: &[RobustnessSeries], path: &Path, style: &PlotStyle) -> Result<PathBuf> {
    if series.is_empty() {
        return Err(PlotError::NotEnoughExamples("no robustness series".to_string()));
    }
    prepare(path)?;
    let (lo, hi) = value_range(series.iter().flat_map(|s| s.lrp_robustness.iter()));
    let width = (hi - lo) / N_BINS as f32;

    let panel_height = style.panel_size * 2;
    let root = BitMapBackend::new(path, (style.panel_size * 5, panel_height * series.len() as u32))
        .into_drawing_area();
    root.fill(&WHITE).map_err(PlotError::drawing)?;

    for (i, (s, area)) in series.iter().zip(root.split_evenly((series.len(), 1))).enumerate() {
        let counts = histogram_counts(&s.lrp_robustness, lo, hi, N_BINS);
        let max_count = counts.iter().copied().max().unwrap_or(0).max(1) as f32;
        let color = series_color(i);

        let mut builder = ChartBuilder::on(&area);
        builder.margin(8);
        if style.captions {
            builder
                .caption(&s.label, ("sans-serif", 16.0))
                .set_label_area_size(LabelAreaPosition::Left, 40)
                .set_label_area_size(LabelAreaPosition::Bottom, 30);
        }
        let mut chart = builder
            .build_cartesian_2d(lo..hi, 0.0_f32..max_count * 1.1)
            .map_err(PlotError::drawing)?;
        if style.captions {
            chart
                .configure_mesh()
                .x_desc("LRP robustness")
                .y_desc("count")
                .disable_mesh()
                .draw()
                .map_err(PlotError::drawing)?;
        }
        chart
            .draw_series(counts.iter().enumerate().map(|(b, &count)| {
                let x0 = lo + b as f32 * width;
                Rectangle::new([(x0, 0.0), (x0 + width, count as f32)], color.mix(0.7).filled())
            }))
            .map_err(PlotError::drawing)?;
    }

    root.present().map_err(PlotError::drawing)?;
    info!(path = %path.display(), n_series = series.len(), "Saved robustness distributions");
    Ok(path.to_path_buf())
}

/// Softmax robustness against LRP robustness, one color per series.
///
/// # Errors
///
/// Returns [`PlotError::Shape`] when a series lacks softmax robustness or
/// the two vectors differ in length, [`PlotError::NotEnoughExamples`]
/// without series, or an error if the file cannot be rendered.
pub fn lrp_robustness_scatterplot(series: &[RobustnessSeries], path: &Path, style: &PlotStyle) -> Result<PathBuf> {
    if series.is_empty() {
        return Err(PlotError::NotEnoughExamples("no robustness series".to_string()));
    }
    let mut points = Vec::with_capacity(series.len());
    for s in series {
        let softmax = s.softmax_robustness.as_ref().ok_or_else(|| {
            PlotError::Shape(format!("series {} has no softmax robustness", s.label))
        })?;
        if softmax.len() != s.lrp_robustness.len() {
            return Err(PlotError::Shape(format!(
                "series {}: {} softmax vs {} LRP robustness values",
                s.label,
                softmax.len(),
                s.lrp_robustness.len()
            )));
        }
        points.push(
            softmax
                .iter()
                .zip(&s.lrp_robustness)
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|(&x, &y)| (x, y))
                .collect::<Vec<_>>(),
        );
    }
    prepare(path)?;

    let (x_lo, x_hi) = value_range(points.iter().flatten().map(|(x, _)| x));
    let (y_lo, y_hi) = value_range(points.iter().flatten().map(|(_, y)| y));

    let side = style.panel_size * 5;
    let root = BitMapBackend::new(path, (side, side)).into_drawing_area();
    root.fill(&WHITE).map_err(PlotError::drawing)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(12);
    if style.captions {
        builder
            .caption("Softmax vs LRP robustness", ("sans-serif", 20.0))
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40);
    }
    let mut chart = builder
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(PlotError::drawing)?;
    if style.captions {
        chart
            .configure_mesh()
            .x_desc("softmax robustness")
            .y_desc("LRP robustness")
            .draw()
            .map_err(PlotError::drawing)?;
    }

    for (i, (s, pts)) in series.iter().zip(&points).enumerate() {
        let color = series_color(i);
        let drawn = chart
            .draw_series(pts.iter().map(|&p| Circle::new(p, 3, color.mix(0.6).filled())))
            .map_err(PlotError::drawing)?;
        if style.captions {
            drawn
                .label(s.label.clone())
                .legend(move |(x, y)| Circle::new((x + 5, y), 3, color.filled()));
        }
    }
    if style.captions {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(PlotError::drawing)?;
    }

    root.present().map_err(PlotError::drawing)?;
    info!(path = %path.display(), n_series = series.len(), "Saved robustness scatterplot");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> PlotStyle {
        PlotStyle::default().without_captions().with_panel_size(20)
    }

    #[test]
    fn test_histogram_counts() {
        let counts = histogram_counts(&[0.0, 0.1, 0.5, 1.0, 1.0, 2.0, f32::NAN], 0.0, 1.0, 4);
        assert_eq!(counts, vec![2, 0, 1, 2]);
        assert_eq!(histogram_counts(&[0.5], 1.0, 1.0, 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_value_range_of_constant_values() {
        assert_eq!(value_range([1.0_f32, 1.0].iter()), (0.5, 1.5));
        assert_eq!(value_range(std::iter::empty()), (0.0, 1.0));
    }

    #[test]
    fn test_distributions() {
        let dir = tempfile::tempdir().unwrap();
        let series = vec![
            RobustnessSeries::new("det", vec![0.1, 0.4, 0.4, 0.9]),
            RobustnessSeries::new("bay_samp=10", vec![0.6, 0.8, 1.0]),
        ];
        let path = dir.path().join("robustness/dist.png");
        assert!(lrp_robustness_distributions(&series, &path, &style()).unwrap().exists());
        assert!(lrp_robustness_distributions(&[], &path, &style()).is_err());
    }

    #[test]
    fn test_scatterplot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scatter.png");
        let good = RobustnessSeries::new("det", vec![0.2, 0.5]).with_softmax_robustness(vec![0.9, 0.3]);
        assert!(lrp_robustness_scatterplot(&[good.clone()], &path, &style()).is_ok());

        let missing = RobustnessSeries::new("bay", vec![0.2]);
        assert!(matches!(
            lrp_robustness_scatterplot(&[good.clone(), missing], &path, &style()),
            Err(PlotError::Shape(_))
        ));
        let uneven = RobustnessSeries::new("bay", vec![0.2]).with_softmax_robustness(vec![0.1, 0.2]);
        assert!(matches!(
            lrp_robustness_scatterplot(&[uneven], &path, &style()),
            Err(PlotError::Shape(_))
        ));
    }
}
