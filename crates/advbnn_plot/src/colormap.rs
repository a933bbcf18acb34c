//! Colormaps for images and relevance heatmaps.

use plotters::style::RGBColor;

/// Stops of a red/blue diverging map, blue for negative relevance.
const RDBU_R: [(u8, u8, u8); 5] = [
    (5, 48, 97),
    (67, 147, 195),
    (247, 247, 247),
    (214, 96, 77),
    (103, 0, 31),
];

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8
}

/// Linear interpolation through evenly spaced stops, `t` in `[0, 1]`.
fn interpolate(stops: &[(u8, u8, u8)], t: f32) -> RGBColor {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
    let last = stops.len() - 1;
    let pos = t * last as f32;
    let i = (pos.floor() as usize).min(last - 1);
    let frac = pos - i as f32;
    let (a, b) = (stops[i], stops[i + 1]);
    RGBColor(lerp(a.0, b.0, frac), lerp(a.1, b.1, frac), lerp(a.2, b.2, frac))
}

/// White for 0, black for 1.
#[must_use]
pub fn greys(v: f32) -> RGBColor {
    let level = lerp(255, 0, v.clamp(0.0, 1.0));
    RGBColor(level, level, level)
}

/// Diverging normalisation with zero mapped to the centre of the colormap.
///
/// Negative and positive values are scaled independently, so a heatmap with
/// mostly positive relevance still shows zero as white.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenteredNorm {
    vmin: f32,
    vmax: f32,
}

impl CenteredNorm {
    /// Norm spanning the values of `values`.
    #[must_use]
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a f32>) -> Self {
        let (vmin, vmax) = values
            .into_iter()
            .fold((0.0_f32, 0.0_f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Self {
            vmin: vmin.min(-1e-6),
            vmax: vmax.max(1e-6),
        }
    }

    /// Position of `v` on the colormap.
    #[must_use]
    pub fn scale(&self, v: f32) -> f32 {
        if v >= 0.0 {
            0.5 + 0.5 * (v / self.vmax)
        } else {
            0.5 - 0.5 * (v / self.vmin)
        }
    }

    /// Color of `v`.
    #[must_use]
    pub fn color(&self, v: f32) -> RGBColor {
        interpolate(&RDBU_R, self.scale(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_the_centre() {
        let norm = CenteredNorm::from_values(&[-2.0, 0.5, 8.0]);
        assert_eq!(norm.scale(0.0), 0.5);
        assert_eq!(norm.scale(8.0), 1.0);
        assert_eq!(norm.scale(-2.0), 0.0);
        assert_eq!(norm.color(0.0), RGBColor(247, 247, 247));
        assert_eq!(norm.color(-2.0), RGBColor(5, 48, 97));
        assert_eq!(norm.color(8.0), RGBColor(103, 0, 31));
    }

    #[test]
    fn test_all_zero_heatmap() {
        let norm = CenteredNorm::from_values(&[0.0, 0.0]);
        assert_eq!(norm.color(0.0), RGBColor(247, 247, 247));
    }

    #[test]
    fn test_greys() {
        assert_eq!(greys(0.0), RGBColor(255, 255, 255));
        assert_eq!(greys(1.0), RGBColor(0, 0, 0));
        assert_eq!(greys(7.0), RGBColor(0, 0, 0));
    }
}
