//! Image shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of a single image, `(C, H, W)`.
///
/// # Example
///
/// ```rust
/// use advbnn_core::ImageShape;
///
/// let shape = ImageShape::new(3, 32, 32);
/// assert_eq!(shape.n_pixels(), 3 * 32 * 32);
/// assert_eq!(shape.with_batch(8), [8, 3, 32, 32]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    /// Number of channels.
    pub channels: usize,
    /// Height in pixels.
    pub height: usize,
    /// Width in pixels.
    pub width: usize,
}

impl ImageShape {
    /// Create a new image shape.
    #[must_use]
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Build a shape from the trailing three dimensions of `dims`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dims` has fewer than three entries.
    pub fn from_trailing(dims: &[usize]) -> Result<Self> {
        if dims.len() < 3 {
            return Err(CoreError::InvalidShape {
                expected: "at least 3 dimensions (C, H, W)".to_string(),
                got: format!("{dims:?}"),
            });
        }
        let n = dims.len();
        Ok(Self::new(dims[n - 3], dims[n - 2], dims[n - 1]))
    }

    /// Number of values in one image (`C * H * W`).
    #[must_use]
    pub const fn n_pixels(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Dimensions as an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Dimensions of a batch of `n` images.
    #[must_use]
    pub const fn with_batch(&self, n: usize) -> [usize; 4] {
        [n, self.channels, self.height, self.width]
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.channels, self.height, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_trailing() {
        let shape = ImageShape::from_trailing(&[10, 1, 28, 28]).unwrap();
        assert_eq!(shape, ImageShape::new(1, 28, 28));
        assert!(ImageShape::from_trailing(&[28, 28]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ImageShape::new(3, 32, 32).to_string(), "(3, 32, 32)");
    }
}
