//! Class-balanced sampling.

use std::collections::BTreeMap;

use advbnn_core::Seed;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::dataset::ImageDataset;
use crate::error::Result;

/// Draw a class-balanced subset of `subset_size` images.
///
/// Each class contributes `subset_size / n_classes` images; the remainder
/// goes one extra image each to the first classes. A class with too few
/// images contributes all of them. Within a class the images are drawn
/// uniformly with the given seed; the returned indices are sorted.
///
/// # Errors
///
/// Returns an error if subsetting fails.
pub fn balanced_subset(
    dataset: &ImageDataset,
    n_classes: usize,
    subset_size: usize,
    seed: Seed,
) -> Result<(ImageDataset, Vec<usize>)> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, class) in dataset.classes().into_iter().enumerate() {
        by_class.entry(class).or_default().push(i);
    }

    let per_class = subset_size / n_classes.max(1);
    let remainder = subset_size % n_classes.max(1);
    let mut rng = seed.to_rng();
    let mut chosen = Vec::with_capacity(subset_size);

    for class in 0..n_classes {
        let quota = per_class + usize::from(class < remainder);
        let Some(indices) = by_class.get_mut(&class) else {
            continue;
        };
        indices.shuffle(&mut rng);
        chosen.extend(indices.iter().take(quota).copied());
    }
    chosen.sort_unstable();

    debug!(requested = subset_size, chosen = chosen.len(), "Balanced subset");
    Ok((dataset.subset(&chosen)?, chosen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn dataset(classes: &[usize], n_classes: usize) -> ImageDataset {
        let images = Array4::<f32>::zeros((classes.len(), 1, 2, 2));
        ImageDataset::from_classes(images, classes, n_classes).unwrap()
    }

    fn counts(ds: &ImageDataset, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; n_classes];
        for c in ds.classes() {
            counts[c] += 1;
        }
        counts
    }

    #[test]
    fn test_equal_counts_per_class() {
        let classes: Vec<usize> = (0..100).map(|i| i % 5).collect();
        let (subset, idxs) = balanced_subset(&dataset(&classes, 5), 5, 20, Seed::new(1)).unwrap();
        assert_eq!(subset.len(), 20);
        assert_eq!(idxs.len(), 20);
        assert_eq!(counts(&subset, 5), vec![4; 5]);
        assert!(idxs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_remainder_and_short_classes() {
        // class 2 only has a single image
        let mut classes: Vec<usize> = (0..40).map(|i| i % 2).collect();
        classes.push(2);
        let (subset, _) = balanced_subset(&dataset(&classes, 3), 3, 11, Seed::new(0)).unwrap();
        assert_eq!(counts(&subset, 3), vec![4, 4, 1]);
    }

    #[test]
    fn test_seeded() {
        let classes: Vec<usize> = (0..50).map(|i| i % 2).collect();
        let ds = dataset(&classes, 2);
        let (_, a) = balanced_subset(&ds, 2, 6, Seed::new(9)).unwrap();
        let (_, b) = balanced_subset(&ds, 2, 6, Seed::new(9)).unwrap();
        assert_eq!(a, b);
    }
}
