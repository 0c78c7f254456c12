//! Deterministic train/test partitioning

use crate::error::{LifecycleError, LifecycleResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Minimum rows needed to produce two non-empty partitions
pub const MIN_TRAINING_ROWS: usize = 2;

/// Shuffle with a fixed seed and split off `test_ratio` of the rows.
///
/// The test partition holds `ceil(n * ratio)` rows, clamped so neither
/// partition is empty.
pub fn train_test_split<T: Clone>(items: &[T], test_ratio: f64, seed: u64) -> LifecycleResult<(Vec<T>, Vec<T>)> {
    if items.len() < MIN_TRAINING_ROWS {
        return Err(LifecycleError::InsufficientData {
            rows: items.len(),
            required: MIN_TRAINING_ROWS,
        });
    }
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(LifecycleError::validation(format!(
            "test split ratio must be in (0, 1), got {}",
            test_ratio
        )));
    }

    let n = items.len();
    let n_test = ((n as f64 * test_ratio).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test = indices[..n_test].iter().map(|&i| items[i].clone()).collect();
    let train = indices[n_test..].iter().map(|&i| items[i].clone()).collect();
    Ok((train, test))
}
