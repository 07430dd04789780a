//! Random train/test split of a fund's training table.

use crate::error::{ModelError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Row indices of a train/test split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    /// Rows used for fitting, ascending
    pub train: Vec<usize>,
    /// Held-out rows, ascending
    pub test: Vec<usize>,
}

/// Number of held-out rows for `n` observations.
///
/// `ceil(n * test_fraction)`, capped so at least one row remains for fitting.
pub fn test_size(n: usize, test_fraction: f64) -> usize {
    let wanted = (n as f64 * test_fraction).ceil() as usize;
    wanted.min(n.saturating_sub(1))
}

/// Shuffle `0..n` and split off the test rows.
///
/// The same `seed` always yields the same split; `None` draws from entropy.
pub fn train_test_split(n: usize, test_fraction: f64, seed: Option<u64>) -> Result<TrainTestSplit> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(ModelError::InvalidParameter(format!(
            "test fraction {} must be in [0, 1)",
            test_fraction
        )));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let mut test = indices.split_off(n - test_size(n, test_fraction));
    let mut train = indices;
    train.sort_unstable();
    test.sort_unstable();

    Ok(TrainTestSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(3, 1)]
    #[case(4, 1)]
    #[case(5, 2)]
    #[case(40, 10)]
    fn test_test_size(#[case] n: usize, #[case] expected: usize) {
        assert_eq!(test_size(n, 0.25), expected);
    }

    #[test]
    fn test_split_partitions_rows() {
        let split = train_test_split(20, 0.25, Some(7)).unwrap();
        assert_eq!(split.train.len(), 15);
        assert_eq!(split.test.len(), 5);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        let a = train_test_split(50, 0.25, Some(42)).unwrap();
        let b = train_test_split(50, 0.25, Some(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_fraction_keeps_all_rows() {
        let split = train_test_split(6, 0.0, None).unwrap();
        assert_eq!(split.train, vec![0, 1, 2, 3, 4, 5]);
        assert!(split.test.is_empty());
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(train_test_split(10, 1.0, Some(1)).is_err());
        assert!(train_test_split(10, -0.1, Some(1)).is_err());
    }
}
