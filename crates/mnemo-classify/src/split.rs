//! Stratified train/test partitioning
//!
//! The test partition has `ceil(test_size · n)` rows. Each class receives a share
//! of the test rows proportional to its size, with leftover rows handed to the
//! classes with the largest fractional shares. Within each class, rows are
//! drawn after a seeded shuffle, so a split is fully determined by the labels,
//! the test fraction and the seed.

use std::collections::BTreeMap;

use mnemo_data::error::ConfigError;
use rand::{SeedableRng as _, seq::SliceRandom as _};
use rand_pcg::Pcg64;

use crate::error::ClassifyError;

/// Row indices of the two partitions, each sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Row indices of every class, in row order.
pub(crate) fn class_indices(labels: &[u8]) -> BTreeMap<u8, Vec<usize>> {
    let mut classes = BTreeMap::<u8, Vec<usize>>::new();
    for (idx, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(idx);
    }
    classes
}

/// Splits rows into train and test partitions preserving class proportions.
///
/// # Examples
///
/// ```
/// use mnemo_classify::split::stratified_split;
///
/// let labels: Vec<u8> = [0, 1].repeat(10);
/// let split = stratified_split(&labels, 0.3, 42)?;
/// assert_eq!(split.test.len(), 6);
/// assert_eq!(split.test.iter().filter(|&&i| labels[i] == 1).count(), 3);
/// # Ok::<(), mnemo_classify::error::ClassifyError>(())
/// ```
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn stratified_split(
    labels: &[u8],
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit, ClassifyError> {
    if test_size.is_nan() || test_size <= 0.0 || test_size >= 1.0 {
        return Err(ConfigError::InvalidTestSize { value: test_size }.into());
    }
    let classes = class_indices(labels);
    if classes.len() < 2 {
        return Err(ClassifyError::insufficient(
            "stratification needs both outcome classes",
        ));
    }

    let n = labels.len();
    let n_test = (test_size * n as f64).ceil() as usize;

    // proportional allocation, largest remainder first
    let mut shares = classes
        .iter()
        .map(|(&label, rows)| {
            let exact = n_test as f64 * rows.len() as f64 / n as f64;
            (label, exact.floor() as usize, exact.fract(), rows.len())
        })
        .collect::<Vec<_>>();
    let allocated = shares.iter().map(|s| s.1).sum::<usize>();
    let mut order = (0..shares.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        shares[b]
            .2
            .total_cmp(&shares[a].2)
            .then(shares[b].3.cmp(&shares[a].3))
    });
    for &i in order.iter().cycle().take(n_test.saturating_sub(allocated)) {
        shares[i].1 += 1;
    }

    let mut rng = Pcg64::seed_from_u64(seed);
    let mut train = vec![];
    let mut test = vec![];
    for (label, n_class_test, _, n_class) in shares {
        if n_class_test == 0 || n_class_test >= n_class {
            return Err(ClassifyError::insufficient(format!(
                "class {label} has {n_class} rows, cannot place {n_class_test} in the test partition \
                 and keep one for training"
            )));
        }
        let mut rows = classes[&label].clone();
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..n_class_test]);
        train.extend_from_slice(&rows[n_class_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}
