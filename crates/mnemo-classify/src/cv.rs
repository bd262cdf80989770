//! Stratified k-fold cross-validation over a regularization grid

use mnemo_data::error::ConfigError;
use mnemo_stats::roc::roc_auc;
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{error::ClassifyError, logistic::ClassifierMethod, split::class_indices};

/// Mean and per-fold validation AUC of one regularization value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub c: f64,
    pub mean_auc: f64,
    pub fold_aucs: Vec<f64>,
}

/// Validation folds of a stratified k-fold partition.
///
/// Each class's rows, in row order, are cut into `k` contiguous chunks whose
/// sizes differ by at most one; fold `f` is the union of every class's chunk
/// `f`. Every class must have at least `k` rows.
pub fn stratified_folds(labels: &[u8], k: usize) -> Result<Vec<Vec<usize>>, ClassifyError> {
    if k < 2 {
        return Err(ConfigError::InvalidFoldCount { folds: k }.into());
    }
    let mut folds = vec![vec![]; k];
    for (label, rows) in class_indices(labels) {
        if rows.len() < k {
            return Err(ClassifyError::insufficient(format!(
                "class {label} has {} rows, fewer than {k} folds",
                rows.len()
            )));
        }
        let (base, extra) = (rows.len() / k, rows.len() % k);
        let mut start = 0;
        for (f, fold) in folds.iter_mut().enumerate() {
            let len = base + usize::from(f < extra);
            fold.extend_from_slice(&rows[start..start + len]);
            start += len;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Scores every value of `grid` by stratified k-fold validation AUC.
///
/// Returns the best value (highest mean AUC, first on ties, `NaN` never wins)
/// together with the per-value results in grid order.
pub fn grid_search(
    method: ClassifierMethod,
    x: ArrayView2<'_, f64>,
    y: &[u8],
    grid: &[f64],
    k: usize,
) -> Result<(f64, Vec<CvResult>), ClassifyError> {
    if grid.is_empty() {
        return Err(ConfigError::InvalidRegularizationGrid.into());
    }
    let folds = stratified_folds(y, k)?;
    let mut results = Vec::with_capacity(grid.len());
    for &c in grid {
        let mut fold_aucs = Vec::with_capacity(k);
        for validation in &folds {
            let train = (0..y.len())
                .filter(|i| validation.binary_search(i).is_err())
                .collect::<Vec<_>>();
            let train_y = train.iter().map(|&i| y[i]).collect::<Vec<_>>();
            let valid_y = validation.iter().map(|&i| y[i]).collect::<Vec<_>>();

            let mut model = method.build(c);
            model.fit(x.select(Axis(0), &train).view(), &train_y)?;
            let scores = model.predict_proba(x.select(Axis(0), validation).view())?;
            let auc = scores
                .as_slice()
                .and_then(|s| roc_auc(&valid_y, s))
                .unwrap_or(f64::NAN);
            fold_aucs.push(auc);
        }
        #[expect(clippy::cast_precision_loss)]
        let mean_auc = fold_aucs.iter().sum::<f64>() / fold_aucs.len() as f64;
        tracing::trace!(c, mean_auc, "cross-validated");
        results.push(CvResult {
            c,
            mean_auc,
            fold_aucs,
        });
    }

    let mut best = &results[0];
    for result in &results[1..] {
        if result.mean_auc > best.mean_auc || (best.mean_auc.is_nan() && !result.mean_auc.is_nan())
        {
            best = result;
        }
    }
    Ok((best.c, results))
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::{Rng as _, SeedableRng as _};
    use rand_pcg::Pcg64;

    use super::*;

    #[test]
    fn test_folds_are_stratified_and_disjoint() {
        let labels: Vec<u8> = [vec![0; 11], vec![1; 7]].concat();
        let folds = stratified_folds(&labels, 5).unwrap();
        assert_eq!(folds.len(), 5);
        let mut all = folds.concat();
        all.sort_unstable();
        assert_eq!(all, (0..18).collect::<Vec<_>>());
        for fold in &folds {
            let ones = fold.iter().filter(|&&i| labels[i] == 1).count();
            assert!((1..=2).contains(&ones));
            assert!((2..=3).contains(&(fold.len() - ones)));
        }
    }

    #[test]
    fn test_folds_need_enough_members() {
        let labels: Vec<u8> = [vec![0; 10], vec![1; 4]].concat();
        assert!(matches!(
            stratified_folds(&labels, 5),
            Err(ClassifyError::InsufficientData { .. })
        ));
        assert!(matches!(
            stratified_folds(&labels, 1),
            Err(ClassifyError::Config(ConfigError::InvalidFoldCount { folds: 1 }))
        ));
    }

    #[test]
    fn test_grid_search_reports_every_value() {
        let mut rng = Pcg64::seed_from_u64(5);
        let y: Vec<u8> = [0, 1].repeat(15);
        let x = Array2::from_shape_fn((30, 2), |(i, j)| {
            let signal = if j == 0 { f64::from(y[i]) } else { 0.0 };
            signal + rng.random::<f64>()
        });
        let grid = [0.01, 0.1, 1.0, 10.0];
        let (best, results) =
            grid_search(ClassifierMethod::Logistic, x.view(), &y, &grid, 5).unwrap();
        assert_eq!(results.len(), 4);
        assert!(grid.contains(&best));
        let best_auc = results.iter().find(|r| r.c == best).unwrap().mean_auc;
        assert!(results.iter().all(|r| r.mean_auc <= best_auc));
        assert!(best_auc > 0.7);
    }
}
