//! Summaries of resampled AUC distributions

use mnemo_stats::{descriptive::nan_median, percentiles::Percentiles};
use serde::{Deserialize, Serialize};

/// Location, 95% interval and permutation p-value of resampled AUCs.
///
/// `NaN` resamples (single-class draws) are left out; `n` counts the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampleSummary {
    pub observed: f64,
    pub n: usize,
    pub median: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// `(1 + #{resampled ≥ observed}) / (1 + n)`, meaningful for permutation nulls.
    pub p_value: f64,
}

impl ResampleSummary {
    /// Summarizes `resampled` against the `observed` AUC.
    ///
    /// Returns `None` when no resample produced a finite AUC.
    ///
    /// # Examples
    ///
    /// ```
    /// use mnemo_classify::summary::ResampleSummary;
    ///
    /// let null = [0.4, 0.5, 0.7, f64::NAN, 0.9];
    /// let summary = ResampleSummary::new(0.8, &null).unwrap();
    /// assert_eq!(summary.n, 4);
    /// assert_eq!(summary.median, 0.6);
    /// assert_eq!(summary.p_value, 2.0 / 5.0);
    /// ```
    #[must_use]
    pub fn new(observed: f64, resampled: &[f64]) -> Option<Self> {
        let finite = resampled
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect::<Vec<_>>();
        if finite.is_empty() {
            return None;
        }
        let percentiles = Percentiles::new(&finite, &[2.5, 97.5]);
        let exceed = finite.iter().filter(|&&v| v >= observed).count();
        #[expect(clippy::cast_precision_loss)]
        let p_value = (1 + exceed) as f64 / (1 + finite.len()) as f64;
        Some(Self {
            observed,
            n: finite.len(),
            median: nan_median(finite.iter().copied()),
            ci_low: percentiles.get(2.5)?,
            ci_high: percentiles.get(97.5)?,
            p_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_brackets_median() {
        let values = (0..=100).map(|i| f64::from(i) / 100.0).collect::<Vec<_>>();
        let summary = ResampleSummary::new(0.99, &values).unwrap();
        assert!((summary.ci_low - 0.025).abs() < 1e-12);
        assert!((summary.ci_high - 0.975).abs() < 1e-12);
        assert!((summary.median - 0.5).abs() < 1e-12);
        assert!((summary.p_value - 3.0 / 102.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_nan_has_no_summary() {
        assert!(ResampleSummary::new(0.5, &[f64::NAN, f64::NAN]).is_none());
        assert!(ResampleSummary::new(0.5, &[]).is_none());
    }
}
