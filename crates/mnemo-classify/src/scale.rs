//! Zero-mean, unit-variance feature scaling

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::ClassifyError;

/// Per-column standardization fitted on one dataset and applied to others.
///
/// Uses the population standard deviation; constant columns keep scale 1 so
/// they map to zero instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self, ClassifyError> {
        if x.nrows() == 0 {
            return Err(ClassifyError::insufficient("cannot scale an empty matrix"));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::insufficient(
                "feature matrix contains missing or non-finite values",
            ));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ClassifyError::insufficient("cannot scale an empty matrix"))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    #[must_use]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    #[must_use]
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ClassifyError> {
        if x.ncols() != self.mean.len() {
            return Err(ClassifyError::insufficient(format!(
                "scaler fitted on {} columns, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        Ok((&x - &self.mean) / &self.scale)
    }

    /// Fits on `x` and returns the scaler together with the scaled `x`.
    pub fn fit_transform(x: ArrayView2<'_, f64>) -> Result<(Self, Array2<f64>), ClassifyError> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_scaled_columns_are_standard() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0], [6.0, 10.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(x.view()).unwrap();
        assert_eq!(scaler.mean()[0], 3.0);
        let col = scaled.column(0);
        assert!(col.mean().unwrap().abs() < 1e-12);
        assert!((col.std(0.0) - 1.0).abs() < 1e-12);
        // constant column
        assert_eq!(scaler.scale()[1], 1.0);
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_train_statistics_applied_to_test() {
        let train = array![[0.0], [2.0]];
        let test = array![[4.0]];
        let scaler = StandardScaler::fit(train.view()).unwrap();
        assert_eq!(scaler.transform(test.view()).unwrap()[[0, 0]], 3.0);
    }

    #[test]
    fn test_rejects_missing_values() {
        let x = array![[1.0], [f64::NAN]];
        assert!(StandardScaler::fit(x.view()).is_err());
    }
}
