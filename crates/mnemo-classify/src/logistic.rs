//! Class-balanced L2-regularized logistic regression
//!
//! The model minimizes
//!
//! ```text
//! Σᵢ wᵢ · logloss(yᵢ, σ(xᵢ·β + β₀)) + ‖β‖² / (2C)
//! ```
//!
//! where `wᵢ = n / (2 · n_class(yᵢ))` balances the two outcome classes and the
//! intercept `β₀` is not penalized. The fit runs Newton iterations with step
//! halving on the penalized objective.

use std::{fmt, str::FromStr};

use mnemo_data::error::ConfigError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;

/// A binary classifier producing class-1 probabilities.
pub trait ProbabilisticClassifier {
    /// Fits the model on rows of `x` labeled `0`/`1` by `y`.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<(), ClassifyError>;

    /// Class-1 probability of every row of `x`.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ClassifyError>;

    /// Fitted coefficients, one per column, if the model has been fitted.
    fn coefficients(&self) -> Option<ArrayView1<'_, f64>>;

    fn intercept(&self) -> Option<f64>;

    /// Inverse regularization strength the model was built with.
    fn regularization(&self) -> f64;
}

/// Supported classifier families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassifierMethod {
    #[default]
    Logistic,
}

impl ClassifierMethod {
    /// Builds an unfitted classifier of this family with inverse regularization `c`.
    #[must_use]
    pub fn build(self, c: f64) -> Box<dyn ProbabilisticClassifier + Send> {
        match self {
            ClassifierMethod::Logistic => Box::new(LogisticRegression::new(c)),
        }
    }
}

impl fmt::Display for ClassifierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierMethod::Logistic => f.write_str("logistic"),
        }
    }
}

impl FromStr for ClassifierMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logistic" => Ok(ClassifierMethod::Logistic),
            _ => Err(ConfigError::UnknownClassifier { name: s.to_owned() }),
        }
    }
}

const MAX_ITER: usize = 100;
const TOLERANCE: f64 = 1e-8;
const MAX_HALVINGS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
struct Fitted {
    coefficients: Array1<f64>,
    intercept: f64,
}

/// Logistic regression with balanced class weights and an L2 penalty.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    c: f64,
    fitted: Option<Fitted>,
}

impl LogisticRegression {
    #[must_use]
    pub fn new(c: f64) -> Self {
        Self { c, fitted: None }
    }
}

/// Balanced per-row weights `n / (2 · n_class)`.
fn balanced_weights(y: &[u8]) -> Result<Array1<f64>, ClassifyError> {
    let n_pos = y.iter().filter(|&&l| l == 1).count();
    let n_neg = y.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(ClassifyError::insufficient(
            "training labels contain a single class",
        ));
    }
    #[expect(clippy::cast_precision_loss)]
    let (n, n_pos, n_neg) = (y.len() as f64, n_pos as f64, n_neg as f64);
    Ok(y.iter()
        .map(|&l| if l == 1 { n / (2.0 * n_pos) } else { n / (2.0 * n_neg) })
        .collect())
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(z))` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Design matrix with a trailing column of ones for the intercept.
fn with_intercept(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut design = Array2::ones((x.nrows(), x.ncols() + 1));
    design.slice_mut(s![.., ..x.ncols()]).assign(&x);
    design
}

struct Problem<'a> {
    design: &'a Array2<f64>,
    y: Array1<f64>,
    weights: Array1<f64>,
    lambda: f64,
}

impl Problem<'_> {
    fn n_coef(&self) -> usize {
        self.design.ncols() - 1
    }

    fn objective(&self, theta: &Array1<f64>) -> f64 {
        let z = self.design.dot(theta);
        let loss = z
            .iter()
            .zip(&self.y)
            .zip(&self.weights)
            .map(|((&z, &y), &w)| w * (softplus(z) - y * z))
            .sum::<f64>();
        let beta = theta.slice(s![..self.n_coef()]);
        loss + 0.5 * self.lambda * beta.dot(&beta)
    }

    fn newton_step(&self, theta: &Array1<f64>) -> Result<Array1<f64>, ClassifyError> {
        let n_coef = self.n_coef();
        let p = self.design.dot(theta).mapv(sigmoid);
        let residual = (&p - &self.y) * &self.weights;
        let mut gradient = self.design.t().dot(&residual);
        let curvature = &p.mapv(|p| p * (1.0 - p)) * &self.weights;
        let weighted = self.design * &curvature.view().insert_axis(Axis(1));
        let mut hessian = self.design.t().dot(&weighted);
        for j in 0..n_coef {
            gradient[j] += self.lambda * theta[j];
            hessian[[j, j]] += self.lambda;
        }
        solve(hessian, gradient)
    }
}

/// Solves `a · x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ClassifyError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        let magnitude = a[[pivot, col]].abs();
        if magnitude.is_nan() || magnitude <= 1e-12 {
            return Err(ClassifyError::fit_failure("singular Hessian"));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum::<f64>();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

impl ProbabilisticClassifier for LogisticRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<(), ClassifyError> {
        if x.nrows() != y.len() {
            return Err(ClassifyError::insufficient(format!(
                "{} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(ConfigError::InvalidRegularizationGrid.into());
        }
        let design = with_intercept(x);
        let problem = Problem {
            design: &design,
            y: y.iter().map(|&l| f64::from(l)).collect(),
            weights: balanced_weights(y)?,
            lambda: 1.0 / self.c,
        };

        let mut theta = Array1::zeros(design.ncols());
        let mut objective = problem.objective(&theta);
        let mut converged = false;
        for _ in 0..MAX_ITER {
            let step = problem.newton_step(&theta)?;
            let mut t = 1.0;
            let mut next = &theta - &step;
            let mut next_objective = problem.objective(&next);
            for _ in 0..MAX_HALVINGS {
                if next_objective <= objective {
                    break;
                }
                t *= 0.5;
                next = &theta - &(&step * t);
                next_objective = problem.objective(&next);
            }
            if !next_objective.is_finite() || next.iter().any(|v| !v.is_finite()) {
                return Err(ClassifyError::fit_failure("non-finite coefficients"));
            }
            let change = step.iter().fold(0.0_f64, |m, v| m.max((v * t).abs()));
            theta = next;
            objective = next_objective;
            if change < TOLERANCE {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(ClassifyError::fit_failure(format!(
                "no convergence after {MAX_ITER} Newton iterations"
            )));
        }

        let n_coef = problem.n_coef();
        self.fitted = Some(Fitted {
            coefficients: theta.slice(s![..n_coef]).to_owned(),
            intercept: theta[n_coef],
        });
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ClassifyError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ClassifyError::fit_failure("model has not been fitted"))?;
        if x.ncols() != fitted.coefficients.len() {
            return Err(ClassifyError::insufficient(format!(
                "model fitted on {} columns, got {}",
                fitted.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&fitted.coefficients).mapv(|z| sigmoid(z + fitted.intercept)))
    }

    fn coefficients(&self) -> Option<ArrayView1<'_, f64>> {
        self.fitted.as_ref().map(|f| f.coefficients.view())
    }

    fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }

    fn regularization(&self) -> f64 {
        self.c
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!("logistic".parse::<ClassifierMethod>(), Ok(ClassifierMethod::Logistic));
        assert_eq!(
            "svm".parse::<ClassifierMethod>(),
            Err(ConfigError::UnknownClassifier { name: "svm".into() })
        );
    }

    #[test]
    fn test_solve_small_system() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];
        let x = solve(a, b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_newton_step_weights_rows_by_curvature() {
        let design = array![[-1.0, 1.0], [1.0, 1.0]];
        let problem = Problem {
            design: &design,
            y: array![0.0, 1.0],
            weights: array![1.0, 1.0],
            lambda: 1.0,
        };
        // gradient (-1, 0), Hessian diag(0.5 + 1, 0.5)
        let step = problem.newton_step(&Array1::zeros(2)).unwrap();
        assert!((step[0] + 2.0 / 3.0).abs() < 1e-12);
        assert!(step[1].abs() < 1e-12);
    }

    #[test]
    fn test_separates_shifted_classes() {
        let x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let y = [0, 0, 0, 0, 1, 1, 1, 1];
        let mut model = LogisticRegression::new(1.0);
        model.fit(x.view(), &y).unwrap();
        assert!(model.coefficients().unwrap()[0] > 0.0);
        let p = model.predict_proba(x.view()).unwrap();
        assert!(p[0] < 0.5 && p[7] > 0.5);
        // symmetric data, balanced weights
        assert!(model.intercept().unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_stronger_penalty_shrinks_coefficients() {
        let x = array![[-2.0], [-1.0], [0.3], [-0.2], [1.0], [2.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let coef = |c| {
            let mut model = LogisticRegression::new(c);
            model.fit(x.view(), &y).unwrap();
            model.coefficients().unwrap()[0]
        };
        assert!(coef(0.01).abs() < coef(10.0).abs());
    }

    #[test]
    fn test_balanced_weights_equalize_classes() {
        let w = balanced_weights(&[0, 0, 0, 1]).unwrap();
        assert!((w[0] * 3.0 - w[3]).abs() < 1e-12);
        assert!(balanced_weights(&[1, 1]).is_err());
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = LogisticRegression::new(1.0);
        assert!(model.predict_proba(array![[1.0]].view()).is_err());
        assert!(model.coefficients().is_none());
    }
}
