//! Train/test classification of memory outcome with resampling and final refit
//!
//! A [`ClassificationHarness`] runs one request through fixed stages:
//!
//! 1. **Split**: stratified train/test partition ([`stratified_split`])
//! 2. **Scale**: standardize with training-partition statistics only
//! 3. **Fit**: one regularization value fits directly; a grid is searched by
//!    stratified k-fold validation AUC on the training partition, then the best
//!    value is refit on the whole training partition
//! 4. **Score**: class-1 probabilities and ROC AUC on the test partition
//! 5. **Resample** (optional): bootstrap the test rows or permute the test
//!    labels, iteration `i` seeded with `i`
//! 6. **Final fit**: rescale and refit on all trials for coefficient
//!    inspection; its performance is never reported
//!
//! Every random draw comes from a seeded [`Pcg64`], so identical inputs and
//! configuration always give identical reports.

use std::{fmt, str::FromStr};

use mnemo_data::{
    error::ConfigError,
    matrix::{FeatureMatrix, TrialKey},
    predictor::PredictorId,
};
use mnemo_stats::roc::roc_auc;
use ndarray::{ArrayView2, Axis};
use rand::{Rng as _, SeedableRng as _, seq::SliceRandom as _};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::{
    cv::{CvResult, grid_search},
    error::ClassifyError,
    logistic::{ClassifierMethod, ProbabilisticClassifier},
    scale::StandardScaler,
    split::stratified_split,
    summary::ResampleSummary,
};

/// Regularization values searched when no grid is given.
pub const DEFAULT_C_GRID: [f64; 4] = [0.01, 0.1, 1.0, 10.0];

/// Classification request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub method: ClassifierMethod,
    /// Inverse regularization strengths; more than one value triggers a search.
    pub c_grid: Vec<f64>,
    /// Number of cross-validation folds for the search.
    pub cv: usize,
    pub test_size: f64,
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            method: ClassifierMethod::Logistic,
            c_grid: DEFAULT_C_GRID.to_vec(),
            cv: 5,
            test_size: 0.3,
            seed: 42,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.c_grid.is_empty() || self.c_grid.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(ConfigError::InvalidRegularizationGrid);
        }
        if self.c_grid.len() > 1 && self.cv < 2 {
            return Err(ConfigError::InvalidFoldCount { folds: self.cv });
        }
        if self.test_size.is_nan() || self.test_size <= 0.0 || self.test_size >= 1.0 {
            return Err(ConfigError::InvalidTestSize {
                value: self.test_size,
            });
        }
        Ok(())
    }
}

/// How test-set AUCs are resampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMethod {
    /// Draw test rows (features and labels together) with replacement.
    Bootstrap,
    /// Shuffle test labels, keeping features fixed.
    Permute,
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResampleMethod::Bootstrap => "bootstrap",
            ResampleMethod::Permute => "permute",
        })
    }
}

impl FromStr for ResampleMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap" => Ok(ResampleMethod::Bootstrap),
            "permute" => Ok(ResampleMethod::Permute),
            _ => Err(ConfigError::UnknownResampleMethod { name: s.to_owned() }),
        }
    }
}

/// Resampling requested on top of the headline AUC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResamplePolicy {
    pub method: ResampleMethod,
    pub count: usize,
}

/// AUCs of `count` resamples of the scored test set; `NaN` for single-class draws.
///
/// # Examples
///
/// ```
/// use mnemo_classify::harness::{ResampleMethod, ResamplePolicy, resample_auc};
///
/// let labels = [0, 0, 1, 1];
/// let scores = [0.1, 0.2, 0.8, 0.9];
/// let policy = ResamplePolicy { method: ResampleMethod::Permute, count: 50 };
/// let null = resample_auc(&labels, &scores, policy);
/// assert_eq!(null.len(), 50);
/// assert_eq!(null, resample_auc(&labels, &scores, policy));
/// ```
#[must_use]
pub fn resample_auc(labels: &[u8], scores: &[f64], policy: ResamplePolicy) -> Vec<f64> {
    let n = labels.len();
    (0..policy.count)
        .map(|i| {
            let mut rng = Pcg64::seed_from_u64(i as u64);
            let auc = match policy.method {
                ResampleMethod::Bootstrap => {
                    let rows = (0..n).map(|_| rng.random_range(0..n)).collect::<Vec<_>>();
                    let labels = rows.iter().map(|&r| labels[r]).collect::<Vec<_>>();
                    let scores = rows.iter().map(|&r| scores[r]).collect::<Vec<_>>();
                    roc_auc(&labels, &scores)
                }
                ResampleMethod::Permute => {
                    let mut labels = labels.to_vec();
                    labels.shuffle(&mut rng);
                    roc_auc(&labels, scores)
                }
            };
            auc.unwrap_or(f64::NAN)
        })
        .collect()
}

/// Resampled AUCs and their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledAuc {
    pub method: ResampleMethod,
    pub aucs: Vec<f64>,
    pub summary: Option<ResampleSummary>,
}

/// Model refit on all trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalModel {
    /// Regularization actually used.
    pub c: f64,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Search results on all trials, when a grid was searched.
    pub cv_results: Option<Vec<CvResult>>,
}

/// Outcome of one classification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub method: ClassifierMethod,
    pub seed: u64,
    pub predictors: Vec<PredictorId>,
    /// Regularization chosen on the training partition.
    pub c: f64,
    /// Headline test-set ROC AUC.
    pub roc_auc: f64,
    pub test_trials: Vec<TrialKey>,
    pub test_labels: Vec<u8>,
    /// Class-1 probability of every test trial.
    pub probabilities: Vec<f64>,
    /// Search results on the training partition, when a grid was searched.
    pub cv_results: Option<Vec<CvResult>>,
    pub resampled: Option<ResampledAuc>,
    pub final_model: FinalModel,
}

/// Runs classification requests with a fixed configuration.
#[derive(Debug, Clone)]
pub struct ClassificationHarness {
    config: HarnessConfig,
}

struct Fit {
    model: Box<dyn ProbabilisticClassifier + Send>,
    c: f64,
    cv_results: Option<Vec<CvResult>>,
}

impl ClassificationHarness {
    pub fn new(config: HarnessConfig) -> Result<Self, ClassifyError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Classifies the matrix's trials; `resample` adds resampled test AUCs.
    ///
    /// Matrices with missing values are rejected rather than imputed.
    pub fn classify(
        &self,
        matrix: &FeatureMatrix,
        resample: Option<ResamplePolicy>,
    ) -> Result<ClassificationReport, ClassifyError> {
        matrix.ensure_complete()?;
        let labels = matrix.labels();
        let split = stratified_split(labels, self.config.test_size, self.config.seed)?;

        let x_train = matrix.values().select(Axis(0), &split.train);
        let x_test = matrix.values().select(Axis(0), &split.test);
        let y_train = split.train.iter().map(|&i| labels[i]).collect::<Vec<_>>();
        let y_test = split.test.iter().map(|&i| labels[i]).collect::<Vec<_>>();

        let (scaler, x_train) = StandardScaler::fit_transform(x_train.view())?;
        let x_test = scaler.transform(x_test.view())?;

        let fit = self.fit(x_train.view(), &y_train)?;
        let probabilities = fit.model.predict_proba(x_test.view())?.to_vec();
        let roc_auc = roc_auc(&y_test, &probabilities)
            .ok_or_else(|| ClassifyError::insufficient("test partition is not scorable"))?;

        let resampled = resample.filter(|p| p.count > 0).map(|policy| {
            let aucs = resample_auc(&y_test, &probabilities, policy);
            let summary = ResampleSummary::new(roc_auc, &aucs);
            ResampledAuc {
                method: policy.method,
                aucs,
                summary,
            }
        });

        let final_model = self.final_fit(matrix)?;
        tracing::debug!(
            seed = self.config.seed,
            c = fit.c,
            roc_auc,
            final_c = final_model.c,
            "classified"
        );

        Ok(ClassificationReport {
            method: self.config.method,
            seed: self.config.seed,
            predictors: matrix.predictors().to_vec(),
            c: fit.c,
            roc_auc,
            test_trials: split.test.iter().map(|&i| matrix.trials()[i].clone()).collect(),
            test_labels: y_test,
            probabilities,
            cv_results: fit.cv_results,
            resampled,
            final_model,
        })
    }

    /// Rescales and refits on all trials of the matrix.
    pub fn final_fit(&self, matrix: &FeatureMatrix) -> Result<FinalModel, ClassifyError> {
        matrix.ensure_complete()?;
        let (_, x) = StandardScaler::fit_transform(matrix.values().view())?;
        let fit = self.fit(x.view(), matrix.labels())?;
        let coefficients = fit
            .model
            .coefficients()
            .ok_or_else(|| ClassifyError::fit_failure("final model has no coefficients"))?
            .to_vec();
        let intercept = fit
            .model
            .intercept()
            .ok_or_else(|| ClassifyError::fit_failure("final model has no intercept"))?;
        Ok(FinalModel {
            c: fit.model.regularization(),
            coefficients,
            intercept,
            cv_results: fit.cv_results,
        })
    }

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<Fit, ClassifyError> {
        let HarnessConfig {
            method, c_grid, cv, ..
        } = &self.config;
        let (c, cv_results) = match c_grid.as_slice() {
            [c] => (*c, None),
            grid => {
                let (best, results) = grid_search(*method, x, y, grid, *cv)?;
                (best, Some(results))
            }
        };
        let mut model = method.build(c);
        model.fit(x, y)?;
        Ok(Fit {
            model,
            c,
            cv_results,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use mnemo_data::{
        error::DataShapeError,
        matrix::FeatureMatrixBuilder,
        predictor::PredictorSet,
        source::read_table_from,
        store::FeatureStore,
        table::{TableKind, TableSet},
        view::{SubjectView, ViewConfig},
    };
    use ndarray::Array2;
    use rand::Rng as _;
    use rand_distr::{Distribution as _, Normal};

    use super::*;

    /// Trials alternating between outcomes; `signal` shifts the first predictor
    /// by the outcome.
    pub(crate) fn synthetic_matrix(
        subject: &str,
        n_trials: u32,
        n_predictors: usize,
        signal: f64,
        seed: u64,
    ) -> FeatureMatrix {
        let mut rng = Pcg64::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let labels = (0..n_trials).map(|t| u8::from(t % 2 == 1)).collect::<Vec<_>>();
        let values = Array2::from_shape_fn((labels.len(), n_predictors), |(row, col)| {
            let shift = if col == 0 { signal * f64::from(labels[row]) } else { 0.0 };
            shift + noise.sample(&mut rng)
        });
        FeatureMatrix::new(
            (0..n_predictors)
                .map(|i| PredictorId::new(format!("m{i}"), "T").unwrap())
                .collect(),
            (0..n_trials)
                .map(|trial| TrialKey {
                    subject: subject.to_owned(),
                    trial,
                })
                .collect(),
            values,
            labels,
        )
        .unwrap()
    }

    fn harness() -> ClassificationHarness {
        ClassificationHarness::new(HarnessConfig::default()).unwrap()
    }

    #[test]
    fn test_twenty_trial_end_to_end() {
        let channel = "subject,channel,region,lobe,thetabump\nS,cT,T,T,1\nS,cF,F,F,1\n";
        let mut trial_channel = String::from("subject,trial,channel,region,lobe,hfa,encoding\n");
        let mut rng = Pcg64::seed_from_u64(1);
        for trial in 0..20 {
            let y = trial % 2;
            for (channel, region) in [("cT", "T"), ("cF", "F")] {
                let hfa = f64::from(y) + rng.random::<f64>();
                trial_channel.push_str(&format!("S,{trial},{channel},{region},{region},{hfa},{y}\n"));
            }
        }
        let pair = "subject,channelA,regionA,lobeA,channelB,regionB,lobeB,encodingepisodes_cf\n";
        let trial_pair = "subject,trial,channelA,regionA,lobeA,channelB,regionB,lobeB,\
                          normtspacAB_cf,normtspacBA_cf\n";
        let store = FeatureStore::from_tables(
            TableSet::new(
                read_table_from(TableKind::Channel, channel.as_bytes()).unwrap(),
                read_table_from(TableKind::TrialChannel, trial_channel.as_bytes()).unwrap(),
                read_table_from(TableKind::Pair, pair.as_bytes()).unwrap(),
                read_table_from(TableKind::TrialPair, trial_pair.as_bytes()).unwrap(),
            )
            .unwrap(),
        );
        let view = SubjectView::new(&store, ViewConfig::default()).unwrap();
        let predictors: PredictorSet = "hfa@T,hfa@F".parse().unwrap();
        let matrix = FeatureMatrixBuilder::new().build(&view, &predictors).unwrap();
        assert_eq!(matrix.values().dim(), (20, 2));

        let report = harness().classify(&matrix, None).unwrap();
        assert_eq!(report.test_labels.len(), 6);
        assert_eq!(report.test_labels.iter().filter(|&&l| l == 1).count(), 3);
        assert_eq!(report.probabilities.len(), 6);
        assert_eq!(report.final_model.coefficients.len(), 2);
        assert!(DEFAULT_C_GRID.contains(&report.c));
        assert_eq!(report.cv_results.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn test_same_seed_same_report() {
        let matrix = synthetic_matrix("S", 40, 3, 1.0, 9);
        let policy = ResamplePolicy {
            method: ResampleMethod::Bootstrap,
            count: 20,
        };
        let a = harness().classify(&matrix, Some(policy)).unwrap();
        let b = harness().classify(&matrix, Some(policy)).unwrap();
        assert_eq!(a.roc_auc, b.roc_auc);
        assert_eq!(a, b);

        let other = ClassificationHarness::new(HarnessConfig {
            seed: 7,
            ..HarnessConfig::default()
        })
        .unwrap()
        .classify(&matrix, None)
        .unwrap();
        assert_ne!(a.test_trials, other.test_trials);
    }

    #[test]
    fn test_permutation_null_centered() {
        let matrix = synthetic_matrix("S", 60, 2, 0.0, 3);
        let report = harness()
            .classify(
                &matrix,
                Some(ResamplePolicy {
                    method: ResampleMethod::Permute,
                    count: 400,
                }),
            )
            .unwrap();
        let summary = report.resampled.unwrap().summary.unwrap();
        assert!((summary.median - 0.5).abs() < 0.1, "{}", summary.median);
        assert!(summary.ci_low < 0.5 && summary.ci_high > 0.5);
    }

    #[test]
    fn test_signal_is_detected() {
        let matrix = synthetic_matrix("S", 80, 2, 3.0, 4);
        let report = harness().classify(&matrix, None).unwrap();
        assert!(report.roc_auc > 0.8, "{}", report.roc_auc);
        assert!(report.final_model.coefficients[0] > report.final_model.coefficients[1].abs());
    }

    #[test]
    fn test_single_value_skips_search() {
        let harness = ClassificationHarness::new(HarnessConfig {
            c_grid: vec![0.5],
            ..HarnessConfig::default()
        })
        .unwrap();
        let report = harness
            .classify(&synthetic_matrix("S", 20, 2, 1.0, 2), None)
            .unwrap();
        assert_eq!(report.c, 0.5);
        assert_eq!(report.final_model.c, 0.5);
        assert!(report.cv_results.is_none());
        assert!(report.final_model.cv_results.is_none());
    }

    #[test]
    fn test_incomplete_matrix_rejected() {
        let matrix = synthetic_matrix("S", 20, 2, 1.0, 2);
        let mut values = matrix.values().clone();
        values[[3, 1]] = f64::NAN;
        let matrix = FeatureMatrix::new(
            matrix.predictors().to_vec(),
            matrix.trials().to_vec(),
            values,
            matrix.labels().to_vec(),
        )
        .unwrap();
        assert!(matches!(
            harness().classify(&matrix, None),
            Err(ClassifyError::DataShape(DataShapeError::MissingCombination { trial: 3, .. }))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        for config in [
            HarnessConfig {
                c_grid: vec![],
                ..HarnessConfig::default()
            },
            HarnessConfig {
                cv: 1,
                ..HarnessConfig::default()
            },
            HarnessConfig {
                test_size: 0.0,
                ..HarnessConfig::default()
            },
        ] {
            assert!(matches!(
                ClassificationHarness::new(config),
                Err(ClassifyError::Config(_))
            ));
        }
        assert!("jackknife".parse::<ResampleMethod>().is_err());
    }

    #[test]
    fn test_single_class_bootstrap_is_nan() {
        // two test rows: some draws repeat one row
        let aucs = resample_auc(
            &[0, 1],
            &[0.2, 0.7],
            ResamplePolicy {
                method: ResampleMethod::Bootstrap,
                count: 32,
            },
        );
        assert!(aucs.iter().any(|a| a.is_nan()));
        assert!(aucs.iter().filter(|a| !a.is_nan()).all(|&a| a == 1.0));
    }
}
