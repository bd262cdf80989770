//! Classification and evaluation of memory outcome from trial feature matrices.
//!
//! This crate takes the [`FeatureMatrix`](mnemo_data::matrix::FeatureMatrix)
//! produced by `mnemo-data` and estimates how well the predictors separate
//! remembered from forgotten trials.
//!
//! # How Classification Works
//!
//! 1. **Split** - Stratified train/test partition of the trials ([`split`])
//! 2. **Scale** - Standardize with training statistics only ([`scale`])
//! 3. **Fit** - Class-balanced L2 logistic regression ([`logistic`]), with the
//!    regularization strength chosen by stratified k-fold AUC ([`cv`])
//! 4. **Score** - ROC AUC of the test-set probabilities
//! 5. **Resample** - Bootstrap or permutation distributions of the test AUC,
//!    summarized by [`summary::ResampleSummary`]
//! 6. **Final fit** - Refit on all trials for coefficient inspection
//!
//! Steps 1-6 form one request of the [`harness::ClassificationHarness`].
//!
//! # Architecture
//!
//! ```text
//! FeatureMatrix (mnemo-data)
//!     ↓ classified by
//! ClassificationHarness (many seeds)
//!     ↓ produces
//! AucGrid (subjects × seeds)
//!     ↓ ranked by
//! ForwardSelector (one cached cell per round × candidate)
//! ```
//!
//! [`selection::ForwardSelector`] grows a predictor set greedily. Scoring goes
//! through the [`selection::CandidateScorer`] trait and every cell through
//! the [`selection::RoundStore`] trait, so runs resume from cached cells.
//!
//! # Determinism
//!
//! Every random draw (split shuffles, bootstrap draws, label permutations)
//! comes from a seeded `Pcg64`, so identical matrices and configurations give
//! identical reports.
//!
//! # Example
//!
//! ```
//! use mnemo_classify::harness::{
//!     ClassificationHarness, HarnessConfig, ResampleMethod, ResamplePolicy,
//! };
//! use mnemo_data::{
//!     matrix::{FeatureMatrix, TrialKey},
//!     predictor::PredictorId,
//! };
//! use ndarray::Array2;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let labels = (0..40).map(|t| u8::from(t % 2 == 1)).collect::<Vec<_>>();
//! let values = Array2::from_shape_fn((40, 1), |(row, _)| {
//!     f64::from(labels[row]) + f64::from(u8::try_from(row % 7).unwrap()) / 7.0
//! });
//! let matrix = FeatureMatrix::new(
//!     vec![PredictorId::new("earlyhfa", "T")?],
//!     (0..40).map(|trial| TrialKey { subject: "R1".into(), trial }).collect(),
//!     values,
//!     labels,
//! )?;
//!
//! let harness = ClassificationHarness::new(HarnessConfig::default())?;
//! let report = harness.classify(
//!     &matrix,
//!     Some(ResamplePolicy { method: ResampleMethod::Permute, count: 100 }),
//! )?;
//! assert_eq!(report.test_labels.len(), 12);
//! assert!(report.roc_auc > 0.5);
//! assert_eq!(report.resampled.map(|r| r.aucs.len()), Some(100));
//! # Ok(())
//! # }
//! ```

pub mod cv;
pub mod error;
pub mod harness;
pub mod logistic;
pub mod scale;
pub mod selection;
pub mod split;
pub mod summary;
