//! Statistical primitives shared by the data conditioning and classification crates.
//!
//! This crate provides:
//!
//! - **Descriptive statistics**: mean, NaN-skipping median, variance and standard deviation
//! - **Percentiles**: linearly interpolated percentile lookup for resampled score distributions
//! - **ROC analysis**: area under the ROC curve for binary labels and continuous scores
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`percentiles`]: Percentile computation and storage
//! - [`roc`]: Rank-based ROC AUC
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use mnemo_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Aggregating with missing values
//!
//! ```
//! use mnemo_stats::descriptive::nan_median;
//!
//! let values = [4.0, f64::NAN, 1.0, 2.0];
//! assert_eq!(nan_median(values), 2.0);
//! ```
//!
//! ## Scoring a classifier
//!
//! ```
//! use mnemo_stats::roc::roc_auc;
//!
//! let labels = [0, 0, 1, 1];
//! let scores = [0.1, 0.4, 0.35, 0.8];
//! assert_eq!(roc_auc(&labels, &scores), Some(0.75));
//! ```

pub mod descriptive;
pub mod percentiles;
pub mod roc;
