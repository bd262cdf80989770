use chrono::{DateTime, Utc};
use mnemo_classify::{
    harness::{HarnessConfig, ResamplePolicy},
    summary::ResampleSummary,
};
use mnemo_data::predictor::PredictorId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassificationRun {
    pub created_at: DateTime<Utc>,
    pub policy: String,
    pub predictors: Vec<PredictorId>,
    /// Configuration of the first seed; later seeds differ only in `seed`.
    pub config: HarnessConfig,
    pub nseed: u64,
    pub resample: Option<ResamplePolicy>,
    pub subjects: Vec<SubjectClassification>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubjectClassification {
    pub subject: String,
    pub n_trials: usize,
    /// Test-set AUC per seed.
    pub aucs: Vec<f64>,
    pub median_auc: f64,
    pub mean_auc: f64,
    pub std_auc: f64,
    /// Regularization chosen per seed.
    pub c: Vec<f64>,
    /// Resampled AUCs, seeds × resamples.
    pub resampled: Vec<Vec<f64>>,
    /// Median AUC against all resampled AUCs of the subject.
    pub summary: Option<ResampleSummary>,
}
