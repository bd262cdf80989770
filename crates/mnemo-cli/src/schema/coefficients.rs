use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mnemo_data::predictor::PredictorId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalCoefficients {
    pub created_at: DateTime<Utc>,
    pub policy: String,
    pub predictors: Vec<PredictorId>,
    /// Most common per-subject regularization, smallest on ties.
    pub c_mode: f64,
    pub subjects: Vec<SubjectCoefficients>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubjectCoefficients {
    pub subject: String,
    /// Regularization chosen by the subject's own final fit.
    pub c_best: f64,
    /// Coefficients refit with `c_mode`, keyed by predictor.
    pub coefficients: BTreeMap<String, f64>,
    pub intercept: f64,
}
