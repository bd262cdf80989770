use chrono::{DateTime, Utc};
use mnemo_classify::selection::SelectionResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepForwardRun {
    pub created_at: DateTime<Utc>,
    pub policy: String,
    pub mode: String,
    pub nseed: u64,
    pub selections: Vec<LabeledSelection>,
}

/// Selection of one cache prefix: `pooled`, or a subject in per-subject mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabeledSelection {
    pub label: String,
    pub subjects: Vec<String>,
    /// Candidates dropped up front for missing values.
    pub dropped: Vec<String>,
    pub result: SelectionResult,
}
