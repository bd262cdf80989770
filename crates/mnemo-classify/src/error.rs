use std::{io, path::PathBuf};

use mnemo_data::error::{ConfigError, DataShapeError};

/// Failure of a classification request.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ClassifyError {
    #[display("invalid classifier configuration: {_0}")]
    Config(ConfigError),
    #[display("{_0}")]
    DataShape(DataShapeError),
    #[display("insufficient data: {reason}")]
    #[from(ignore)]
    InsufficientData { reason: String },
    #[display("classifier fit failed: {reason}")]
    #[from(ignore)]
    FitFailure { reason: String },
}

impl ClassifyError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        ClassifyError::InsufficientData {
            reason: reason.into(),
        }
    }

    pub(crate) fn fit_failure(reason: impl Into<String>) -> Self {
        ClassifyError::FitFailure {
            reason: reason.into(),
        }
    }
}

/// Failure of a forward selection run.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum SelectionError {
    #[display("{_0}")]
    Classify(ClassifyError),
    #[display("{_0}")]
    DataShape(DataShapeError),
    #[display("no candidate predictors to select from")]
    #[from(ignore)]
    NoCandidates,
    #[display("score grid of candidate {candidate} has {found} subjects, expected {expected}")]
    #[from(ignore)]
    GridShape {
        candidate: usize,
        expected: usize,
        found: usize,
    },
    #[display("failed to access result cache {}", path.display())]
    #[from(ignore)]
    Cache { path: PathBuf, source: io::Error },
    #[display("malformed result cache {}", path.display())]
    #[from(ignore)]
    CacheFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}
