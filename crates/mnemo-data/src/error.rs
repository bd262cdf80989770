use std::path::PathBuf;

use crate::{predictor::PredictorId, table::TableKind};

/// Contradictory or unsupported options, detected before any computation starts.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("theta channels cannot be enforced and excluded at the same time")]
    ConflictingThetaFilters,
    #[display("unknown theta detection policy '{name}' (expected pval, percent or bump)")]
    UnknownThetaPolicy { name: String },
    #[display("theta detection policy '{policy}' requires a threshold level")]
    MissingThetaLevel { policy: String },
    #[display("unknown theta band variant '{name}' (expected cf or canon)")]
    UnknownThetaBand { name: String },
    #[display("region filter must name at least one region or lobe")]
    EmptyRegionFilter,
    #[display("invalid predictor '{text}': expected 'measure@label'")]
    InvalidPredictor { text: String },
    #[display("unsupported classifier method '{name}' (expected logistic)")]
    UnknownClassifier { name: String },
    #[display("unknown resampling method '{name}' (expected bootstrap or permute)")]
    UnknownResampleMethod { name: String },
    #[display("test size must lie strictly between 0 and 1, got {value}")]
    InvalidTestSize { value: f64 },
    #[display("regularization grid must contain positive finite values")]
    InvalidRegularizationGrid,
    #[display("cross-validation needs at least 2 folds, got {folds}")]
    InvalidFoldCount { folds: usize },
    #[display("unknown channel grouping '{name}' (expected region or lobe)")]
    UnknownGrouping { name: String },
}

/// Tables or matrices whose shape does not fit the requested computation.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum DataShapeError {
    #[display("{kind} table has no column '{column}'")]
    MissingColumn { kind: TableKind, column: String },
    #[display("{kind} row has {found} values but the table has {expected} columns")]
    ColumnCountMismatch {
        kind: TableKind,
        expected: usize,
        found: usize,
    },
    #[display("row keys do not match the layout of a {kind} table")]
    SiteMismatch { kind: TableKind },
    #[display("expected a {expected} table, found a {found} table")]
    KindMismatch { expected: TableKind, found: TableKind },
    #[display("no measure named '{}' for predictor {predictor}", predictor.measure())]
    UnknownMeasure { predictor: PredictorId },
    #[display("subject {subject} trial {trial} has no data for predictor {predictor}")]
    MissingCombination {
        predictor: PredictorId,
        subject: String,
        trial: u32,
    },
    #[display("subject {subject} trial {trial} has conflicting outcome labels")]
    InconsistentLabel { subject: String, trial: u32 },
    #[display("subject {subject} trial {trial} has outcome {value}, expected 0 or 1")]
    InvalidLabel {
        subject: String,
        trial: u32,
        value: f64,
    },
    #[display("predictor set is empty")]
    EmptyPredictors,
    #[display("view contains no trials")]
    NoTrials,
    #[display("{rows} feature rows but {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[display("{columns} feature columns but {predictors} predictors")]
    PredictorCountMismatch { predictors: usize, columns: usize },
    #[display("{freqs} frequencies but spectra have {bins} frequency bins")]
    FrequencyCountMismatch { freqs: usize, bins: usize },
}

/// Failure to read a raw measurement table.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum LoadError {
    #[display("failed to open {kind} table {}", path.display())]
    Open {
        kind: TableKind,
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("failed to create {kind} table {}", path.display())]
    Create {
        kind: TableKind,
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("failed to parse {kind} table")]
    Csv { kind: TableKind, source: csv::Error },
    #[display("{kind} table is missing key column '{column}'")]
    MissingKeyColumn { kind: TableKind, column: String },
    #[display("{kind} table line {line}: invalid {column} '{value}'")]
    InvalidKey {
        kind: TableKind,
        line: u64,
        column: String,
        value: String,
    },
    #[display("{_0}")]
    Shape(DataShapeError),
}

impl From<DataShapeError> for LoadError {
    fn from(err: DataShapeError) -> Self {
        LoadError::Shape(err)
    }
}

/// Failure to construct a subject view.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ViewError {
    #[display("invalid view configuration: {_0}")]
    Config(ConfigError),
    #[display("{_0}")]
    DataShape(DataShapeError),
}
