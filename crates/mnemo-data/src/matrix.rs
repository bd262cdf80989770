//! Labeled trial × predictor matrices built from subject views
//!
//! [`FeatureMatrixBuilder`] projects a [`SubjectView`] into a [`FeatureMatrix`]:
//! one row per `(subject, trial)`, one column per [`PredictorId`], and one binary
//! outcome label per row.
//!
//! Within-channel predictors read their measure from the trial × channel table
//! and aggregate all channels of the predictor's region (or lobe, see
//! [`Grouping`]); between-channel predictors read the trial × pair table and
//! aggregate all pairs whose dominant PAC direction equals the label. The
//! aggregate is the median over the non-missing values. A combination without
//! any value stays `NaN` in the matrix; use [`FeatureMatrix::ensure_complete`]
//! before handing a matrix to a classifier.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use mnemo_stats::descriptive::nan_median;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, DataShapeError},
    predictor::{PredictorId, PredictorScope, PredictorSet},
    table::{MeasurementTable, Record, Site},
    view::SubjectView,
};

/// Trial × channel column holding the binary memory outcome.
pub const OUTCOME_COLUMN: &str = "encoding";

/// Which channel attribute a one-character label is compared to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Grouping {
    #[default]
    Region,
    Lobe,
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Grouping::Region => "region",
            Grouping::Lobe => "lobe",
        })
    }
}

impl FromStr for Grouping {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region" => Ok(Grouping::Region),
            "lobe" => Ok(Grouping::Lobe),
            _ => Err(ConfigError::UnknownGrouping { name: s.to_owned() }),
        }
    }
}

/// Row identity of a feature matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrialKey {
    pub subject: String,
    pub trial: u32,
}

impl TrialKey {
    fn of(record: &Record) -> Option<Self> {
        Some(Self {
            subject: record.subject.clone(),
            trial: record.trial?,
        })
    }
}

/// Builds [`FeatureMatrix`]es from views.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureMatrixBuilder {
    grouping: Grouping,
}

impl FeatureMatrixBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Builds the matrix of `predictors` over every trial of the view.
    pub fn build(
        &self,
        view: &SubjectView,
        predictors: &PredictorSet,
    ) -> Result<FeatureMatrix, DataShapeError> {
        let predictors = predictors.resolve(view.config().band);
        if predictors.is_empty() {
            return Err(DataShapeError::EmptyPredictors);
        }

        let (trials, labels) = trial_labels(view.trial_channel())?;
        let row_of = trials
            .iter()
            .enumerate()
            .map(|(row, key)| (key, row))
            .collect::<BTreeMap<_, _>>();

        let mut values = Array2::from_elem((trials.len(), predictors.len()), f64::NAN);
        for (col, predictor) in predictors.iter().enumerate() {
            let table = match predictor.scope() {
                PredictorScope::WithinChannel => view.trial_channel(),
                PredictorScope::BetweenChannel => view.trial_pair(),
            };
            let idx = table
                .column_index(predictor.measure())
                .ok_or_else(|| DataShapeError::UnknownMeasure {
                    predictor: predictor.clone(),
                })?;

            let mut groups = BTreeMap::<TrialKey, Vec<f64>>::new();
            for record in table.records() {
                if !self.matches(record, predictor) {
                    continue;
                }
                if let Some(key) = TrialKey::of(record) {
                    groups.entry(key).or_default().push(record.values[idx]);
                }
            }
            for (key, group) in groups {
                if let Some(&row) = row_of.get(&key) {
                    values[[row, col]] = nan_median(group);
                }
            }
        }

        let matrix = FeatureMatrix::new(predictors, trials, values, labels)?;
        tracing::debug!(
            trials = matrix.n_trials(),
            predictors = matrix.n_predictors(),
            missing = matrix.missing().len(),
            "feature matrix built"
        );
        Ok(matrix)
    }

    fn matches(&self, record: &Record, predictor: &PredictorId) -> bool {
        let label = predictor.label();
        match (&record.site, predictor.scope()) {
            (Site::Channel(channel), PredictorScope::WithinChannel) => match self.grouping {
                Grouping::Region => channel.region == label,
                Grouping::Lobe => channel.lobe == label,
            },
            (Site::Pair(_), PredictorScope::BetweenChannel) => {
                record.direction.as_deref() == Some(label)
            }
            _ => false,
        }
    }
}

/// Sorted unique trials of a trial × channel table and one label per trial.
fn trial_labels(table: &MeasurementTable) -> Result<(Vec<TrialKey>, Vec<u8>), DataShapeError> {
    let idx = table.require_column(OUTCOME_COLUMN)?;
    let mut outcomes = BTreeMap::<TrialKey, BTreeSet<u8>>::new();
    for record in table.records() {
        let Some(key) = TrialKey::of(record) else {
            continue;
        };
        let entry = outcomes.entry(key).or_default();
        let value = record.values[idx];
        if value.is_nan() {
            continue;
        }
        let label = match value {
            0.0 => 0,
            1.0 => 1,
            _ => {
                return Err(DataShapeError::InvalidLabel {
                    subject: record.subject.clone(),
                    trial: record.trial.unwrap_or_default(),
                    value,
                });
            }
        };
        entry.insert(label);
    }
    if outcomes.is_empty() {
        return Err(DataShapeError::NoTrials);
    }

    let mut trials = Vec::with_capacity(outcomes.len());
    let mut labels = Vec::with_capacity(outcomes.len());
    for (key, set) in outcomes {
        let mut it = set.into_iter();
        match (it.next(), it.next()) {
            (Some(label), None) => labels.push(label),
            (None, _) => {
                return Err(DataShapeError::InvalidLabel {
                    subject: key.subject,
                    trial: key.trial,
                    value: f64::NAN,
                });
            }
            (Some(_), Some(_)) => {
                return Err(DataShapeError::InconsistentLabel {
                    subject: key.subject,
                    trial: key.trial,
                });
            }
        }
        trials.push(key);
    }
    Ok((trials, labels))
}

/// A labeled trials × predictors matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    predictors: Vec<PredictorId>,
    trials: Vec<TrialKey>,
    #[serde(with = "crate::nan_as_null::array2")]
    values: Array2<f64>,
    labels: Vec<u8>,
}

impl FeatureMatrix {
    /// Assembles a matrix, checking that rows, columns and labels line up.
    pub fn new(
        predictors: Vec<PredictorId>,
        trials: Vec<TrialKey>,
        values: Array2<f64>,
        labels: Vec<u8>,
    ) -> Result<Self, DataShapeError> {
        if predictors.is_empty() {
            return Err(DataShapeError::EmptyPredictors);
        }
        if trials.is_empty() {
            return Err(DataShapeError::NoTrials);
        }
        if values.nrows() != labels.len() || trials.len() != labels.len() {
            return Err(DataShapeError::LabelCountMismatch {
                rows: values.nrows(),
                labels: labels.len(),
            });
        }
        if values.ncols() != predictors.len() {
            return Err(DataShapeError::PredictorCountMismatch {
                predictors: predictors.len(),
                columns: values.ncols(),
            });
        }
        Ok(Self {
            predictors,
            trials,
            values,
            labels,
        })
    }

    #[must_use]
    pub fn predictors(&self) -> &[PredictorId] {
        &self.predictors
    }

    #[must_use]
    pub fn trials(&self) -> &[TrialKey] {
        &self.trials
    }

    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    #[must_use]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    #[must_use]
    pub fn n_predictors(&self) -> usize {
        self.predictors.len()
    }

    /// Values of one predictor column, if the predictor is part of the matrix.
    #[must_use]
    pub fn column(&self, predictor: &PredictorId) -> Option<ArrayView1<'_, f64>> {
        let col = self.predictors.iter().position(|p| p == predictor)?;
        Some(self.values.column(col))
    }

    /// `(predictor, trial)` combinations without a value, in row-major order.
    #[must_use]
    pub fn missing(&self) -> Vec<(&PredictorId, &TrialKey)> {
        self.values
            .indexed_iter()
            .filter(|(_, v)| v.is_nan())
            .map(|((row, col), _)| (&self.predictors[col], &self.trials[row]))
            .collect()
    }

    /// Fails on the first missing combination.
    pub fn ensure_complete(&self) -> Result<(), DataShapeError> {
        match self.missing().first() {
            None => Ok(()),
            Some((predictor, trial)) => Err(DataShapeError::MissingCombination {
                predictor: (*predictor).clone(),
                subject: trial.subject.clone(),
                trial: trial.trial,
            }),
        }
    }

    /// Copy restricted to the trials without any missing value.
    pub fn complete_trials(&self) -> Result<Self, DataShapeError> {
        let rows = self
            .values
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        Self::new(
            self.predictors.clone(),
            rows.iter().map(|&r| self.trials[r].clone()).collect(),
            self.values.select(Axis(0), &rows),
            rows.iter().map(|&r| self.labels[r]).collect(),
        )
    }

    /// Copy restricted to the given predictor columns, in the given order.
    pub fn select_predictors(&self, predictors: &[PredictorId]) -> Result<Self, DataShapeError> {
        let cols = predictors
            .iter()
            .map(|p| {
                self.predictors
                    .iter()
                    .position(|q| q == p)
                    .ok_or_else(|| DataShapeError::UnknownMeasure { predictor: p.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(
            predictors.to_vec(),
            self.trials.clone(),
            self.values.select(Axis(1), &cols),
            self.labels.clone(),
        )
    }

    /// Copy restricted to the trials of one subject.
    pub fn subject(&self, subject: &str) -> Result<Self, DataShapeError> {
        let rows = self
            .trials
            .iter()
            .enumerate()
            .filter(|(_, t)| t.subject == subject)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        Self::new(
            self.predictors.clone(),
            rows.iter().map(|&r| self.trials[r].clone()).collect(),
            self.values.select(Axis(0), &rows),
            rows.iter().map(|&r| self.labels[r]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        predictor::catalogue,
        store::testing::{SUBJECTS, TRIALS, synthetic_store},
        view::{RegionFilter, SubjectSelector, ViewConfig},
    };

    fn view(config: ViewConfig) -> SubjectView {
        SubjectView::new(&synthetic_store(), config).unwrap()
    }

    fn list(items: &[&str]) -> PredictorSet {
        PredictorSet::List(items.iter().map(|s| s.parse().unwrap()).collect())
    }

    #[test]
    fn test_one_row_per_trial() {
        let v = view(ViewConfig::default());
        let matrix = FeatureMatrixBuilder::new()
            .build(&v, &list(&["earlyhfa@T", "earlyhfa@F"]))
            .unwrap();
        assert_eq!(matrix.n_trials(), SUBJECTS.len() * TRIALS as usize);
        assert_eq!(matrix.values().dim(), (20, 2));
        assert_eq!(matrix.labels().iter().filter(|&&l| l == 1).count(), 10);
        matrix.ensure_complete().unwrap();
    }

    #[test]
    fn test_region_aggregate_is_median() {
        let v = view(ViewConfig {
            subject: SubjectSelector::One("S1".into()),
            ..ViewConfig::default()
        });
        let predictor: PredictorId = "prehfa@T".parse().unwrap();
        let matrix = FeatureMatrixBuilder::new()
            .build(&v, &PredictorSet::List(vec![predictor.clone()]))
            .unwrap();
        let idx = v.trial_channel().require_column("prehfa").unwrap();
        let expected = v
            .trial_channel()
            .records()
            .iter()
            .filter(|r| r.trial == Some(4) && r.site.sides().all(|s| s.region == "T"))
            .map(|r| r.values[idx])
            .collect::<Vec<_>>();
        assert_eq!(expected.len(), 2);
        let row = matrix.trials().iter().position(|t| t.trial == 4).unwrap();
        let got = matrix.column(&predictor).unwrap()[row];
        assert!((got - f64::midpoint(expected[0], expected[1])).abs() < 1e-12);
    }

    #[test]
    fn test_lobe_grouping_reaches_region_n_channels() {
        let v = view(ViewConfig::default());
        let set = list(&["prehfa@F"]);
        let by_region = FeatureMatrixBuilder::new().build(&v, &set).unwrap();
        let by_lobe = FeatureMatrixBuilder::new()
            .with_grouping(Grouping::Lobe)
            .build(&v, &set)
            .unwrap();
        assert_ne!(by_region.values(), by_lobe.values());
        assert_eq!("lobe".parse::<Grouping>().unwrap(), Grouping::Lobe);
        assert!("hemisphere".parse::<Grouping>().is_err());
    }

    #[test]
    fn test_catalogue_missing_directions_are_nan() {
        let v = view(ViewConfig {
            regions: RegionFilter::exclude(["N"]),
            ..ViewConfig::default()
        });
        let matrix = FeatureMatrixBuilder::new()
            .build(&v, &PredictorSet::All)
            .unwrap();
        assert_eq!(matrix.predictors(), catalogue(v.config().band));
        // no frontal-to-frontal pair survives the exclusion
        let ff: PredictorId = "normtspacmax@FF".parse().unwrap();
        assert!(matrix.column(&ff).unwrap().iter().all(|v| v.is_nan()));
        assert!(matches!(
            matrix.ensure_complete(),
            Err(DataShapeError::MissingCombination { .. })
        ));
        let complete = matrix
            .select_predictors(&["earlyhfa@T".parse().unwrap()])
            .unwrap()
            .complete_trials()
            .unwrap();
        assert_eq!(complete.n_trials(), 20);
    }

    #[test]
    fn test_unknown_measure_and_empty_set() {
        let v = view(ViewConfig::default());
        assert!(matches!(
            FeatureMatrixBuilder::new().build(&v, &list(&["nosuchmeasure@T"])),
            Err(DataShapeError::UnknownMeasure { .. })
        ));
        assert_eq!(
            FeatureMatrixBuilder::new().build(&v, &PredictorSet::List(vec![])),
            Err(DataShapeError::EmptyPredictors)
        );
    }

    #[test]
    fn test_inconsistent_label_rejected() {
        let store = synthetic_store();
        let mut tables = store.tables().clone();
        let idx = tables.trial_channel.require_column(OUTCOME_COLUMN).unwrap();
        let mut flipped = false;
        tables.trial_channel = tables.trial_channel.with_derived_column(OUTCOME_COLUMN, |r| {
            if !flipped && r.trial == Some(2) {
                flipped = true;
                1.0 - r.values[idx]
            } else {
                r.values[idx]
            }
        });
        let store = crate::store::FeatureStore::from_tables(tables);
        let v = SubjectView::new(&store, ViewConfig::default()).unwrap();
        assert!(matches!(
            FeatureMatrixBuilder::new().build(&v, &list(&["earlyhfa@T"])),
            Err(DataShapeError::InconsistentLabel { trial: 2, .. })
        ));
    }

    #[test]
    fn test_subject_slice() {
        let v = view(ViewConfig::default());
        let matrix = FeatureMatrixBuilder::new()
            .build(&v, &list(&["earlyhfa@T"]))
            .unwrap();
        let s2 = matrix.subject("S2").unwrap();
        assert_eq!(s2.n_trials(), TRIALS as usize);
        assert!(s2.trials().iter().all(|t| t.subject == "S2"));
    }
}
