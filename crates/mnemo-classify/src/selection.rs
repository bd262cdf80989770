//! Greedy forward predictor selection with a per-cell result cache
//!
//! Every round scores each remaining candidate together with the predictors
//! selected so far, then moves the best candidate to the selected set. The run
//! always takes exactly one round per candidate; it never stops on a plateau.
//!
//! A round × candidate *cell* produces an [`AucGrid`] (subjects × seeds). Cells
//! go through a [`RoundStore`], so an interrupted run resumes from the cells
//! that were already written and deleting a single cell file recomputes only
//! that cell.
//!
//! # Ranking
//!
//! A cell's score is the median over subjects of the per-subject median over
//! seeds. The highest score wins; the earliest candidate wins ties and `NaN`
//! ranks below every number.
//!
//! # Concurrency
//!
//! Distinct cells never share a file. Two workers computing the *same* cell
//! at once both compute it and the last rename wins.

use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
};

use mnemo_data::{matrix::FeatureMatrix, predictor::PredictorId};
use mnemo_stats::descriptive::nan_median;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ClassifyError, SelectionError},
    harness::{ClassificationHarness, HarnessConfig},
};

/// Test-set AUCs of one predictor set, subjects × seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AucGrid {
    pub subjects: Vec<String>,
    pub seeds: Vec<u64>,
    /// Failed runs are `NaN`, stored as `null`.
    #[serde(with = "mnemo_data::nan_as_null::array2")]
    pub aucs: Array2<f64>,
}

impl AucGrid {
    /// Median over subjects of the per-subject median over seeds.
    ///
    /// # Examples
    ///
    /// ```
    /// use mnemo_classify::selection::AucGrid;
    /// use ndarray::array;
    ///
    /// let grid = AucGrid {
    ///     subjects: vec!["S1".into(), "S2".into()],
    ///     seeds: vec![0, 1, 2],
    ///     aucs: array![[0.5, 0.75, 0.625], [1.0, f64::NAN, 0.5]],
    /// };
    /// // medians 0.625 and 0.75
    /// assert_eq!(grid.median_of_medians(), 0.6875);
    /// ```
    #[must_use]
    pub fn median_of_medians(&self) -> f64 {
        nan_median(self.aucs.rows().into_iter().map(|row| nan_median(row.iter().copied())))
    }
}

/// Scores a predictor set.
pub trait CandidateScorer {
    fn score(&self, predictors: &[PredictorId]) -> Result<AucGrid, SelectionError>;
}

/// Scores predictor sets by running the classification harness once per
/// subject and seed.
///
/// Subjects are scored on separate threads.
#[derive(Debug, Clone)]
pub struct HarnessScorer {
    matrices: Vec<(String, FeatureMatrix)>,
    config: HarnessConfig,
    seeds: Vec<u64>,
}

impl HarnessScorer {
    /// `matrices` hold every candidate predictor; each cell selects its columns.
    pub fn new(
        matrices: Vec<(String, FeatureMatrix)>,
        config: HarnessConfig,
        seeds: Vec<u64>,
    ) -> Result<Self, ClassifyError> {
        config.validate()?;
        Ok(Self {
            matrices,
            config,
            seeds,
        })
    }

    #[must_use]
    pub fn matrices(&self) -> &[(String, FeatureMatrix)] {
        &self.matrices
    }

    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        self.matrices.iter().map(|(s, _)| s.as_str()).collect()
    }

    /// One scorer per subject, for independent per-subject selection.
    #[must_use]
    pub fn per_subject(&self) -> Vec<(String, HarnessScorer)> {
        self.matrices
            .iter()
            .map(|(subject, matrix)| {
                let scorer = HarnessScorer {
                    matrices: vec![(subject.clone(), matrix.clone())],
                    config: self.config.clone(),
                    seeds: self.seeds.clone(),
                };
                (subject.clone(), scorer)
            })
            .collect()
    }

    fn score_subject(
        &self,
        matrix: &FeatureMatrix,
        predictors: &[PredictorId],
    ) -> Result<Vec<f64>, SelectionError> {
        let matrix = matrix.select_predictors(predictors)?;
        self.seeds
            .iter()
            .map(|&seed| -> Result<f64, SelectionError> {
                let harness = ClassificationHarness::new(HarnessConfig {
                    seed,
                    ..self.config.clone()
                })?;
                Ok(harness.classify(&matrix, None)?.roc_auc)
            })
            .collect()
    }
}

impl CandidateScorer for HarnessScorer {
    fn score(&self, predictors: &[PredictorId]) -> Result<AucGrid, SelectionError> {
        let rows = thread::scope(|s| {
            let handles = self
                .matrices
                .iter()
                .map(|(_, matrix)| s.spawn(move || self.score_subject(matrix, predictors)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(row) => row,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        let mut aucs = Array2::from_elem((rows.len(), self.seeds.len()), f64::NAN);
        for (mut dst, row) in aucs.rows_mut().into_iter().zip(&rows) {
            dst.iter_mut().zip(row).for_each(|(d, v)| *d = *v);
        }
        Ok(AucGrid {
            subjects: self.matrices.iter().map(|(s, _)| s.clone()).collect(),
            seeds: self.seeds.clone(),
            aucs,
        })
    }
}

/// Position of a cell: round index and candidate index within that round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub round: usize,
    pub candidate: usize,
}

/// Memoizes cell results.
pub trait RoundStore {
    /// Returns the stored grid for `key`, or computes, stores and returns it.
    ///
    /// `candidates` is the remaining candidate list of the round, kept with
    /// the result. A stored grid is only reused for the same list.
    fn compute_or_load<F>(
        &self,
        key: CellKey,
        candidates: &[PredictorId],
        compute: F,
    ) -> Result<AucGrid, SelectionError>
    where
        F: FnOnce() -> Result<AucGrid, SelectionError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CellRecord {
    round: usize,
    candidate: usize,
    candidates: Vec<PredictorId>,
    grid: AucGrid,
}

/// One JSON file per cell: `<dir>/<prefix>_npred<round>_ipred<candidate>.json`.
#[derive(Debug, Clone)]
pub struct JsonRoundStore {
    dir: PathBuf,
    prefix: String,
}

impl JsonRoundStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn path(&self, key: CellKey) -> PathBuf {
        self.dir.join(format!(
            "{}_npred{}_ipred{}.json",
            self.prefix, key.round, key.candidate
        ))
    }

    fn load(path: &Path) -> Result<Option<CellRecord>, SelectionError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SelectionError::Cache {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        serde_json::from_reader(io::BufReader::new(file))
            .map(Some)
            .map_err(|source| SelectionError::CacheFormat {
                path: path.to_owned(),
                source,
            })
    }

    fn store(&self, path: &Path, record: &CellRecord) -> Result<(), SelectionError> {
        let cache_err = |source| SelectionError::Cache {
            path: path.to_owned(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(cache_err)?;
        let tmp = path.with_extension(format!("json.tmp{}", std::process::id()));
        let json = serde_json::to_vec(record).map_err(|source| SelectionError::CacheFormat {
            path: path.to_owned(),
            source,
        })?;
        fs::write(&tmp, json).map_err(cache_err)?;
        fs::rename(&tmp, path).map_err(cache_err)?;
        Ok(())
    }
}

impl RoundStore for JsonRoundStore {
    fn compute_or_load<F>(
        &self,
        key: CellKey,
        candidates: &[PredictorId],
        compute: F,
    ) -> Result<AucGrid, SelectionError>
    where
        F: FnOnce() -> Result<AucGrid, SelectionError>,
    {
        let path = self.path(key);
        match Self::load(&path)? {
            Some(record) if record.candidates == candidates => {
                tracing::debug!(path = %path.display(), "loaded cached cell");
                return Ok(record.grid);
            }
            Some(_) => tracing::warn!(
                path = %path.display(),
                "cached cell belongs to a different candidate list, recomputing"
            ),
            None => {}
        }
        let grid = compute()?;
        self.store(
            &path,
            &CellRecord {
                round: key.round,
                candidate: key.candidate,
                candidates: candidates.to_vec(),
                grid: grid.clone(),
            },
        )?;
        Ok(grid)
    }
}

/// Scores of one round and the candidate it selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: usize,
    pub selected: PredictorId,
    pub score: f64,
    /// Every candidate of the round with its score, in candidate order.
    pub scores: Vec<(PredictorId, f64)>,
}

/// Selection order and per-round scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected: Vec<PredictorId>,
    pub rounds: Vec<RoundResult>,
}

/// Greedy forward selection state.
#[derive(Debug, Clone)]
pub struct ForwardSelector {
    selected: Vec<PredictorId>,
    remaining: Vec<PredictorId>,
    rounds: Vec<RoundResult>,
}

impl ForwardSelector {
    /// Starts with nothing selected; duplicate candidates are dropped.
    pub fn new(candidates: Vec<PredictorId>) -> Result<Self, SelectionError> {
        let mut remaining: Vec<PredictorId> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !remaining.contains(&candidate) {
                remaining.push(candidate);
            }
        }
        if remaining.is_empty() {
            return Err(SelectionError::NoCandidates);
        }
        Ok(Self {
            selected: vec![],
            remaining,
            rounds: vec![],
        })
    }

    #[must_use]
    pub fn selected(&self) -> &[PredictorId] {
        &self.selected
    }

    #[must_use]
    pub fn remaining(&self) -> &[PredictorId] {
        &self.remaining
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Runs one round; returns `None` once every candidate is selected.
    pub fn step<S, R>(&mut self, scorer: &S, store: &R) -> Result<Option<&RoundResult>, SelectionError>
    where
        S: CandidateScorer,
        R: RoundStore,
    {
        if self.is_finished() {
            return Ok(None);
        }
        let round = self.rounds.len();
        let mut expected_subjects = None;
        let mut scores = Vec::with_capacity(self.remaining.len());
        for (candidate, predictor) in self.remaining.iter().enumerate() {
            let mut predictors = self.selected.clone();
            predictors.push(predictor.clone());
            let grid = store.compute_or_load(CellKey { round, candidate }, &self.remaining, || {
                scorer.score(&predictors)
            })?;
            let found = grid.aucs.nrows();
            let expected = *expected_subjects.get_or_insert(found);
            if found != expected || grid.subjects.len() != found {
                return Err(SelectionError::GridShape {
                    candidate,
                    expected,
                    found,
                });
            }
            scores.push((predictor.clone(), grid.median_of_medians()));
        }

        let best = best_index(scores.iter().map(|(_, s)| *s));
        let chosen = self.remaining.remove(best);
        tracing::info!(round, predictor = %chosen, score = scores[best].1, "selected");
        self.selected.push(chosen.clone());
        self.rounds.push(RoundResult {
            round,
            selected: chosen,
            score: scores[best].1,
            scores,
        });
        Ok(self.rounds.last())
    }

    /// Runs every remaining round.
    pub fn run<S, R>(mut self, scorer: &S, store: &R) -> Result<SelectionResult, SelectionError>
    where
        S: CandidateScorer,
        R: RoundStore,
    {
        while self.step(scorer, store)?.is_some() {}
        Ok(SelectionResult {
            selected: self.selected,
            rounds: self.rounds,
        })
    }
}

/// First index of the maximum; `NaN` ranks lowest and an all-`NaN` list picks 0.
fn best_index(scores: impl IntoIterator<Item = f64>) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.into_iter().enumerate() {
        match best {
            None => best = Some((i, score)),
            Some((_, b)) if score > b || (b.is_nan() && !score.is_nan()) => best = Some((i, score)),
            Some(_) => {}
        }
    }
    best.map_or(0, |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::BTreeMap};

    use ndarray::array;

    use super::*;
    use crate::harness::tests::synthetic_matrix;

    struct WeightScorer {
        weights: BTreeMap<String, f64>,
        calls: Cell<usize>,
    }

    impl WeightScorer {
        fn new(weights: &[(&str, f64)]) -> Self {
            Self {
                weights: weights.iter().map(|(m, w)| ((*m).to_owned(), *w)).collect(),
                calls: Cell::new(0),
            }
        }
    }

    impl CandidateScorer for WeightScorer {
        fn score(&self, predictors: &[PredictorId]) -> Result<AucGrid, SelectionError> {
            self.calls.set(self.calls.get() + 1);
            let total = predictors
                .iter()
                .map(|p| self.weights[p.measure()])
                .sum::<f64>();
            Ok(AucGrid {
                subjects: vec!["S1".into(), "S2".into()],
                seeds: vec![0, 1, 2],
                aucs: Array2::from_shape_fn((2, 3), |(s, k)| {
                    total + 0.01 * (s as f64) + 0.001 * (k as f64)
                }),
            })
        }
    }

    fn candidates(measures: &[&str]) -> Vec<PredictorId> {
        measures
            .iter()
            .map(|m| PredictorId::new(*m, "T").unwrap())
            .collect()
    }

    fn temp_store(name: &str) -> (PathBuf, JsonRoundStore) {
        let dir = std::env::temp_dir().join(format!(
            "mnemo-selection-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        (dir.clone(), JsonRoundStore::new(dir, "pooled"))
    }

    #[test]
    fn test_selects_in_score_order() {
        let (dir, store) = temp_store("order");
        let scorer = WeightScorer::new(&[("a", 0.1), ("b", 0.3), ("c", 0.2)]);
        let result = ForwardSelector::new(candidates(&["a", "b", "c"]))
            .unwrap()
            .run(&scorer, &store)
            .unwrap();
        let order = result
            .selected
            .iter()
            .map(PredictorId::measure)
            .collect::<Vec<_>>();
        assert_eq!(order, ["b", "c", "a"]);
        assert_eq!(result.rounds.len(), 3);
        assert_eq!(result.rounds[1].scores.len(), 2);
        // 3 + 2 + 1 cells
        assert_eq!(scorer.calls.get(), 6);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_step_keeps_sets_disjoint() {
        let (dir, store) = temp_store("disjoint");
        let scorer = WeightScorer::new(&[("a", 0.1), ("b", 0.3)]);
        let mut selector = ForwardSelector::new(candidates(&["a", "b", "a"])).unwrap();
        assert_eq!(selector.remaining().len(), 2);
        selector.step(&scorer, &store).unwrap();
        assert_eq!(selector.selected(), candidates(&["b"]));
        assert_eq!(selector.remaining(), candidates(&["a"]));
        selector.step(&scorer, &store).unwrap();
        assert!(selector.is_finished());
        assert!(selector.step(&scorer, &store).unwrap().is_none());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_cached_cells_are_reused() {
        let (dir, store) = temp_store("reuse");
        let weights = [("a", 0.1), ("b", 0.3), ("c", 0.2)];
        let first = WeightScorer::new(&weights);
        let expected = ForwardSelector::new(candidates(&["a", "b", "c"]))
            .unwrap()
            .run(&first, &store)
            .unwrap();

        let second = WeightScorer::new(&weights);
        let again = ForwardSelector::new(candidates(&["a", "b", "c"]))
            .unwrap()
            .run(&second, &store)
            .unwrap();
        assert_eq!(second.calls.get(), 0);
        assert_eq!(again, expected);

        fs::remove_file(store.path(CellKey {
            round: 1,
            candidate: 0,
        }))
        .unwrap();
        let third = WeightScorer::new(&weights);
        let rerun = ForwardSelector::new(candidates(&["a", "b", "c"]))
            .unwrap()
            .run(&third, &store)
            .unwrap();
        assert_eq!(third.calls.get(), 1);
        assert_eq!(rerun, expected);
        assert!(store.path(CellKey { round: 1, candidate: 0 }).exists());
        fs::remove_dir_all(dir).unwrap();
    }

    /// One seed of every cell failed.
    struct PartialScorer {
        calls: Cell<usize>,
    }

    impl CandidateScorer for PartialScorer {
        fn score(&self, predictors: &[PredictorId]) -> Result<AucGrid, SelectionError> {
            self.calls.set(self.calls.get() + 1);
            let auc = if predictors.last().is_some_and(|p| p.measure() == "b") {
                0.8
            } else {
                0.6
            };
            Ok(AucGrid {
                subjects: vec!["S1".into()],
                seeds: vec![0, 1],
                aucs: array![[auc, f64::NAN]],
            })
        }
    }

    #[test]
    fn test_cells_with_failed_seeds_reload() {
        let (dir, store) = temp_store("nan");
        let first = PartialScorer {
            calls: Cell::new(0),
        };
        let expected = ForwardSelector::new(candidates(&["a", "b"]))
            .unwrap()
            .run(&first, &store)
            .unwrap();
        assert_eq!(first.calls.get(), 3);
        assert_eq!(expected.rounds[0].score, 0.8);

        let second = PartialScorer {
            calls: Cell::new(0),
        };
        let again = ForwardSelector::new(candidates(&["a", "b"]))
            .unwrap()
            .run(&second, &store)
            .unwrap();
        assert_eq!(second.calls.get(), 0);
        assert_eq!(again, expected);

        let json = fs::read_to_string(store.path(CellKey {
            round: 0,
            candidate: 1,
        }))
        .unwrap();
        let record: CellRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.grid.aucs.dim(), (1, 2));
        assert_eq!(record.grid.aucs[[0, 0]], 0.8);
        assert!(record.grid.aucs[[0, 1]].is_nan());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_cells_of_another_candidate_list_are_recomputed() {
        let (dir, store) = temp_store("stale");
        let weights = [("a", 0.1), ("b", 0.3), ("c", 0.2)];
        ForwardSelector::new(candidates(&["a", "b", "c"]))
            .unwrap()
            .run(&WeightScorer::new(&weights), &store)
            .unwrap();

        // rounds 0 and 1 see the candidates in another order, round 2 only `a`
        let scorer = WeightScorer::new(&weights);
        let result = ForwardSelector::new(candidates(&["c", "a", "b"]))
            .unwrap()
            .run(&scorer, &store)
            .unwrap();
        assert_eq!(scorer.calls.get(), 5);
        assert_eq!(result.selected, candidates(&["b", "c", "a"]));
        assert_eq!(result.rounds[0].scores[0].0, candidates(&["c"])[0]);
        assert!((result.rounds[0].scores[0].1 - 0.206).abs() < 1e-12);

        let cached = WeightScorer::new(&weights);
        ForwardSelector::new(candidates(&["c", "a", "b"]))
            .unwrap()
            .run(&cached, &store)
            .unwrap();
        assert_eq!(cached.calls.get(), 0);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_ties_and_nan_ranking() {
        assert_eq!(best_index([0.5, 0.7, 0.7]), 1);
        assert_eq!(best_index([f64::NAN, 0.2, 0.1]), 1);
        assert_eq!(best_index([0.1, f64::NAN, 0.1]), 0);
        assert_eq!(best_index([f64::NAN, f64::NAN]), 0);
    }

    #[test]
    fn test_empty_candidates_rejected() {
        assert!(matches!(
            ForwardSelector::new(vec![]),
            Err(SelectionError::NoCandidates)
        ));
    }

    #[test]
    fn test_harness_scorer_grid_shape() {
        let scorer = HarnessScorer::new(
            vec![
                ("S1".into(), synthetic_matrix("S1", 30, 3, 2.0, 1)),
                ("S2".into(), synthetic_matrix("S2", 30, 3, 2.0, 2)),
            ],
            HarnessConfig {
                c_grid: vec![1.0],
                ..HarnessConfig::default()
            },
            vec![0, 1, 2, 3],
        )
        .unwrap();
        let predictors = candidates(&["m0"]);
        let grid = scorer.score(&predictors).unwrap();
        assert_eq!(grid.aucs.dim(), (2, 4));
        assert_eq!(grid.subjects, ["S1", "S2"]);
        assert!(grid.median_of_medians() > 0.8);
        assert_eq!(grid, scorer.score(&predictors).unwrap());

        let per_subject = scorer.per_subject();
        assert_eq!(per_subject.len(), 2);
        assert_eq!(per_subject[1].1.subjects(), ["S2"]);
    }

    #[test]
    fn test_harness_scorer_prefers_informative_predictor() {
        let scorer = HarnessScorer::new(
            vec![("S1".into(), synthetic_matrix("S1", 40, 3, 3.0, 5))],
            HarnessConfig {
                c_grid: vec![1.0],
                ..HarnessConfig::default()
            },
            vec![0, 1, 2],
        )
        .unwrap();
        let (dir, store) = temp_store("harness");
        let mut selector = ForwardSelector::new(candidates(&["m1", "m2", "m0"])).unwrap();
        let round = selector.step(&scorer, &store).unwrap().unwrap();
        assert_eq!(round.selected.measure(), "m0");
        fs::remove_dir_all(dir).unwrap();
    }
}
