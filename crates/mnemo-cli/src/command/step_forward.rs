use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
};

use anyhow::Context;
use chrono::Utc;
use mnemo_classify::selection::{ForwardSelector, HarnessScorer, JsonRoundStore};
use mnemo_data::{
    matrix::FeatureMatrix,
    predictor::{PredictorId, PredictorSet},
};

use crate::{
    schema::selection::{LabeledSelection, StepForwardRun},
    util::{HarnessArg, Output, ViewSourceArg},
};

/// Whether subjects share one selection or each get their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectionMode {
    Pooled,
    PerSubject,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionMode::Pooled => "pooled",
            SelectionMode::PerSubject => "per-subject",
        })
    }
}

impl FromStr for SelectionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pooled" => Ok(SelectionMode::Pooled),
            "per-subject" => Ok(SelectionMode::PerSubject),
            _ => anyhow::bail!("unknown selection mode '{s}' (expected pooled or per-subject)"),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct StepForwardArg {
    #[clap(flatten)]
    views: ViewSourceArg,
    #[clap(flatten)]
    harness: HarnessArg,
    /// Candidate predictors as comma-separated `measure@label` items, or `all`
    #[arg(long, default_value = "all")]
    candidates: PredictorSet,
    /// pooled: one selection over all subjects; per-subject: one per subject
    #[arg(long, default_value = "pooled")]
    mode: SelectionMode,
    /// Seeds per cell
    #[arg(long, default_value_t = 200)]
    nseed: u64,
    /// Directory of cached cells; existing cells are reused
    #[arg(long)]
    cache_dir: PathBuf,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &StepForwardArg) -> anyhow::Result<()> {
    let StepForwardArg {
        views,
        harness,
        candidates,
        mode,
        nseed,
        cache_dir,
        output,
    } = arg;
    anyhow::ensure!(*nseed > 0, "--nseed must be at least 1");
    let config = harness.config(0)?;
    let seeds = (0..*nseed).collect::<Vec<_>>();

    let matrices = views.load_matrices(candidates)?;
    let scorer = HarnessScorer::new(matrices, config, seeds)?;
    let jobs = match mode {
        SelectionMode::Pooled => vec![("pooled".to_owned(), scorer)],
        SelectionMode::PerSubject => scorer.per_subject(),
    };
    tracing::info!(%mode, jobs = jobs.len(), nseed, "starting forward selection");

    let selections = thread::scope(|s| {
        let handles = jobs
            .iter()
            .map(|(label, scorer)| s.spawn(move || select(label, scorer, cache_dir)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    let run = StepForwardRun {
        created_at: Utc::now(),
        policy: views.policy.to_string(),
        mode: mode.to_string(),
        nseed: *nseed,
        selections,
    };
    Output::save_json(&run, output.clone())?;
    Ok(())
}

fn select(
    label: &str,
    scorer: &HarnessScorer,
    cache_dir: &Path,
) -> anyhow::Result<LabeledSelection> {
    let (candidates, dropped) = complete_candidates(scorer.matrices());
    for predictor in &dropped {
        tracing::warn!(label, %predictor, "candidate has missing values, skipped");
    }
    let store = JsonRoundStore::new(cache_dir, label);
    let result = ForwardSelector::new(candidates)?
        .run(scorer, &store)
        .with_context(|| format!("Forward selection '{label}' failed"))?;
    tracing::info!(
        label,
        order = %result
            .selected
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
        "forward selection done"
    );
    Ok(LabeledSelection {
        label: label.to_owned(),
        subjects: scorer.subjects().into_iter().map(str::to_owned).collect(),
        dropped: dropped.iter().map(ToString::to_string).collect(),
        result,
    })
}

/// Splits the matrices' predictors into those without missing values in every
/// matrix and the rest, both in column order.
fn complete_candidates(
    matrices: &[(String, FeatureMatrix)],
) -> (Vec<PredictorId>, Vec<PredictorId>) {
    let Some((_, first)) = matrices.first() else {
        return (vec![], vec![]);
    };
    first.predictors().iter().cloned().partition(|p| {
        matrices.iter().all(|(_, m)| {
            m.column(p)
                .is_some_and(|column| column.iter().all(|v| !v.is_nan()))
        })
    })
}

#[cfg(test)]
mod tests {
    use mnemo_data::matrix::TrialKey;
    use ndarray::array;

    use super::*;

    fn matrix(subject: &str, second: f64) -> FeatureMatrix {
        FeatureMatrix::new(
            vec![
                PredictorId::new("earlyhfa", "T").unwrap(),
                PredictorId::new("lateslope", "F").unwrap(),
            ],
            (0..2)
                .map(|trial| TrialKey {
                    subject: subject.to_owned(),
                    trial,
                })
                .collect(),
            array![[0.1, 0.2], [0.3, second]],
            vec![0, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_incomplete_candidates_are_split_off() {
        let matrices = vec![
            ("R1".to_owned(), matrix("R1", 0.4)),
            ("R2".to_owned(), matrix("R2", f64::NAN)),
        ];
        let (kept, dropped) = complete_candidates(&matrices);
        assert_eq!(kept, [PredictorId::new("earlyhfa", "T").unwrap()]);
        assert_eq!(dropped, [PredictorId::new("lateslope", "F").unwrap()]);
        assert_eq!(complete_candidates(&[]), (vec![], vec![]));
    }

    #[test]
    fn test_mode_names() {
        for mode in [SelectionMode::Pooled, SelectionMode::PerSubject] {
            assert_eq!(mode.to_string().parse::<SelectionMode>().unwrap(), mode);
        }
        assert!("subject".parse::<SelectionMode>().is_err());
    }
}
