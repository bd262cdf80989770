use std::{path::PathBuf, thread};

use anyhow::Context;
use chrono::Utc;
use mnemo_classify::harness::{ClassificationHarness, FinalModel, HarnessConfig};
use mnemo_data::{matrix::FeatureMatrix, predictor::PredictorSet};

use crate::{
    schema::coefficients::{FinalCoefficients, SubjectCoefficients},
    util::{HarnessArg, Output, ViewSourceArg},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct FinalCoefsArg {
    #[clap(flatten)]
    views: ViewSourceArg,
    #[clap(flatten)]
    harness: HarnessArg,
    /// Predictors as comma-separated `measure@label` items, or `all`
    #[arg(long)]
    predictors: PredictorSet,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &FinalCoefsArg) -> anyhow::Result<()> {
    let FinalCoefsArg {
        views,
        harness,
        predictors,
        output,
    } = arg;
    let config = harness.config(0)?;
    let matrices = views.load_matrices(predictors)?;

    let best = fit_all(&matrices, &config)?;
    let c_best = best.iter().map(|m| m.c).collect::<Vec<_>>();
    let c_mode = modal_c(&c_best).context("No subjects to fit")?;
    tracing::info!(?c_best, c_mode, "selected modal regularization");

    let modal = fit_all(
        &matrices,
        &HarnessConfig {
            c_grid: vec![c_mode],
            ..config
        },
    )?;

    let subjects = matrices
        .iter()
        .zip(c_best)
        .zip(modal)
        .map(|(((subject, matrix), c_best), model)| SubjectCoefficients {
            subject: subject.clone(),
            c_best,
            coefficients: matrix
                .predictors()
                .iter()
                .map(ToString::to_string)
                .zip(model.coefficients)
                .collect(),
            intercept: model.intercept,
        })
        .collect();
    let result = FinalCoefficients {
        created_at: Utc::now(),
        policy: views.policy.to_string(),
        predictors: matrices
            .first()
            .map(|(_, m)| m.predictors().to_vec())
            .unwrap_or_default(),
        c_mode,
        subjects,
    };
    Output::save_json(&result, output.clone())?;
    Ok(())
}

/// Refits every subject on all of its trials, subjects in parallel.
fn fit_all(
    matrices: &[(String, FeatureMatrix)],
    config: &HarnessConfig,
) -> anyhow::Result<Vec<FinalModel>> {
    let harness = ClassificationHarness::new(config.clone())?;
    thread::scope(|s| {
        let handles = matrices
            .iter()
            .map(|(subject, matrix)| {
                let harness = &harness;
                s.spawn(move || {
                    harness
                        .final_fit(matrix)
                        .with_context(|| format!("Failed to fit subject {subject}"))
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

/// Most frequent value; the smallest one among equally frequent values.
fn modal_c(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
        .chunk_by(|a, b| a.total_cmp(b).is_eq())
        .fold(None, |best: Option<(f64, usize)>, run| match best {
            Some((_, count)) if count >= run.len() => best,
            _ => Some((run[0], run.len())),
        })
        .map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modal_c_prefers_smallest_on_ties() {
        assert_eq!(modal_c(&[1.0, 0.1, 10.0, 0.1, 1.0]), Some(0.1));
        assert_eq!(modal_c(&[10.0, 1.0, 10.0]), Some(10.0));
        assert_eq!(modal_c(&[0.01]), Some(0.01));
        assert_eq!(modal_c(&[]), None);
    }
}
