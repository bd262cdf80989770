use std::{path::PathBuf, thread};

use anyhow::Context;
use chrono::Utc;
use mnemo_classify::{
    harness::{ClassificationHarness, ResampleMethod, ResamplePolicy},
    summary::ResampleSummary,
};
use mnemo_data::{matrix::FeatureMatrix, predictor::PredictorSet};
use mnemo_stats::descriptive::DescriptiveStats;

use crate::{
    schema::classification::{ClassificationRun, SubjectClassification},
    util::{HarnessArg, Output, ViewSourceArg},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ClassifyArg {
    #[clap(flatten)]
    views: ViewSourceArg,
    #[clap(flatten)]
    harness: HarnessArg,
    /// Predictors as comma-separated `measure@label` items, or `all`
    #[arg(long, default_value = "all")]
    predictors: PredictorSet,
    /// Number of seeds; seed `i` drives the `i`-th train/test split
    #[arg(long, default_value_t = 1)]
    nseed: u64,
    /// Resampling of the test AUC: bootstrap or permute
    #[arg(long, default_value = "permute")]
    resample: ResampleMethod,
    /// Resamples per seed; 0 disables resampling
    #[arg(long, default_value_t = 0)]
    nresample: usize,
    /// Drop trials with a missing predictor instead of failing
    #[arg(long)]
    drop_incomplete: bool,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &ClassifyArg) -> anyhow::Result<()> {
    let ClassifyArg {
        views,
        harness,
        predictors,
        nseed,
        resample,
        nresample,
        drop_incomplete,
        output,
    } = arg;
    anyhow::ensure!(*nseed > 0, "--nseed must be at least 1");
    let config = harness.config(0)?;
    let resample = resample_policy(*resample, *nresample);

    let mut matrices = views.load_matrices(predictors)?;
    if *drop_incomplete {
        for (subject, matrix) in &mut matrices {
            let complete = matrix.complete_trials()?;
            if complete.n_trials() < matrix.n_trials() {
                tracing::warn!(
                    subject = %subject,
                    dropped = matrix.n_trials() - complete.n_trials(),
                    "dropped incomplete trials"
                );
            }
            *matrix = complete;
        }
    }
    tracing::info!(
        subjects = matrices.len(),
        nseed,
        nresample,
        "classifying memory outcome"
    );

    let subjects = thread::scope(|s| {
        let handles = matrices
            .iter()
            .map(|(subject, matrix)| {
                s.spawn(move || classify_subject(harness, subject, matrix, *nseed, resample))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    for subject in &subjects {
        tracing::info!(
            subject = %subject.subject,
            median_auc = subject.median_auc,
            p_value = subject.summary.map(|s| s.p_value),
            "classified"
        );
    }

    let run = ClassificationRun {
        created_at: Utc::now(),
        policy: views.policy.to_string(),
        predictors: matrices
            .first()
            .map(|(_, m)| m.predictors().to_vec())
            .unwrap_or_default(),
        config,
        nseed: *nseed,
        resample,
        subjects,
    };
    Output::save_json(&run, output.clone())?;
    Ok(())
}

fn resample_policy(method: ResampleMethod, count: usize) -> Option<ResamplePolicy> {
    (count > 0).then_some(ResamplePolicy { method, count })
}

fn classify_subject(
    harness: &HarnessArg,
    subject: &str,
    matrix: &FeatureMatrix,
    nseed: u64,
    resample: Option<ResamplePolicy>,
) -> anyhow::Result<SubjectClassification> {
    let mut aucs = vec![];
    let mut c = vec![];
    let mut resampled = vec![];
    for seed in 0..nseed {
        let report = ClassificationHarness::new(harness.config(seed)?)?
            .classify(matrix, resample)
            .with_context(|| format!("Failed to classify subject {subject} with seed {seed}"))?;
        tracing::debug!(subject, seed, auc = report.roc_auc, c = report.c, "seed done");
        aucs.push(report.roc_auc);
        c.push(report.c);
        if let Some(r) = report.resampled {
            resampled.push(r.aucs);
        }
    }
    let stats = DescriptiveStats::new(aucs.iter().copied())
        .with_context(|| format!("No finite AUC for subject {subject}"))?;
    let summary = ResampleSummary::new(stats.median, &resampled.concat());
    Ok(SubjectClassification {
        subject: subject.to_owned(),
        n_trials: matrix.n_trials(),
        aucs,
        median_auc: stats.median,
        mean_auc: stats.mean,
        std_auc: stats.std_dev,
        c,
        resampled,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        arg: ClassifyArg,
    }

    fn policy_of(extra: &[&str]) -> Option<ResamplePolicy> {
        let args = ["mnemo", "--views-dir", "views"].iter().chain(extra).copied();
        let ClassifyArg {
            resample,
            nresample,
            ..
        } = Cli::try_parse_from(args).unwrap().arg;
        resample_policy(resample, nresample)
    }

    #[test]
    fn test_resample_count_alone_permutes() {
        assert!(policy_of(&[]).is_none());
        let policy = policy_of(&["--nresample", "100"]).unwrap();
        assert_eq!(policy.method, ResampleMethod::Permute);
        assert_eq!(policy.count, 100);
        let policy = policy_of(&["--resample", "bootstrap", "--nresample", "5"]).unwrap();
        assert_eq!(policy.method, ResampleMethod::Bootstrap);
        assert!(policy_of(&["--resample", "bootstrap"]).is_none());
    }
}
