use std::{
    path::{Path, PathBuf},
    thread,
};

use anyhow::Context;
use chrono::Utc;
use mnemo_data::{
    store::FeatureStore,
    view::{RegionFilter, SubjectSelector, SubjectView, ThetaBand, ThetaPolicy, ViewConfig},
};

use crate::{
    policy::ViewPolicy,
    schema::views::ViewManifest,
    util::{self, Output},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SaveSubjectsArg {
    /// Directory holding the four raw measurement CSV files
    #[arg(long)]
    data_dir: PathBuf,
    /// Directory the subject views are written to
    #[arg(long)]
    output_dir: PathBuf,
    /// Subjects to save (default: every subject in the data)
    #[arg(long, value_delimiter = ',')]
    subjects: Vec<String>,
    /// Regions or lobes whose channels are dropped; pass an empty value to keep all
    #[arg(long, value_delimiter = ',', default_value = "N")]
    exclude_regions: Vec<String>,
    /// Theta detection policy: pval, percent or bump
    #[arg(long, default_value = "bump")]
    theta_policy: ThetaPolicy,
    /// Threshold for the pval and percent theta policies
    #[arg(long)]
    theta_level: Option<f64>,
    /// Theta band variant: cf or canon
    #[arg(long, default_value = "cf")]
    band: ThetaBand,
}

pub(crate) fn run(arg: &SaveSubjectsArg) -> anyhow::Result<()> {
    let SaveSubjectsArg {
        data_dir,
        output_dir,
        subjects,
        exclude_regions,
        theta_policy,
        theta_level,
        band,
    } = arg;

    let exclude = exclude_regions
        .iter()
        .filter(|r| !r.is_empty())
        .cloned()
        .collect::<Vec<_>>();
    let base = ViewConfig {
        regions: if exclude.is_empty() {
            RegionFilter::None
        } else {
            RegionFilter::exclude(exclude)
        },
        theta_policy: *theta_policy,
        theta_level: *theta_level,
        band: *band,
        ..ViewConfig::default()
    };
    for policy in ViewPolicy::ALL {
        policy.apply(&base).validate()?;
    }

    let store = FeatureStore::load(data_dir)
        .with_context(|| format!("Failed to load measurements from {}", data_dir.display()))?;
    let subjects = if subjects.is_empty() {
        store.subjects()
    } else {
        subjects.clone()
    };
    tracing::info!(subjects = subjects.len(), "saving subject views");

    thread::scope(|s| {
        let handles = subjects
            .iter()
            .map(|subject| {
                let (store, base) = (&store, &base);
                s.spawn(move || save_subject(store, base, subject, output_dir))
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

    let manifest = ViewManifest {
        created_at: Utc::now(),
        data_dir: data_dir.clone(),
        subjects,
        policies: ViewPolicy::ALL.iter().map(ToString::to_string).collect(),
        config: base,
    };
    Output::save_json(&manifest, Some(output_dir.join("manifest.json")))?;
    tracing::info!(path = %output_dir.display(), "subject views saved");
    Ok(())
}

fn save_subject(
    store: &FeatureStore,
    base: &ViewConfig,
    subject: &str,
    output_dir: &Path,
) -> anyhow::Result<()> {
    for policy in ViewPolicy::ALL {
        let config = ViewConfig {
            subject: SubjectSelector::One(subject.to_owned()),
            ..policy.apply(base)
        };
        let view = SubjectView::new(store, config)
            .with_context(|| format!("Failed to build {policy} view of subject {subject}"))?;
        tracing::debug!(
            subject,
            %policy,
            channels = view.channel().len(),
            pairs = view.pair().len(),
            trial_rows = view.trial_channel().len(),
            "built view"
        );
        let path = util::view_path(output_dir, subject, policy);
        Output::save_json(&view, Some(path))?;
    }
    Ok(())
}
