use std::{
    fs::{self, File},
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
    thread,
};

use anyhow::Context;
use mnemo_classify::{harness::HarnessConfig, logistic::ClassifierMethod};
use mnemo_data::{
    matrix::{FeatureMatrix, FeatureMatrixBuilder, Grouping},
    predictor::PredictorSet,
    view::SubjectView,
};

use crate::policy::ViewPolicy;

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) => Output::open(path),
            None => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Path of a saved subject view: `<dir>/<subject>_<policy>.json`.
pub fn view_path(dir: &Path, subject: &str, policy: ViewPolicy) -> PathBuf {
    dir.join(format!("{subject}_{policy}.json"))
}

/// Subjects with a saved view for `policy` in `dir`, sorted.
pub fn discover_subjects(dir: &Path, policy: ViewPolicy) -> anyhow::Result<Vec<String>> {
    let suffix = format!("_{policy}.json");
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read views directory: {}", dir.display()))?;
    let mut subjects = vec![];
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        let name = entry.file_name();
        if let Some(subject) = name.to_str().and_then(|n| n.strip_suffix(&suffix))
            && !subject.is_empty()
        {
            subjects.push(subject.to_owned());
        }
    }
    subjects.sort();
    Ok(subjects)
}

/// Which saved subject views a command reads.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ViewSourceArg {
    /// Directory written by `save-subjects`
    #[arg(long)]
    pub views_dir: PathBuf,
    /// Inclusion policy of the views: all, theta, notheta or theta_phase
    #[arg(long, default_value = "all")]
    pub policy: ViewPolicy,
    /// Subjects to process (default: every subject with a saved view)
    #[arg(long, value_delimiter = ',')]
    pub subjects: Vec<String>,
    /// Channel attribute one-character labels refer to: region or lobe
    #[arg(long, default_value = "region")]
    pub grouping: Grouping,
}

impl ViewSourceArg {
    pub fn subjects(&self) -> anyhow::Result<Vec<String>> {
        if !self.subjects.is_empty() {
            return Ok(self.subjects.clone());
        }
        let subjects = discover_subjects(&self.views_dir, self.policy)?;
        anyhow::ensure!(
            !subjects.is_empty(),
            "No {} views found in {}",
            self.policy,
            self.views_dir.display()
        );
        Ok(subjects)
    }

    pub fn load_view(&self, subject: &str) -> anyhow::Result<SubjectView> {
        read_json_file(
            "subject view",
            view_path(&self.views_dir, subject, self.policy),
        )
    }

    /// Builds one matrix per subject, subjects in parallel.
    pub fn load_matrices(
        &self,
        predictors: &PredictorSet,
    ) -> anyhow::Result<Vec<(String, FeatureMatrix)>> {
        let subjects = self.subjects()?;
        let builder = FeatureMatrixBuilder::new().with_grouping(self.grouping);
        thread::scope(|s| {
            let handles = subjects
                .iter()
                .map(|subject| {
                    s.spawn(move || -> anyhow::Result<(String, FeatureMatrix)> {
                        let view = self.load_view(subject)?;
                        let matrix = builder.build(&view, predictors).with_context(|| {
                            format!("Failed to build feature matrix for subject {subject}")
                        })?;
                        tracing::debug!(
                            subject = %subject,
                            trials = matrix.n_trials(),
                            predictors = matrix.n_predictors(),
                            "built feature matrix"
                        );
                        Ok((subject.clone(), matrix))
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
}

/// Classification harness parameters.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct HarnessArg {
    /// Classifier method
    #[arg(long, default_value = "logistic")]
    pub method: ClassifierMethod,
    /// Inverse regularization strengths; more than one value is searched by
    /// cross-validation
    #[arg(long, value_delimiter = ',', default_value = "0.01,0.1,1,10")]
    pub c_grid: Vec<f64>,
    /// Number of cross-validation folds
    #[arg(long, default_value_t = 5)]
    pub cv: usize,
    /// Fraction of trials held out for testing
    #[arg(long, default_value_t = 0.3)]
    pub test_size: f64,
}

impl HarnessArg {
    pub fn config(&self, seed: u64) -> anyhow::Result<HarnessConfig> {
        let config = HarnessConfig {
            method: self.method,
            c_grid: self.c_grid.clone(),
            cv: self.cv,
            test_size: self.test_size,
            seed,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mnemo-cli-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_discover_subjects_matches_policy_exactly() {
        let dir = temp_dir("discover");
        for name in ["R1_theta.json", "R1_notheta.json", "R2_notheta.json", "notes.txt"] {
            fs::write(dir.join(name), "{}").unwrap();
        }
        assert_eq!(discover_subjects(&dir, ViewPolicy::Theta).unwrap(), ["R1"]);
        assert_eq!(
            discover_subjects(&dir, ViewPolicy::NoTheta).unwrap(),
            ["R1", "R2"]
        );
        assert!(discover_subjects(&dir, ViewPolicy::All).unwrap().is_empty());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_json_output_round_trip() {
        let dir = temp_dir("output");
        let path = dir.join("nested").join("out.json");
        Output::save_json(&vec![0.5, 0.75], Some(path.clone())).unwrap();
        let back: Vec<f64> = read_json_file("test", &path).unwrap();
        assert_eq!(back, [0.5, 0.75]);
        assert!(read_json_file::<Vec<f64>, _>("test", dir.join("missing.json")).is_err());
        fs::remove_dir_all(dir).unwrap();
    }
}
