use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use mnemo_data::{source, table::TableKind};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CombineArg {
    /// Directory holding per-subject CSV exports
    #[arg(long)]
    input_dir: PathBuf,
    /// Table the exports hold: singlechannel, singletrial_singlechannel,
    /// multichannel or singletrial_multichannel
    #[arg(long, default_value = "singletrial_multichannel", value_parser = parse_table)]
    table: TableKind,
    /// Output file path (default: the table's conventional name in the input directory)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &CombineArg) -> anyhow::Result<()> {
    let CombineArg {
        input_dir,
        table,
        output,
    } = arg;
    let output = output
        .clone()
        .unwrap_or_else(|| input_dir.join(table.file_name()));

    let inputs = find_exports(input_dir, *table, &output)?;
    anyhow::ensure!(
        !inputs.is_empty(),
        "No {} exports found in {}",
        table_token(*table),
        input_dir.display()
    );
    for input in &inputs {
        tracing::debug!(path = %input.display(), "combining");
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    source::combine_files(*table, &inputs, &output)
        .with_context(|| format!("Failed to combine exports into {}", output.display()))?;
    Ok(())
}

/// Name token of a table kind, as in `kah_<token>.csv`.
fn table_token(kind: TableKind) -> &'static str {
    let name = kind.file_name();
    name.strip_prefix("kah_")
        .and_then(|n| n.strip_suffix(".csv"))
        .unwrap_or(name)
}

fn parse_table(s: &str) -> anyhow::Result<TableKind> {
    TableKind::ALL
        .into_iter()
        .find(|&kind| table_token(kind) == s)
        .with_context(|| format!("unknown table '{s}'"))
}

/// CSV files in `dir` carrying `kind`'s token, sorted by name, without `output`.
fn find_exports(dir: &Path, kind: TableKind, output: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let token = table_token(kind);
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    let mut inputs = vec![];
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // `multichannel` is also a substring of `singletrial_multichannel`
        let is_export = name.ends_with(".csv")
            && name.contains(token)
            && (kind.has_trial() || !name.contains("singletrial"));
        if is_export && name != kind.file_name() && path.as_path() != output {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}
