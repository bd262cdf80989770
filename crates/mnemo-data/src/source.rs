//! CSV ingestion of raw measurement tables
//!
//! Each table is a CSV file with a header row. Key columns are recognised by
//! name:
//!
//! | column                          | kinds             |
//! |---------------------------------|-------------------|
//! | `subject`                       | all               |
//! | `trial`                         | trial kinds       |
//! | `channel`, `region`, `lobe`     | single-channel    |
//! | `channelA/B`, `regionA/B`, `lobeA/B` | pair kinds   |
//! | `pair` (optional)               | pair kinds        |
//!
//! An unnamed leading index column (as written by dataframe libraries) is
//! ignored. Every remaining column is a numeric measure; empty or unparsable
//! cells become `NaN`. When a pair table has no `pair` column, the pair name is
//! `channelA-channelB`.
//!
//! Per-subject exports of one kind are merged into a single file with
//! [`combine_files`].

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use crate::{
    error::LoadError,
    table::{ChannelSite, MeasurementTable, PairSite, Record, SideColumns, Site, TableKind},
};

const SUBJECT_COLUMN: &str = "subject";
const TRIAL_COLUMN: &str = "trial";
const PAIR_COLUMN: &str = "pair";

/// Reads one table from a CSV file.
pub fn read_table(kind: TableKind, path: &Path) -> Result<MeasurementTable, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        kind,
        path: path.to_owned(),
        source,
    })?;
    let table = read_table_from(kind, io::BufReader::new(file))?;
    tracing::debug!(%kind, path = %path.display(), rows = table.len(), "table read");
    Ok(table)
}

struct SideIndex {
    channel: usize,
    region: usize,
    lobe: usize,
}

struct Layout {
    subject: usize,
    trial: Option<usize>,
    pair: Option<usize>,
    sides: Vec<SideIndex>,
    measures: Vec<usize>,
}

impl Layout {
    fn new(kind: TableKind, headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| LoadError::MissingKeyColumn {
                kind,
                column: name.to_owned(),
            })
        };

        let subject = require(SUBJECT_COLUMN)?;
        let trial = kind.has_trial().then(|| require(TRIAL_COLUMN)).transpose()?;
        let pair = if kind.is_pair() { find(PAIR_COLUMN) } else { None };
        let sides = kind
            .sides()
            .iter()
            .map(|&SideColumns { channel, region, lobe }| {
                Ok(SideIndex {
                    channel: require(channel)?,
                    region: require(region)?,
                    lobe: require(lobe)?,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let mut keys = vec![subject];
        keys.extend(trial);
        keys.extend(pair);
        keys.extend(sides.iter().flat_map(|s| [s.channel, s.region, s.lobe]));
        let measures = headers
            .iter()
            .enumerate()
            .filter(|(idx, name)| !keys.contains(idx) && !is_index_column(name))
            .map(|(idx, _)| idx)
            .collect();

        Ok(Self {
            subject,
            trial,
            pair,
            sides,
            measures,
        })
    }

    fn site(&self, kind: TableKind, row: &csv::StringRecord) -> Site {
        let side = |idx: &SideIndex| {
            ChannelSite::new(
                field(row, idx.channel),
                field(row, idx.region),
                field(row, idx.lobe),
            )
        };
        if !kind.is_pair() {
            return Site::Channel(side(&self.sides[0]));
        }
        let (a, b) = (side(&self.sides[0]), side(&self.sides[1]));
        let pair = match self.pair {
            Some(idx) => field(row, idx).to_owned(),
            None => format!("{}-{}", a.channel, b.channel),
        };
        Site::Pair(PairSite {
            pair,
            a,
            b,
            phase_encoding: false,
        })
    }
}

fn is_index_column(name: &str) -> bool {
    name.is_empty() || name.starts_with("Unnamed")
}

fn field(row: &csv::StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or("").trim()
}

fn parse_measure(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

/// Trial numbers may be written as floats (`3.0`) by dataframe exports.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
fn parse_trial(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Ok(trial) = text.parse() {
        return Some(trial);
    }
    let value = text.parse::<f64>().ok()?;
    let trial = value as u32;
    (f64::from(trial) == value).then_some(trial)
}

/// Reads one table from any CSV source.
///
/// # Examples
///
/// ```
/// use mnemo_data::{source::read_table_from, table::TableKind};
///
/// let csv = "\
/// ,subject,channel,region,lobe,thetabump,pvalposttheta
/// 0,R1,LA1,T,T,1,0.01
/// 1,R1,LF3,F,F,0,
/// ";
/// let table = read_table_from(TableKind::Channel, csv.as_bytes())?;
/// assert_eq!(table.columns(), ["thetabump", "pvalposttheta"]);
/// assert_eq!(table.len(), 2);
/// assert!(table.records()[1].values[1].is_nan());
/// # Ok::<(), mnemo_data::error::LoadError>(())
/// ```
pub fn read_table_from<R>(kind: TableKind, reader: R) -> Result<MeasurementTable, LoadError>
where
    R: io::Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|source| LoadError::Csv { kind, source })?
        .clone();
    let layout = Layout::new(kind, &headers)?;
    let columns = layout
        .measures
        .iter()
        .map(|&idx| headers[idx].trim().to_owned())
        .collect();

    let mut table = MeasurementTable::new(kind, columns);
    for row in reader.records() {
        let row = row.map_err(|source| LoadError::Csv { kind, source })?;
        let line = row.position().map_or(0, csv::Position::line);
        let trial = match layout.trial {
            Some(idx) => {
                let text = field(&row, idx);
                Some(parse_trial(text).ok_or_else(|| LoadError::InvalidKey {
                    kind,
                    line,
                    column: TRIAL_COLUMN.to_owned(),
                    value: text.to_owned(),
                })?)
            }
            None => None,
        };
        let subject = field(&row, layout.subject);
        if subject.is_empty() {
            return Err(LoadError::InvalidKey {
                kind,
                line,
                column: SUBJECT_COLUMN.to_owned(),
                value: String::new(),
            });
        }
        table.push(Record {
            subject: subject.to_owned(),
            trial,
            site: layout.site(kind, &row),
            direction: None,
            values: layout
                .measures
                .iter()
                .map(|&idx| parse_measure(field(&row, idx)))
                .collect(),
        })?;
    }
    Ok(table)
}

/// Concatenates CSV exports of one table kind, in input order.
///
/// The output header is the union of the inputs' named columns in first-seen
/// order; a row leaves the columns its input lacks empty. Unnamed index
/// columns are dropped. Every input must carry the key columns of `kind`.
/// Returns the number of rows written.
///
/// # Examples
///
/// ```
/// use mnemo_data::{source::combine_tables, table::TableKind};
///
/// let r1 = ",subject,channel,region,lobe,thetabump\n0,R1,LA1,T,T,1\n";
/// let r2 = "subject,channel,region,lobe,pvalposttheta\nR2,RF2,F,F,0.2\n";
/// let mut out = vec![];
/// let rows = combine_tables(TableKind::Channel, [r1.as_bytes(), r2.as_bytes()], &mut out)?;
/// assert_eq!(rows, 2);
/// assert_eq!(
///     String::from_utf8(out).unwrap(),
///     "subject,channel,region,lobe,thetabump,pvalposttheta\n\
///      R1,LA1,T,T,1,\n\
///      R2,RF2,F,F,,0.2\n"
/// );
/// # Ok::<(), mnemo_data::error::LoadError>(())
/// ```
pub fn combine_tables<R, W>(
    kind: TableKind,
    inputs: impl IntoIterator<Item = R>,
    output: W,
) -> Result<usize, LoadError>
where
    R: io::Read,
    W: io::Write,
{
    let csv_err = |source| LoadError::Csv { kind, source };
    let mut readers = inputs
        .into_iter()
        .map(|input| csv::ReaderBuilder::new().flexible(false).from_reader(input))
        .collect::<Vec<_>>();

    // (input column, output column) per reader
    let mut columns: Vec<String> = vec![];
    let mut mappings = Vec::with_capacity(readers.len());
    for reader in &mut readers {
        let headers = reader.headers().map_err(csv_err)?.clone();
        Layout::new(kind, &headers)?;
        let mut mapping = vec![];
        for (idx, name) in headers.iter().map(str::trim).enumerate() {
            if is_index_column(name) {
                continue;
            }
            let out = match columns.iter().position(|c| c == name) {
                Some(out) => out,
                None => {
                    columns.push(name.to_owned());
                    columns.len() - 1
                }
            };
            mapping.push((idx, out));
        }
        mappings.push(mapping);
    }

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(&columns).map_err(csv_err)?;
    let mut rows = 0;
    for (reader, mapping) in readers.iter_mut().zip(&mappings) {
        for row in reader.records() {
            let row = row.map_err(csv_err)?;
            let mut cells = vec![""; columns.len()];
            for &(from, to) in mapping {
                cells[to] = row.get(from).unwrap_or("");
            }
            writer.write_record(&cells).map_err(csv_err)?;
            rows += 1;
        }
    }
    writer.flush().map_err(|e| csv_err(e.into()))?;
    Ok(rows)
}

/// [`combine_tables`] over files.
pub fn combine_files(kind: TableKind, inputs: &[PathBuf], output: &Path) -> Result<usize, LoadError> {
    let readers = inputs
        .iter()
        .map(|path| {
            File::open(path)
                .map(io::BufReader::new)
                .map_err(|source| LoadError::Open {
                    kind,
                    path: path.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let file = File::create(output).map_err(|source| LoadError::Create {
        kind,
        path: output.to_owned(),
        source,
    })?;
    let rows = combine_tables(kind, readers, io::BufWriter::new(file))?;
    tracing::info!(%kind, inputs = inputs.len(), rows, path = %output.display(), "tables combined");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_table_without_pair_column() {
        let csv = "\
subject,trial,channelA,regionA,lobeA,channelB,regionB,lobeB,normtspacAB_cf,encoding
R1,0.0,LA1,T,T,LF3,F,F,0.4,1
R1,1,LA1,T,T,LF3,F,F,NaN,0
";
        let table = read_table_from(TableKind::TrialPair, csv.as_bytes()).unwrap();
        assert_eq!(table.columns(), ["normtspacAB_cf", "encoding"]);
        let first = &table.records()[0];
        assert_eq!(first.trial, Some(0));
        assert_eq!(first.site.as_pair().unwrap().pair, "LA1-LF3");
        assert!(table.records()[1].values[0].is_nan());
    }

    #[test]
    fn test_combine_checks_every_input() {
        let good = "subject,channel,region,lobe,thetabump\nR1,LA1,T,T,1\n";
        let bad = "subject,channel,region,thetabump\nR2,LA1,T,0\n";
        let mut out = vec![];
        assert!(matches!(
            combine_tables(TableKind::Channel, [good.as_bytes(), bad.as_bytes()], &mut out),
            Err(LoadError::MissingKeyColumn { column, .. }) if column == "lobe"
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_key_column() {
        let csv = "subject,channel,region,thetabump\nR1,LA1,T,1\n";
        assert!(matches!(
            read_table_from(TableKind::Channel, csv.as_bytes()),
            Err(LoadError::MissingKeyColumn { column, .. }) if column == "lobe"
        ));
    }

    #[test]
    fn test_invalid_trial_number() {
        let csv = "subject,trial,channel,region,lobe,posttheta\nR1,1.5,LA1,T,T,0.2\n";
        assert!(matches!(
            read_table_from(TableKind::TrialChannel, csv.as_bytes()),
            Err(LoadError::InvalidKey { line: 2, .. })
        ));
    }

    #[test]
    fn test_parse_trial_accepts_integral_floats() {
        assert_eq!(parse_trial("12"), Some(12));
        assert_eq!(parse_trial(" 7.0 "), Some(7));
        assert_eq!(parse_trial("-1"), None);
        assert_eq!(parse_trial("x"), None);
    }
}
