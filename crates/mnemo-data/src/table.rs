//! Measurement tables keyed by subject, trial and channel sites
//!
//! A [`MeasurementTable`] holds one of the four raw table kinds ([`TableKind`]):
//!
//! ```text
//! Channel        subject, channel            (one row per subject × channel)
//! TrialChannel   subject, trial, channel     (one row per subject × trial × channel)
//! Pair           subject, pair (A, B)        (one row per subject × pair)
//! TrialPair      subject, trial, pair (A, B) (one row per subject × trial × pair)
//! ```
//!
//! Key columns are typed ([`Record::subject`], [`Record::trial`], [`Record::site`]);
//! every other column is a named numeric measure stored in [`Record::values`],
//! with `NaN` marking a missing measurement.
//!
//! Tables are never edited in place by the filter pipeline: every filter or
//! derivation consumes a table and returns a new one, or borrows a table and
//! returns a filtered copy.

use std::iter;

use serde::{Deserialize, Serialize};

use crate::error::DataShapeError;

/// The four raw table kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
pub enum TableKind {
    #[display("single-channel")]
    Channel,
    #[display("trial x single-channel")]
    TrialChannel,
    #[display("channel-pair")]
    Pair,
    #[display("trial x channel-pair")]
    TrialPair,
}

/// Names of the key columns describing one channel side of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideColumns {
    pub channel: &'static str,
    pub region: &'static str,
    pub lobe: &'static str,
}

const SINGLE_SIDE: [SideColumns; 1] = [SideColumns {
    channel: "channel",
    region: "region",
    lobe: "lobe",
}];

const PAIR_SIDES: [SideColumns; 2] = [
    SideColumns {
        channel: "channelA",
        region: "regionA",
        lobe: "lobeA",
    },
    SideColumns {
        channel: "channelB",
        region: "regionB",
        lobe: "lobeB",
    },
];

impl TableKind {
    pub const ALL: [TableKind; 4] = [
        TableKind::Channel,
        TableKind::TrialChannel,
        TableKind::Pair,
        TableKind::TrialPair,
    ];

    /// Whether rows of this kind are keyed by trial.
    #[must_use]
    pub const fn has_trial(self) -> bool {
        matches!(self, TableKind::TrialChannel | TableKind::TrialPair)
    }

    /// Whether rows of this kind describe channel pairs.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(self, TableKind::Pair | TableKind::TrialPair)
    }

    /// Channel-bearing key columns of this kind, one entry per channel side.
    #[must_use]
    pub const fn sides(self) -> &'static [SideColumns] {
        if self.is_pair() {
            &PAIR_SIDES
        } else {
            &SINGLE_SIDE
        }
    }

    /// Conventional file name of this table inside a data directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            TableKind::Channel => "kah_singlechannel.csv",
            TableKind::TrialChannel => "kah_singletrial_singlechannel.csv",
            TableKind::Pair => "kah_multichannel.csv",
            TableKind::TrialPair => "kah_singletrial_multichannel.csv",
        }
    }
}

/// One channel of one subject, as seen from a table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSite {
    pub channel: String,
    pub region: String,
    pub lobe: String,
    /// Derived: channel shows a theta oscillation under the view's detection policy.
    #[serde(default)]
    pub theta: bool,
}

impl ChannelSite {
    #[must_use]
    pub fn new(channel: impl Into<String>, region: impl Into<String>, lobe: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            region: region.into(),
            lobe: lobe.into(),
            theta: false,
        }
    }

    /// Whether `label` names either this channel's region or its lobe.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.region == label || self.lobe == label
    }
}

/// An ordered channel pair (A, B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSite {
    pub pair: String,
    pub a: ChannelSite,
    pub b: ChannelSite,
    /// Derived: pair shows phase-locked encoding episodes.
    #[serde(default)]
    pub phase_encoding: bool,
}

/// The channel identity of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Site {
    Channel(ChannelSite),
    Pair(PairSite),
}

impl Site {
    /// Channel sides of this site (one for a channel, two for a pair).
    pub fn sides(&self) -> impl Iterator<Item = &ChannelSite> {
        let (first, second) = match self {
            Site::Channel(channel) => (channel, None),
            Site::Pair(pair) => (&pair.a, Some(&pair.b)),
        };
        iter::once(first).chain(second)
    }

    /// Mutable channel sides of this site.
    pub fn sides_mut(&mut self) -> impl Iterator<Item = &mut ChannelSite> {
        let (first, second) = match self {
            Site::Channel(channel) => (channel, None),
            Site::Pair(PairSite { a, b, .. }) => (a, Some(b)),
        };
        iter::once(first).chain(second)
    }

    /// Theta flag: `0`/`1` for a channel, the ternary sum `0`/`1`/`2` for a pair.
    #[must_use]
    pub fn theta_flag(&self) -> u8 {
        self.sides().map(|side| u8::from(side.theta)).sum()
    }

    /// Number of channel sides (`1` or `2`).
    #[must_use]
    pub fn side_count(&self) -> u8 {
        match self {
            Site::Channel(_) => 1,
            Site::Pair(_) => 2,
        }
    }

    #[must_use]
    pub fn as_pair(&self) -> Option<&PairSite> {
        match self {
            Site::Channel(_) => None,
            Site::Pair(pair) => Some(pair),
        }
    }
}

/// One row of a measurement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub subject: String,
    pub trial: Option<u32>,
    pub site: Site,
    /// Derived for trial × pair rows: lobe pair in the dominant PAC direction.
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(with = "crate::nan_as_null")]
    pub values: Vec<f64>,
}

/// A table of measurement rows sharing one column schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTable {
    kind: TableKind,
    columns: Vec<String>,
    records: Vec<Record>,
}

impl MeasurementTable {
    /// Creates an empty table with the given measure columns.
    #[must_use]
    pub fn new(kind: TableKind, columns: Vec<String>) -> Self {
        Self {
            kind,
            columns,
            records: vec![],
        }
    }

    /// Appends a row after checking it matches the table's kind and schema.
    pub fn push(&mut self, record: Record) -> Result<(), DataShapeError> {
        if record.values.len() != self.columns.len() {
            return Err(DataShapeError::ColumnCountMismatch {
                kind: self.kind,
                expected: self.columns.len(),
                found: record.values.len(),
            });
        }
        let site_ok = matches!(
            (&record.site, self.kind.is_pair()),
            (Site::Channel(_), false) | (Site::Pair(_), true)
        );
        if !site_ok || record.trial.is_some() != self.kind.has_trial() {
            return Err(DataShapeError::SiteMismatch { kind: self.kind });
        }
        self.records.push(record);
        Ok(())
    }

    #[must_use]
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a measure column that a computation cannot proceed without.
    pub fn require_column(&self, name: &str) -> Result<usize, DataShapeError> {
        self.column_index(name)
            .ok_or_else(|| DataShapeError::MissingColumn {
                kind: self.kind,
                column: name.to_owned(),
            })
    }

    /// Returns a copy holding only the rows for which `keep` is true.
    #[must_use]
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        Self {
            kind: self.kind,
            columns: self.columns.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Consumes the table and keeps only the rows for which `keep` is true.
    #[must_use]
    pub fn retain<F>(mut self, keep: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        self.records.retain(keep);
        self
    }

    /// Consumes the table and rewrites every row's derived key fields.
    ///
    /// `update` may only touch derived flags (theta, phase, direction); the
    /// measure values are not reachable through it.
    #[must_use]
    pub fn update_sites<F>(mut self, mut update: F) -> Self
    where
        F: FnMut(&str, &mut Site),
    {
        for record in &mut self.records {
            update(&record.subject, &mut record.site);
        }
        self
    }

    /// Consumes the table and appends (or overwrites) a derived measure column.
    #[must_use]
    pub fn with_derived_column<F>(mut self, name: &str, mut derive: F) -> Self
    where
        F: FnMut(&mut Record) -> f64,
    {
        match self.column_index(name) {
            Some(idx) => {
                for record in &mut self.records {
                    record.values[idx] = derive(record);
                }
            }
            None => {
                self.columns.push(name.to_owned());
                for record in &mut self.records {
                    let value = derive(record);
                    record.values.push(value);
                }
            }
        }
        self
    }

    /// Consumes the table and keeps only the columns for which `keep` is true.
    #[must_use]
    pub fn retain_columns<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        let mask = self.columns.iter().map(|c| keep(c)).collect::<Vec<_>>();
        let mut it = mask.iter();
        self.columns.retain(|_| *it.next().unwrap_or(&true));
        for record in &mut self.records {
            let mut it = mask.iter();
            record.values.retain(|_| *it.next().unwrap_or(&true));
        }
        self
    }
}

/// Table kinds held together, one named field per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSet {
    pub channel: MeasurementTable,
    pub trial_channel: MeasurementTable,
    pub pair: MeasurementTable,
    pub trial_pair: MeasurementTable,
}

impl TableSet {
    /// Groups four tables, checking each one sits in the field of its kind.
    pub fn new(
        channel: MeasurementTable,
        trial_channel: MeasurementTable,
        pair: MeasurementTable,
        trial_pair: MeasurementTable,
    ) -> Result<Self, DataShapeError> {
        let set = Self {
            channel,
            trial_channel,
            pair,
            trial_pair,
        };
        for kind in TableKind::ALL {
            let found = set.get(kind).kind();
            if found != kind {
                return Err(DataShapeError::KindMismatch {
                    expected: kind,
                    found,
                });
            }
        }
        Ok(set)
    }

    #[must_use]
    pub fn get(&self, kind: TableKind) -> &MeasurementTable {
        match kind {
            TableKind::Channel => &self.channel,
            TableKind::TrialChannel => &self.trial_channel,
            TableKind::Pair => &self.pair,
            TableKind::TrialPair => &self.trial_pair,
        }
    }

    /// Applies `f` to every table, producing a new set.
    #[must_use]
    pub fn map<F>(self, mut f: F) -> Self
    where
        F: FnMut(MeasurementTable) -> MeasurementTable,
    {
        Self {
            channel: f(self.channel),
            trial_channel: f(self.trial_channel),
            pair: f(self.pair),
            trial_pair: f(self.trial_pair),
        }
    }

    /// Applies `f` to every borrowed table, producing a new set.
    #[must_use]
    pub fn map_ref<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&MeasurementTable) -> MeasurementTable,
    {
        Self {
            channel: f(&self.channel),
            trial_channel: f(&self.trial_channel),
            pair: f(&self.pair),
            trial_pair: f(&self.trial_pair),
        }
    }

    /// Iterates over the tables in [`TableKind::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &MeasurementTable> {
        TableKind::ALL.into_iter().map(|kind| self.get(kind))
    }
}
