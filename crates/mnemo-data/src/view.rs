//! Per-subject filtered and derived views over the feature store
//!
//! A [`SubjectView`] is built from a [`FeatureStore`] and a [`ViewConfig`] by a
//! fixed sequence of stages, each applied to all four tables in lockstep:
//!
//! 1. **Subject**: keep rows of the selected subject (or all subjects)
//! 2. **Region**: keep or drop rows by the region/lobe of every channel side
//! 3. **Theta**: detect theta channels, stamp theta flags, optionally enforce or
//!    exclude them
//! 4. **Phase**: stamp phase-encoding flags on pairs, optionally enforce them
//! 5. **Direction**: derive the dominant between-channel PAC value and direction
//!    label of every trial × pair row
//! 6. **Columns**: drop the columns of the frequency band variant not in use
//!
//! The order is part of the contract: theta channels are only detected among
//! in-scope channels, and phase flags are evaluated on the pair population left
//! by the theta stage.
//!
//! # Example
//!
//! ```
//! use mnemo_data::view::{RegionFilter, SubjectSelector, ThetaPolicy, ViewConfig};
//!
//! let config = ViewConfig {
//!     subject: SubjectSelector::One("R1020J".into()),
//!     regions: RegionFilter::exclude(["N"]),
//!     enforce_theta: true,
//!     theta_policy: ThetaPolicy::PValue,
//!     theta_level: Some(0.05),
//!     ..ViewConfig::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! let conflicting = ViewConfig {
//!     exclude_theta: true,
//!     ..config
//! };
//! assert!(conflicting.validate().is_err());
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, DataShapeError, ViewError},
    predictor::MAX_PAC_MEASURE,
    store::FeatureStore,
    table::{MeasurementTable, PairSite, Site, TableKind, TableSet},
};

/// Column holding the p-value of post-stimulus theta power per channel.
pub const THETA_PVALUE_COLUMN: &str = "pvalposttheta";
/// Column holding post-stimulus theta power per trial and channel.
pub const THETA_POWER_COLUMN: &str = "posttheta";
/// Column flagging a theta bump in the trial-averaged spectrum per channel.
pub const THETA_BUMP_COLUMN: &str = "thetabump";

/// Which subjects a view covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubjectSelector {
    #[default]
    All,
    One(String),
}

impl SubjectSelector {
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        match self {
            SubjectSelector::All => true,
            SubjectSelector::One(id) => id == subject,
        }
    }
}

impl fmt::Display for SubjectSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectSelector::All => f.write_str("all"),
            SubjectSelector::One(id) => f.write_str(id),
        }
    }
}

impl FromStr for SubjectSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "all" {
            SubjectSelector::All
        } else {
            SubjectSelector::One(s.to_owned())
        })
    }
}

/// Region/lobe inclusion policy.
///
/// A label matches a channel side when it equals the side's region or lobe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegionFilter {
    #[default]
    None,
    /// A row survives only if every channel side matches one of the labels.
    Include(BTreeSet<String>),
    /// A row is dropped if any channel side matches one of the labels.
    Exclude(BTreeSet<String>),
}

impl RegionFilter {
    pub fn include<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegionFilter::Include(labels.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegionFilter::Exclude(labels.into_iter().map(Into::into).collect())
    }
}

/// How theta-positive channels are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThetaPolicy {
    /// Channel's theta p-value is below the threshold level.
    PValue,
    /// Fraction of the subject's trials with positive theta power exceeds the level.
    Percent,
    /// Trial-averaged spectrum shows a theta bump.
    #[default]
    Bump,
}

impl ThetaPolicy {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ThetaPolicy::PValue => "pval",
            ThetaPolicy::Percent => "percent",
            ThetaPolicy::Bump => "bump",
        }
    }
}

impl fmt::Display for ThetaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThetaPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pval" => Ok(ThetaPolicy::PValue),
            "percent" => Ok(ThetaPolicy::Percent),
            "bump" => Ok(ThetaPolicy::Bump),
            _ => Err(ConfigError::UnknownThetaPolicy { name: s.to_owned() }),
        }
    }
}

/// Individualized (`cf`) or canonical (`canon`) theta frequency bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThetaBand {
    #[default]
    Individualized,
    Canonical,
}

impl ThetaBand {
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            ThetaBand::Individualized => "cf",
            ThetaBand::Canonical => "canon",
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            ThetaBand::Individualized => ThetaBand::Canonical,
            ThetaBand::Canonical => ThetaBand::Individualized,
        }
    }

    /// Band-specific column name, e.g. `encodingepisodes_cf`.
    #[must_use]
    pub fn column(self, base: &str) -> String {
        format!("{base}_{}", self.suffix())
    }

    /// Whether `column` belongs to this band variant.
    #[must_use]
    pub fn owns_column(self, column: &str) -> bool {
        column.contains(&format!("_{}", self.suffix()))
    }
}

impl fmt::Display for ThetaBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for ThetaBand {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cf" => Ok(ThetaBand::Individualized),
            "canon" => Ok(ThetaBand::Canonical),
            _ => Err(ConfigError::UnknownThetaBand { name: s.to_owned() }),
        }
    }
}

/// Inclusion policy of a [`SubjectView`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewConfig {
    pub subject: SubjectSelector,
    pub regions: RegionFilter,
    /// Keep only theta channels and pairs whose both channels show theta.
    pub enforce_theta: bool,
    /// Keep only channels and pairs without theta.
    pub exclude_theta: bool,
    /// Keep only phase-encoding pairs.
    pub enforce_phase: bool,
    pub theta_policy: ThetaPolicy,
    /// Threshold for [`ThetaPolicy::PValue`] and [`ThetaPolicy::Percent`].
    pub theta_level: Option<f64>,
    pub band: ThetaBand,
}

impl ViewConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enforce_theta && self.exclude_theta {
            return Err(ConfigError::ConflictingThetaFilters);
        }
        if matches!(self.theta_policy, ThetaPolicy::PValue | ThetaPolicy::Percent)
            && self.theta_level.is_none()
        {
            return Err(ConfigError::MissingThetaLevel {
                policy: self.theta_policy.to_string(),
            });
        }
        if let RegionFilter::Include(labels) | RegionFilter::Exclude(labels) = &self.regions
            && labels.is_empty()
        {
            return Err(ConfigError::EmptyRegionFilter);
        }
        Ok(())
    }
}

/// Identity of a channel within the whole store.
type ChannelKey = (String, String);
/// Identity of a channel pair within the whole store.
type PairKey = (String, String);

/// Filtered and derived tables for one subject scope and inclusion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectView {
    config: ViewConfig,
    tables: TableSet,
}

impl SubjectView {
    /// Runs the filter/derive pipeline over the store.
    ///
    /// The store is only read; every stage produces new tables.
    pub fn new(store: &FeatureStore, config: ViewConfig) -> Result<Self, ViewError> {
        config.validate()?;

        let tables = store
            .tables()
            .map_ref(|table| table.filtered(|r| config.subject.matches(&r.subject)));
        let tables = filter_regions(tables, &config.regions);
        let tables = apply_theta(tables, &config)?;
        let tables = apply_phase(tables, &config)?;
        let tables = TableSet {
            trial_pair: derive_pac_direction(tables.trial_pair, config.band)?,
            ..tables
        };
        let other_band = config.band.other();
        let tables = tables.map(|table| table.retain_columns(|c| !other_band.owns_column(c)));

        tracing::debug!(
            subject = %config.subject,
            channels = tables.channel.len(),
            trial_channels = tables.trial_channel.len(),
            pairs = tables.pair.len(),
            trial_pairs = tables.trial_pair.len(),
            "subject view built"
        );
        Ok(Self { config, tables })
    }

    #[must_use]
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, kind: TableKind) -> &MeasurementTable {
        self.tables.get(kind)
    }

    #[must_use]
    pub fn channel(&self) -> &MeasurementTable {
        &self.tables.channel
    }

    #[must_use]
    pub fn trial_channel(&self) -> &MeasurementTable {
        &self.tables.trial_channel
    }

    #[must_use]
    pub fn pair(&self) -> &MeasurementTable {
        &self.tables.pair
    }

    #[must_use]
    pub fn trial_pair(&self) -> &MeasurementTable {
        &self.tables.trial_pair
    }

    /// Subjects with at least one row in any table.
    #[must_use]
    pub fn subjects(&self) -> BTreeSet<&str> {
        self.tables
            .iter()
            .flat_map(MeasurementTable::records)
            .map(|r| r.subject.as_str())
            .collect()
    }
}

fn filter_regions(tables: TableSet, regions: &RegionFilter) -> TableSet {
    match regions {
        RegionFilter::None => tables,
        RegionFilter::Include(labels) => tables.map(|table| {
            table.retain(|r| {
                r.site
                    .sides()
                    .all(|side| labels.iter().any(|l| side.has_label(l)))
            })
        }),
        RegionFilter::Exclude(labels) => tables.map(|table| {
            table.retain(|r| {
                !r.site
                    .sides()
                    .any(|side| labels.iter().any(|l| side.has_label(l)))
            })
        }),
    }
}

fn apply_theta(tables: TableSet, config: &ViewConfig) -> Result<TableSet, DataShapeError> {
    let theta_channels = detect_theta_channels(&tables, config)?;
    let tables = tables.map(|table| {
        table.update_sites(|subject, site| {
            for side in site.sides_mut() {
                side.theta = theta_channels.contains(&(subject.to_owned(), side.channel.clone()));
            }
        })
    });

    let tables = if config.enforce_theta {
        tables.map(|table| table.retain(|r| r.site.theta_flag() == r.site.side_count()))
    } else if config.exclude_theta {
        tables.map(|table| table.retain(|r| r.site.theta_flag() == 0))
    } else {
        tables
    };
    Ok(tables)
}

/// Theta-positive channels among the in-scope single-channel rows.
fn detect_theta_channels(
    tables: &TableSet,
    config: &ViewConfig,
) -> Result<BTreeSet<ChannelKey>, DataShapeError> {
    let level = config.theta_level.unwrap_or(f64::NAN);
    let channels = &tables.channel;
    let key = |subject: &str, site: &Site| -> Option<ChannelKey> {
        match site {
            Site::Channel(c) => Some((subject.to_owned(), c.channel.clone())),
            Site::Pair(_) => None,
        }
    };

    let detected = match config.theta_policy {
        ThetaPolicy::PValue => {
            let idx = channels.require_column(THETA_PVALUE_COLUMN)?;
            channels
                .records()
                .iter()
                .filter(|r| r.values[idx] < level)
                .filter_map(|r| key(&r.subject, &r.site))
                .collect()
        }
        ThetaPolicy::Bump => {
            let idx = channels.require_column(THETA_BUMP_COLUMN)?;
            channels
                .records()
                .iter()
                .filter(|r| (r.values[idx] - 1.0).abs() < f64::EPSILON)
                .filter_map(|r| key(&r.subject, &r.site))
                .collect()
        }
        ThetaPolicy::Percent => {
            let trials = &tables.trial_channel;
            let idx = trials.require_column(THETA_POWER_COLUMN)?;
            let mut trials_per_subject = BTreeMap::<&str, BTreeSet<u32>>::new();
            let mut theta_trials = BTreeMap::<ChannelKey, usize>::new();
            for record in trials.records() {
                if let Some(trial) = record.trial {
                    trials_per_subject
                        .entry(record.subject.as_str())
                        .or_default()
                        .insert(trial);
                }
                if record.values[idx] > 0.0
                    && let Some(k) = key(&record.subject, &record.site)
                {
                    *theta_trials.entry(k).or_default() += 1;
                }
            }
            channels
                .records()
                .iter()
                .filter_map(|r| key(&r.subject, &r.site))
                .filter(|k| {
                    let n_trials = trials_per_subject.get(k.0.as_str()).map_or(0, BTreeSet::len);
                    let n_theta = theta_trials.get(k).copied().unwrap_or(0);
                    #[expect(clippy::cast_precision_loss)]
                    let fraction = if n_trials == 0 {
                        0.0
                    } else {
                        n_theta as f64 / n_trials as f64
                    };
                    fraction > level
                })
                .collect()
        }
    };
    Ok(detected)
}

fn apply_phase(tables: TableSet, config: &ViewConfig) -> Result<TableSet, DataShapeError> {
    let episodes = config.band.column("encodingepisodes");
    let idx = tables.pair.require_column(&episodes)?;
    let phase_pairs = tables
        .pair
        .records()
        .iter()
        .filter(|r| r.values[idx] > 0.0)
        .filter_map(|r| {
            r.site
                .as_pair()
                .map(|p| (r.subject.clone(), p.pair.clone()))
        })
        .collect::<BTreeSet<PairKey>>();

    let stamp = |table: MeasurementTable| {
        table.update_sites(|subject, site| {
            if let Site::Pair(pair) = site {
                pair.phase_encoding = phase_pairs.contains(&(subject.to_owned(), pair.pair.clone()));
            }
        })
    };
    let enforce = |table: MeasurementTable| {
        if config.enforce_phase {
            table.retain(|r| r.site.as_pair().is_some_and(|p| p.phase_encoding))
        } else {
            table
        }
    };
    Ok(TableSet {
        pair: enforce(stamp(tables.pair)),
        trial_pair: enforce(stamp(tables.trial_pair)),
        ..tables
    })
}

fn derive_pac_direction(
    table: MeasurementTable,
    band: ThetaBand,
) -> Result<MeasurementTable, DataShapeError> {
    let ab = table.require_column(&band.column("normtspacAB"))?;
    let ba = table.require_column(&band.column("normtspacBA"))?;
    Ok(table.with_derived_column(MAX_PAC_MEASURE, |record| {
        let Site::Pair(pair) = &record.site else {
            return f64::NAN;
        };
        let (value, direction) = dominant_pac(pair, record.values[ab], record.values[ba]);
        record.direction = Some(direction);
        value
    }))
}

/// Dominant-direction PAC value and direction label of one trial × pair row.
///
/// The label concatenates the lobes of both channels, A first when A→B PAC is
/// strictly larger and B first otherwise. The value is `NaN` when either
/// direction is missing.
///
/// # Examples
///
/// ```
/// use mnemo_data::{
///     table::{ChannelSite, PairSite},
///     view::dominant_pac,
/// };
///
/// let pair = PairSite {
///     pair: "LA1-LF3".into(),
///     a: ChannelSite::new("LA1", "T", "T"),
///     b: ChannelSite::new("LF3", "F", "F"),
///     phase_encoding: false,
/// };
/// assert_eq!(dominant_pac(&pair, 0.8, 0.2), (0.8, "TF".to_owned()));
/// assert_eq!(dominant_pac(&pair, 0.1, 0.3), (0.3, "FT".to_owned()));
/// ```
#[must_use]
pub fn dominant_pac(pair: &PairSite, ab: f64, ba: f64) -> (f64, String) {
    let value = if ab.is_nan() || ba.is_nan() {
        f64::NAN
    } else {
        ab.max(ba)
    };
    let direction = if ab > ba {
        format!("{}{}", pair.a.lobe, pair.b.lobe)
    } else {
        format!("{}{}", pair.b.lobe, pair.a.lobe)
    };
    (value, direction)
}
