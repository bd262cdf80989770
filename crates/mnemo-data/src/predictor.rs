//! Predictor identities and the fixed predictor catalogue
//!
//! A predictor is a `(measure, label)` pair. The label decides where the value
//! comes from:
//!
//! - a one-character label names a region (`T`, `F`): the measure is read from
//!   the trial × single-channel table aggregated per region;
//! - a longer label names a PAC direction (`TF`, `FT`, ...): the measure is read
//!   from the trial × channel-pair table aggregated per direction.
//!
//! The textual form is `measure@label`, e.g. `earlyhfa@T` or `normtspacmax@TF`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, view::ThetaBand};

/// Name of the derived between-channel PAC measure in the dominant direction.
pub const MAX_PAC_MEASURE: &str = "normtspacmax";

const WINDOWS: [&str; 3] = ["pre", "early", "late"];
const REGIONS: [&str; 2] = ["T", "F"];
const DIRECTIONS: [&str; 4] = ["TT", "TF", "FT", "FF"];

/// Where a predictor's values are aggregated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorScope {
    /// Single-channel measure aggregated per region.
    WithinChannel,
    /// Channel-pair measure aggregated per direction label.
    BetweenChannel,
}

/// An immutable `(measure, label)` predictor identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PredictorId {
    measure: String,
    label: String,
}

impl PredictorId {
    /// Creates a predictor, rejecting empty measure names or labels.
    pub fn new(measure: impl Into<String>, label: impl Into<String>) -> Result<Self, ConfigError> {
        let measure = measure.into();
        let label = label.into();
        if measure.is_empty() || label.is_empty() {
            return Err(ConfigError::InvalidPredictor {
                text: format!("{measure}@{label}"),
            });
        }
        Ok(Self { measure, label })
    }

    #[must_use]
    pub fn measure(&self) -> &str {
        &self.measure
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn scope(&self) -> PredictorScope {
        if self.label.chars().count() == 1 {
            PredictorScope::WithinChannel
        } else {
            PredictorScope::BetweenChannel
        }
    }
}

impl fmt::Display for PredictorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.measure, self.label)
    }
}

impl FromStr for PredictorId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (measure, label) = s
            .trim()
            .split_once('@')
            .ok_or_else(|| ConfigError::InvalidPredictor { text: s.to_owned() })?;
        Self::new(measure, label).map_err(|_| ConfigError::InvalidPredictor { text: s.to_owned() })
    }
}

/// A requested predictor set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictorSet {
    /// The fixed [`catalogue`].
    All,
    List(Vec<PredictorId>),
}

impl PredictorSet {
    /// Expands the set into an ordered predictor list.
    #[must_use]
    pub fn resolve(&self, band: ThetaBand) -> Vec<PredictorId> {
        match self {
            PredictorSet::All => catalogue(band),
            PredictorSet::List(list) => list.clone(),
        }
    }
}

impl FromStr for PredictorSet {
    type Err = ConfigError;

    /// Parses `all` or a comma-separated list of `measure@label` items.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(PredictorSet::All);
        }
        s.split(',')
            .filter(|item| !item.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(PredictorSet::List)
    }
}

/// The canonical predictor catalogue.
///
/// Within-channel: aperiodic slope, high-frequency activity and theta power in
/// the pre-stimulus, early and late windows, at the temporal and frontal
/// regions. Between-channel: dominant-direction PAC for every lobe pair.
#[must_use]
pub fn catalogue(band: ThetaBand) -> Vec<PredictorId> {
    let mut predictors = vec![];
    for region in REGIONS {
        for window in WINDOWS {
            predictors.push(known(format!("{window}slope"), region));
            predictors.push(known(format!("{window}hfa"), region));
            predictors.push(known(band.column(&format!("{window}theta")), region));
        }
    }
    for direction in DIRECTIONS {
        predictors.push(known(MAX_PAC_MEASURE.to_owned(), direction));
    }
    predictors
}

fn known(measure: String, label: &str) -> PredictorId {
    PredictorId {
        measure,
        label: label.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_follows_label_length() {
        let within: PredictorId = "earlyhfa@T".parse().unwrap();
        let between: PredictorId = "normtspacmax@TF".parse().unwrap();
        assert_eq!(within.scope(), PredictorScope::WithinChannel);
        assert_eq!(between.scope(), PredictorScope::BetweenChannel);
        assert_eq!(within.to_string(), "earlyhfa@T");
    }

    #[test]
    fn test_rejects_malformed_text() {
        assert!("earlyhfa".parse::<PredictorId>().is_err());
        assert!("@T".parse::<PredictorId>().is_err());
        assert!("earlyhfa@".parse::<PredictorId>().is_err());
    }

    #[test]
    fn test_catalogue_is_unique_and_band_specific() {
        let cf = catalogue(ThetaBand::Individualized);
        let unique = cf.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(unique.len(), cf.len());
        assert_eq!(cf.len(), 22);
        assert!(cf.iter().any(|p| p.measure() == "latetheta_cf"));
        assert!(
            catalogue(ThetaBand::Canonical)
                .iter()
                .any(|p| p.measure() == "latetheta_canon")
        );
    }

    #[test]
    fn test_parse_predictor_list() {
        let set: PredictorSet = "earlyhfa@T, latetheta_cf@F".parse().unwrap();
        let PredictorSet::List(list) = set else {
            panic!("expected a list");
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].label(), "F");
        assert_eq!("ALL".parse::<PredictorSet>().unwrap(), PredictorSet::All);
    }
}
