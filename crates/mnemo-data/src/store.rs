//! The immutable collection of raw measurement tables

use std::{collections::BTreeSet, path::Path};

use crate::{
    error::LoadError,
    source,
    table::{MeasurementTable, TableKind, TableSet},
};

/// All four raw measurement tables of a dataset.
///
/// Read-only once built; [`SubjectView`](crate::view::SubjectView)s borrow it
/// and produce their own tables.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStore {
    tables: TableSet,
}

impl FeatureStore {
    #[must_use]
    pub fn from_tables(tables: TableSet) -> Self {
        Self { tables }
    }

    /// Reads the four tables from their conventional file names in `dir`.
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        let read = |kind: TableKind| source::read_table(kind, &dir.join(kind.file_name()));
        let tables = TableSet::new(
            read(TableKind::Channel)?,
            read(TableKind::TrialChannel)?,
            read(TableKind::Pair)?,
            read(TableKind::TrialPair)?,
        )?;
        let store = Self { tables };
        tracing::info!(
            dir = %dir.display(),
            subjects = store.subjects().len(),
            channels = store.tables.channel.len(),
            trial_pairs = store.tables.trial_pair.len(),
            "feature store loaded"
        );
        Ok(store)
    }

    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, kind: TableKind) -> &MeasurementTable {
        self.tables.get(kind)
    }

    /// Subject identifiers present in the single-channel table, sorted.
    #[must_use]
    pub fn subjects(&self) -> Vec<String> {
        self.tables
            .channel
            .records()
            .iter()
            .map(|r| r.subject.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_sorted_and_unique() {
        let store = testing::synthetic_store();
        assert_eq!(store.subjects(), ["S1", "S2"]);
    }

    #[test]
    fn test_empty_store_has_no_subjects() {
        let table = |kind| MeasurementTable::new(kind, vec![]);
        let tables = TableSet::new(
            table(TableKind::Channel),
            table(TableKind::TrialChannel),
            table(TableKind::Pair),
            table(TableKind::TrialPair),
        )
        .unwrap();
        assert!(FeatureStore::from_tables(tables).subjects().is_empty());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = std::env::temp_dir().join("mnemo-store-missing-dir");
        assert!(matches!(
            FeatureStore::load(&dir),
            Err(LoadError::Open {
                kind: TableKind::Channel,
                ..
            })
        ));
    }
}
