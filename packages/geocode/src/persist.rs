//! Appends validated rows to the target table.

use milmi_database::{DbError, EmployerStore};
use milmi_database_models::TableRef;

use crate::schema::ValidatedDataset;

/// What the persister did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Metadata-only run; nothing was written.
    Skipped,
    /// Rows appended to the target table.
    Appended(u64),
}

/// Appends `dataset` to `target` unless `metadata_only` is set.
///
/// Rows are only ever appended. Duplicate protection is the delta
/// selector's job.
///
/// # Errors
///
/// Returns [`DbError`] if the append fails; the store rolls it back.
pub fn persist(
    store: &dyn EmployerStore,
    target: &TableRef,
    dataset: &ValidatedDataset,
    metadata_only: bool,
) -> Result<PersistOutcome, DbError> {
    if metadata_only {
        log::info!(
            "Metadata-only run: skipping write of {} row(s) to {target}",
            dataset.len()
        );
        return Ok(PersistOutcome::Skipped);
    }

    let written = store.append_geocoded(target, dataset.records())?;
    log::info!("Appended {written} row(s) to {target}");
    Ok(PersistOutcome::Appended(written))
}

#[cfg(test)]
mod tests {
    use milmi_database::db;
    use milmi_database::employers::DuckDbStore;
    use milmi_database_models::GeocodedRecord;

    use super::*;
    use crate::schema::{employer_geo_schema, validate_geocoded};
    use crate::testing::date;

    fn dataset() -> ValidatedDataset {
        let records = vec![GeocodedRecord {
            id: "1".to_string(),
            date: date("2025-02-10"),
            match_type: None,
            block_geoid: None,
            geom: None,
        }];
        validate_geocoded(&employer_geo_schema(), &records).unwrap()
    }

    fn target() -> TableRef {
        TableRef::new("milmi", "employers_geo").unwrap()
    }

    #[test]
    fn appends_rows() {
        let store = DuckDbStore::new(db::open_in_memory().unwrap());
        let outcome = persist(&store, &target(), &dataset(), false).unwrap();
        assert_eq!(outcome, PersistOutcome::Appended(1));
        assert_eq!(store.count_rows(&target()).unwrap(), 1);
    }

    #[test]
    fn metadata_only_writes_nothing() {
        let store = DuckDbStore::new(db::open_in_memory().unwrap());
        let outcome = persist(&store, &target(), &dataset(), true).unwrap();
        assert_eq!(outcome, PersistOutcome::Skipped);
        assert!(!store.table_exists(&target()).unwrap());
    }
}
