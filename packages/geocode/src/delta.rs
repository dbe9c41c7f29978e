//! Chooses which source records still need geocoding.

use milmi_database::employers::{all_records_query, new_records_query};
use milmi_database::{DbError, EmployerStore};
use milmi_database_models::{SourceRecord, TableRef};
use strum::{AsRefStr, Display};

/// How the delta was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SelectionMode {
    /// Target table did not exist yet; every source record was selected.
    Full,
    /// Source records were anti-joined against the target on `(id, date)`.
    Incremental,
}

/// Records selected for geocoding.
#[derive(Debug, Clone)]
pub struct DeltaSelection {
    /// Selected records, ordered by `(date, id)`.
    pub records: Vec<SourceRecord>,
    /// Which query path produced them.
    pub mode: SelectionMode,
}

/// Returns the source records that have no geocoded counterpart.
///
/// A missing target table is detected up front and answered with the
/// select-all query. Any query failure is returned as-is.
///
/// # Errors
///
/// Returns [`DbError`] if the existence check or the selection query fails.
pub fn select_delta(
    store: &dyn EmployerStore,
    source: &TableRef,
    target: &TableRef,
) -> Result<DeltaSelection, DbError> {
    let (mode, sql) = if store.table_exists(target)? {
        (SelectionMode::Incremental, new_records_query(source, target))
    } else {
        log::info!("{target} does not exist yet, selecting every record in {source}");
        (SelectionMode::Full, all_records_query(source))
    };

    let records = store.query_source_records(&sql)?;
    log::info!(
        "Selected {} record(s) from {source} for geocoding ({mode})",
        records.len()
    );

    Ok(DeltaSelection { records, mode })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use milmi_database::db;
    use milmi_database::employers::DuckDbStore;
    use milmi_database_models::GeocodedRecord;

    use super::*;

    fn source() -> TableRef {
        TableRef::new("milmi", "employers").unwrap()
    }

    fn target() -> TableRef {
        TableRef::new("milmi", "employers_geo").unwrap()
    }

    fn store() -> DuckDbStore {
        let store = DuckDbStore::new(db::open_in_memory().unwrap());
        store.ensure_source_table(&source()).unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO milmi.employers VALUES
                    ('1', '1 A St', 'Lansing', 'MI', '48933', DATE '2025-02-10'),
                    ('2', '2 B St', 'Lansing', 'MI', '48933', DATE '2025-02-10');",
            )
            .unwrap();
        store
    }

    fn as_geocoded(records: &[SourceRecord]) -> Vec<GeocodedRecord> {
        records
            .iter()
            .map(|r| GeocodedRecord {
                id: r.id.clone(),
                date: r.date,
                match_type: None,
                block_geoid: None,
                geom: None,
            })
            .collect()
    }

    #[test]
    fn first_run_selects_everything() {
        let store = store();
        let selection = select_delta(&store, &source(), &target()).unwrap();
        assert_eq!(selection.mode, SelectionMode::Full);
        assert_eq!(selection.records.len(), 2);
    }

    #[test]
    fn second_selection_after_persist_is_empty() {
        let store = store();
        let first = select_delta(&store, &source(), &target()).unwrap();
        store
            .append_geocoded(&target(), &as_geocoded(&first.records))
            .unwrap();

        let second = select_delta(&store, &source(), &target()).unwrap();
        assert_eq!(second.mode, SelectionMode::Incremental);
        assert!(second.records.is_empty());
    }

    #[test]
    fn new_edition_rows_are_selected() {
        let store = store();
        let first = select_delta(&store, &source(), &target()).unwrap();
        store
            .append_geocoded(&target(), &as_geocoded(&first.records))
            .unwrap();

        store
            .connection()
            .execute_batch(
                "INSERT INTO milmi.employers VALUES
                    ('1', '1 A St', 'Lansing', 'MI', '48933', DATE '2025-03-10');",
            )
            .unwrap();

        let delta = select_delta(&store, &source(), &target()).unwrap();
        assert_eq!(delta.records.len(), 1);
        assert_eq!(delta.records[0].id, "1");
        assert_eq!(
            delta.records[0].date,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
    }

    #[test]
    fn missing_source_table_is_fatal() {
        let store = DuckDbStore::new(db::open_in_memory().unwrap());
        assert!(select_delta(&store, &source(), &target()).is_err());
    }
}
