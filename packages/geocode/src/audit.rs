//! Provenance recording for validated datasets.

use chrono::{NaiveDate, SecondsFormat, Utc};
use milmi_catalog::EditionEntry;
use milmi_database::{AuditStore, DbError};
use milmi_database_models::{AuditRecord, GeocodedRecord};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::schema::{TableSchema, ValidatedDataset};

/// Identity of the producing process, as stored in audit records.
pub const SOURCE_FILE: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Errors from audit recording.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The audit store rejected the write.
    #[error("Audit store error: {0}")]
    Db(#[from] DbError),

    /// The schema descriptor or edition metadata could not be encoded.
    #[error("Audit JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything an audit record describes.
#[derive(Debug, Clone, Copy)]
pub struct AuditRequest<'a> {
    /// Schema namespace the data belongs to.
    pub schema_name: &'a str,
    /// Identity of the producing process.
    pub source_file: &'a str,
    /// Logical table name.
    pub table_name: &'a str,
    /// Catalog entry for the edition.
    pub edition_metadata: &'a EditionEntry,
    /// Edition date.
    pub edition_date: NaiveDate,
    /// Schema the dataset was validated against.
    pub table_schema: &'a TableSchema,
    /// The validated dataset.
    pub dataset: &'a ValidatedDataset,
    /// Whether the data write will be skipped.
    pub metadata_only: bool,
}

/// Builds and commits one audit record.
///
/// The record is committed by the store before this returns, so callers
/// can rely on it existing before they start writing data.
///
/// # Errors
///
/// Returns [`AuditError`] if the record cannot be encoded or committed.
pub fn record_metadata(
    store: &dyn AuditStore,
    request: &AuditRequest<'_>,
) -> Result<AuditRecord, AuditError> {
    if let Some(previous) = store.latest_for(request.table_name, request.edition_date)? {
        log::info!(
            "{} edition {} was last recorded by run {} at {} ({} rows, metadata only: {})",
            request.table_name,
            request.edition_date,
            previous.run_id,
            previous.recorded_at,
            previous.row_count,
            previous.metadata_only
        );
    }

    let record = AuditRecord {
        run_id: Uuid::new_v4().to_string(),
        table_name: request.table_name.to_string(),
        schema_name: request.schema_name.to_string(),
        edition_date: request.edition_date,
        source_file: request.source_file.to_string(),
        schema_descriptor: request.table_schema.descriptor()?,
        edition_metadata: serde_json::to_string(request.edition_metadata)?,
        row_count: request.dataset.len() as u64,
        columns: request.dataset.columns().to_vec(),
        lineage_digest: lineage_digest(request.dataset.records()),
        metadata_only: request.metadata_only,
        recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    };

    store.record(&record)?;
    log::info!(
        "Recorded audit entry {} for {} edition {} ({} rows)",
        record.run_id,
        record.table_name,
        record.edition_date,
        record.row_count
    );

    Ok(record)
}

/// Hex SHA-256 over the records in order.
///
/// Each record contributes its fields separated by `0x1f` and terminated
/// by a newline; nulls are written as `\N`.
#[must_use]
pub fn lineage_digest(records: &[GeocodedRecord]) -> String {
    let mut hasher = Sha256::new();

    for record in records {
        let date = record.date.format("%Y-%m-%d").to_string();
        let geom = record.geom.map(|p| format!("{} {}", p.x(), p.y()));
        let fields = [
            Some(record.id.as_str()),
            Some(date.as_str()),
            record.match_type.as_deref(),
            record.block_geoid.as_deref(),
            geom.as_deref(),
        ];

        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(field.unwrap_or("\\N").as_bytes());
        }
        hasher.update(b"\n");
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use milmi_database::audit::DuckDbAuditStore;
    use milmi_database::db;

    use super::*;
    use crate::schema::{employer_geo_schema, validate_geocoded};
    use crate::testing::date;

    fn records() -> Vec<GeocodedRecord> {
        vec![
            GeocodedRecord {
                id: "1".to_string(),
                date: date("2025-02-10"),
                match_type: Some("Exact".to_string()),
                block_geoid: Some("260650000010002".to_string()),
                geom: Some(geo::Point::new(-84.555, 42.733)),
            },
            GeocodedRecord {
                id: "2".to_string(),
                date: date("2025-02-10"),
                match_type: None,
                block_geoid: None,
                geom: None,
            },
        ]
    }

    fn entry() -> EditionEntry {
        EditionEntry {
            raw_path: "raw/employers.xlsx".to_string(),
            description: None,
            source_url: None,
            published: None,
            extra: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn digest_depends_on_content_and_order() {
        let forward = records();
        let mut reversed = records();
        reversed.reverse();
        let mut changed = records();
        changed[1].match_type = Some(String::new());

        let digest = lineage_digest(&forward);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, lineage_digest(&records()));
        assert_ne!(digest, lineage_digest(&reversed));
        assert_ne!(digest, lineage_digest(&changed));
    }

    #[test]
    fn records_and_commits_provenance() {
        let store = DuckDbAuditStore::new(db::open_in_memory().unwrap()).unwrap();
        let schema = employer_geo_schema();
        let dataset = validate_geocoded(&schema, &records()).unwrap();
        let entry = entry();
        let request = AuditRequest {
            schema_name: "milmi",
            source_file: SOURCE_FILE,
            table_name: "employers_geo",
            edition_metadata: &entry,
            edition_date: date("2025-02-10"),
            table_schema: &schema,
            dataset: &dataset,
            metadata_only: true,
        };

        let first = record_metadata(&store, &request).unwrap();
        assert_eq!(first.row_count, 2);
        assert_eq!(first.columns, GeocodedRecord::COLUMNS);
        assert_eq!(first.lineage_digest, lineage_digest(dataset.records()));
        assert!(first.metadata_only);
        assert!(first.source_file.starts_with("milmi_geocode "));
        assert!(first.edition_metadata.contains("raw/employers.xlsx"));

        let second = record_metadata(&store, &request).unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(
            store.count_for("employers_geo", date("2025-02-10")).unwrap(),
            2
        );
        assert_eq!(
            store
                .latest_for("employers_geo", date("2025-02-10"))
                .unwrap()
                .map(|r| r.run_id),
            Some(second.run_id)
        );
    }
}
