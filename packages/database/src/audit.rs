//! Provenance log stored in `DuckDB`.
//!
//! Every pipeline run that passes validation writes one row to
//! `metadata.audit_log` in its own committed transaction before any data
//! is appended to the target table.

use chrono::NaiveDate;
use duckdb::Connection;
use milmi_database_models::AuditRecord;

use crate::{AuditStore, DbError, db};

/// `DuckDB`-backed [`AuditStore`].
pub struct DuckDbAuditStore {
    conn: Connection,
}

impl DuckDbAuditStore {
    /// Wraps an open connection and ensures the audit schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub fn new(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the number of audit records for a table edition.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn count_for(&self, table_name: &str, edition_date: NaiveDate) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .prepare(
                "SELECT COUNT(*) FROM metadata.audit_log
                 WHERE table_name = ? AND edition_date = CAST(? AS DATE)",
            )?
            .query_row(
                duckdb::params![table_name, edition_date.to_string()],
                |row| row.get(0),
            )?;
        u64::try_from(count).map_err(|e| DbError::Conversion {
            message: format!("negative row count: {e}"),
        })
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS metadata;

        CREATE TABLE IF NOT EXISTS metadata.audit_log (
            run_id TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            schema_name TEXT NOT NULL,
            edition_date DATE NOT NULL,
            source_file TEXT NOT NULL,
            schema_descriptor TEXT NOT NULL,
            edition_metadata TEXT NOT NULL,
            row_count BIGINT NOT NULL,
            columns TEXT NOT NULL,
            lineage_digest TEXT NOT NULL,
            metadata_only BOOLEAN NOT NULL,
            recorded_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

impl AuditStore for DuckDbAuditStore {
    fn record(&self, record: &AuditRecord) -> Result<(), DbError> {
        let columns = serde_json::to_string(&record.columns)?;
        let row_count = i64::try_from(record.row_count).map_err(|e| DbError::Conversion {
            message: format!("row count out of range: {e}"),
        })?;

        db::in_transaction(&self.conn, |conn| {
            conn.execute(
                "INSERT INTO metadata.audit_log (
                    run_id, table_name, schema_name, edition_date, source_file,
                    schema_descriptor, edition_metadata, row_count, columns,
                    lineage_digest, metadata_only, recorded_at
                ) VALUES (?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?)",
                duckdb::params![
                    record.run_id,
                    record.table_name,
                    record.schema_name,
                    record.edition_date.to_string(),
                    record.source_file,
                    record.schema_descriptor,
                    record.edition_metadata,
                    row_count,
                    columns,
                    record.lineage_digest,
                    record.metadata_only,
                    record.recorded_at,
                ],
            )?;
            Ok(())
        })?;

        log::debug!(
            "Audit record {} committed for {} edition {}",
            record.run_id,
            record.table_name,
            record.edition_date
        );
        Ok(())
    }

    fn latest_for(
        &self,
        table_name: &str,
        edition_date: NaiveDate,
    ) -> Result<Option<AuditRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, table_name, schema_name, CAST(edition_date AS VARCHAR),
                    source_file, schema_descriptor, edition_metadata, row_count,
                    columns, lineage_digest, metadata_only, recorded_at
             FROM metadata.audit_log
             WHERE table_name = ? AND edition_date = CAST(? AS DATE)
             ORDER BY recorded_at DESC
             LIMIT 1",
        )?;

        let result = stmt.query_row(
            duckdb::params![table_name, edition_date.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, bool>(10)?,
                    row.get::<_, String>(11)?,
                ))
            },
        );

        let (
            run_id,
            table_name,
            schema_name,
            edition,
            source_file,
            schema_descriptor,
            edition_metadata,
            row_count,
            columns,
            lineage_digest,
            metadata_only,
            recorded_at,
        ) = match result {
            Ok(v) => v,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(DbError::DuckDb(e)),
        };

        Ok(Some(AuditRecord {
            run_id,
            table_name,
            schema_name,
            edition_date: NaiveDate::parse_from_str(&edition, "%Y-%m-%d").map_err(|e| {
                DbError::Conversion {
                    message: format!("invalid edition date {edition:?}: {e}"),
                }
            })?,
            source_file,
            schema_descriptor,
            edition_metadata,
            row_count: u64::try_from(row_count).map_err(|e| DbError::Conversion {
                message: format!("negative row count: {e}"),
            })?,
            columns: serde_json::from_str(&columns)?,
            lineage_digest,
            metadata_only,
            recorded_at,
        }))
    }
}
