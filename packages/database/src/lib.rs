#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` storage for the employer geocoding pipeline.
//!
//! Two stores are exposed behind traits so the pipeline receives them by
//! injection:
//!
//! - [`EmployerStore`]: reads employer source rows and appends geocoded
//!   rows ([`employers::DuckDbStore`]).
//! - [`AuditStore`]: records provenance entries for each run
//!   ([`audit::DuckDbAuditStore`]).

pub mod audit;
pub mod db;
pub mod employers;
pub mod paths;

use chrono::NaiveDate;
use milmi_database_models::{AuditRecord, GeocodedRecord, SourceRecord, TableRef};

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating data directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Read/append access to the employer source and geocoded tables.
pub trait EmployerStore {
    /// Returns whether `table` exists, via schema introspection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the introspection query fails.
    fn table_exists(&self, table: &TableRef) -> Result<bool, DbError>;

    /// Runs a query returning `(id, street, city, state, zip, date)` rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    fn query_source_records(&self, sql: &str) -> Result<Vec<SourceRecord>, DbError>;

    /// Appends rows to `table`, creating it on first use. Never overwrites
    /// or upserts.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails; the append is rolled back.
    fn append_geocoded(&self, table: &TableRef, rows: &[GeocodedRecord]) -> Result<u64, DbError>;
}

/// Durable provenance log.
pub trait AuditStore {
    /// Writes one audit record and commits it before returning.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write or commit fails.
    fn record(&self, record: &AuditRecord) -> Result<(), DbError>;

    /// Returns the most recent audit record for a table edition, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn latest_for(
        &self,
        table_name: &str,
        edition_date: NaiveDate,
    ) -> Result<Option<AuditRecord>, DbError>;
}
