#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row types for the employer geocoding pipeline.
//!
//! These types represent the shapes of data as read from the employer
//! source table, as written to the geocoded target table, and as recorded
//! in the audit log.

use std::fmt;

use chrono::NaiveDate;

/// A schema-qualified table name.
///
/// Both parts are restricted to plain SQL identifiers so they can be
/// interpolated into query text safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Schema (namespace) name.
    pub schema: String,
    /// Table name within the schema.
    pub table: String,
}

impl TableRef {
    /// Creates a table reference, returning `None` if either part is not a
    /// plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
    #[must_use]
    pub fn new(schema: &str, table: &str) -> Option<Self> {
        (is_identifier(schema) && is_identifier(table)).then(|| Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Returns the `schema.table` form used in SQL.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Returns `true` if `s` is a plain SQL identifier.
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One employer row from the upstream source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Employer identifier, unique within an edition date.
    pub id: String,
    /// Street address line.
    pub street: String,
    /// City name.
    pub city: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// ZIP code, if present.
    pub zip: Option<String>,
    /// Edition / reporting period this row belongs to.
    pub date: NaiveDate,
}

/// A geocoded employer row as written to the target table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedRecord {
    /// Employer identifier.
    pub id: String,
    /// Edition date carried over from the source row.
    pub date: NaiveDate,
    /// Geocoder match type (`Exact`, `Non_Exact`), `None` when unmatched.
    pub match_type: Option<String>,
    /// 15-character census block GEOID.
    pub block_geoid: Option<String>,
    /// Point geometry in WGS84, longitude/latitude order.
    pub geom: Option<geo::Point<f64>>,
}

impl GeocodedRecord {
    /// Column names of the target table, in order.
    pub const COLUMNS: &[&str] = &["id", "date", "match_type", "block_geoid", "geom"];
}

/// A provenance entry describing one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Unique identifier for the run.
    pub run_id: String,
    /// Logical table name (e.g. `"employers_geo"`).
    pub table_name: String,
    /// Schema namespace the data is written under.
    pub schema_name: String,
    /// Edition date the run processed.
    pub edition_date: NaiveDate,
    /// Identity of the producing process.
    pub source_file: String,
    /// JSON description of the validation schema.
    pub schema_descriptor: String,
    /// JSON copy of the catalog entry for this edition.
    pub edition_metadata: String,
    /// Number of validated rows.
    pub row_count: u64,
    /// Column names of the validated dataset.
    pub columns: Vec<String>,
    /// Hex SHA-256 digest over the validated rows, in order.
    pub lineage_digest: String,
    /// Whether the data write was skipped.
    pub metadata_only: bool,
    /// RFC 3339 UTC timestamp of the recording.
    pub recorded_at: String,
}
