#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Edition catalog for the employer tables.
//!
//! The catalog is a `metadata.toml` file listing, for each table, the
//! editions that have been released and where their raw data came from.
//! Pipelines look up their edition with [`Catalog::edition_config`] and
//! refuse to run for editions the catalog does not know about.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use milmi_database_models::TableRef;
use serde::{Deserialize, Serialize};

/// Default catalog file name, relative to the working directory.
pub const DEFAULT_CATALOG_PATH: &str = "metadata.toml";

/// Errors from catalog loading and lookups.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The catalog is not valid TOML for the expected shape.
    #[error("Invalid catalog TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// The table is not listed in the catalog.
    #[error("Table {0:?} is not in the catalog")]
    UnknownTable(String),

    /// The edition is not listed under the table.
    #[error("Edition {edition} of table {table:?} is not in the catalog")]
    UnknownEdition {
        /// Table name.
        table: String,
        /// Requested edition date.
        edition: NaiveDate,
    },

    /// An edition date string could not be parsed.
    #[error("Invalid edition date {value:?} (expected YYYY-MM-DD): {source}")]
    InvalidDate {
        /// The offending value.
        value: String,
        /// Parse failure.
        source: chrono::ParseError,
    },

    /// A schema or table name is not a plain SQL identifier.
    #[error("Invalid identifier {0:?} in catalog")]
    InvalidIdentifier(String),
}

/// Top-level catalog document.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    /// Default schema namespace for all tables.
    pub schema: String,
    /// Table entries keyed by table name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableEntry>,
}

/// Catalog entry for one table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableEntry {
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Schema override for this table.
    #[serde(default)]
    pub schema: Option<String>,
    /// Upstream table this one is derived from, if any.
    #[serde(default)]
    pub source_table: Option<String>,
    /// Released editions keyed by `YYYY-MM-DD`.
    #[serde(default)]
    pub editions: BTreeMap<String, EditionEntry>,
}

/// Descriptor for one released edition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EditionEntry {
    /// Path of the raw file the edition was loaded from.
    pub raw_path: String,
    /// Free-form notes about the edition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where the raw file was downloaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Publication date of the edition (`"YYYY-MM-DD"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
    /// Any additional keys, carried through to the audit record.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// Resolved configuration for one table edition.
#[derive(Debug, Clone, PartialEq)]
pub struct EditionConfig {
    /// Logical table name.
    pub table_name: String,
    /// Edition date.
    pub edition_date: NaiveDate,
    /// Schema namespace the table lives in.
    pub schema: String,
    /// Raw file path from the edition entry.
    pub raw_path: String,
    /// Fully qualified table this pipeline writes.
    pub target: TableRef,
    /// Fully qualified upstream table, if the table is derived.
    pub source: Option<TableRef>,
    /// The catalog entry as written.
    pub entry: EditionEntry,
}

impl Catalog {
    /// Parses a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Toml`] if the text does not match the
    /// catalog shape.
    pub fn from_toml_str(s: &str) -> Result<Self, CatalogError> {
        Ok(toml::de::from_str(s)?)
    }

    /// Loads a catalog from a file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml_str(&text)?;
        log::debug!(
            "Loaded catalog {} ({} table(s))",
            path.display(),
            catalog.tables.len()
        );
        Ok(catalog)
    }

    /// Looks up the configuration for one table edition.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the table or edition is not listed, or
    /// if the schema/table names are not plain identifiers.
    pub fn edition_config(
        &self,
        table_name: &str,
        edition_date: NaiveDate,
    ) -> Result<EditionConfig, CatalogError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| CatalogError::UnknownTable(table_name.to_string()))?;

        let key = edition_date.format("%Y-%m-%d").to_string();
        let entry = table
            .editions
            .get(&key)
            .ok_or_else(|| CatalogError::UnknownEdition {
                table: table_name.to_string(),
                edition: edition_date,
            })?;

        let schema = table.schema.as_deref().unwrap_or(&self.schema);
        let target = table_ref(schema, table_name)?;
        let source = table
            .source_table
            .as_deref()
            .map(|source| table_ref(schema, source))
            .transpose()?;

        Ok(EditionConfig {
            table_name: table_name.to_string(),
            edition_date,
            schema: schema.to_string(),
            raw_path: entry.raw_path.clone(),
            target,
            source,
            entry: entry.clone(),
        })
    }
}

fn table_ref(schema: &str, table: &str) -> Result<TableRef, CatalogError> {
    TableRef::new(schema, table).ok_or_else(|| {
        CatalogError::InvalidIdentifier(if milmi_database_models::is_identifier(schema) {
            table.to_string()
        } else {
            schema.to_string()
        })
    })
}

/// Parses a CLI edition date (`YYYY-MM-DD`).
///
/// # Errors
///
/// Returns [`CatalogError::InvalidDate`] if the value is not an ISO date.
pub fn parse_edition_date(value: &str) -> Result<NaiveDate, CatalogError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|source| {
        CatalogError::InvalidDate {
            value: value.to_string(),
            source,
        }
    })
}
