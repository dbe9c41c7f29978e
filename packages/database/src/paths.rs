#![allow(clippy::module_name_repetitions)]
//! Default file locations under the project's `data/` directory.
//!
//! Callers that accept overrides (the CLI's `MILMI_*` variables) fall back
//! to these.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Default employer data store: `data/milmi.duckdb`.
#[must_use]
pub fn default_database_path() -> PathBuf {
    data_dir().join("milmi.duckdb")
}

/// Default audit store: `data/metadata.duckdb`.
#[must_use]
pub fn default_metadata_database_path() -> PathBuf {
    data_dir().join("metadata.duckdb")
}

/// Default snapshot directory: `data/snapshots`.
#[must_use]
pub fn default_snapshot_dir() -> PathBuf {
    data_dir().join("snapshots")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
