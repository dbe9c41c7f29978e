#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line entry point for the MILMI employer toolchain.
//!
//! All configuration is resolved here: the edition catalog
//! (`MILMI_CATALOG`), the data and audit `DuckDB` files
//! (`MILMI_DATABASE_PATH`, `MILMI_METADATA_DATABASE_PATH`), the snapshot
//! directory (`MILMI_SNAPSHOT_DIR`) and an optional geocoder URL override
//! (`MILMI_GEOCODER_URL`). The pipeline receives the opened stores and
//! client as injected dependencies.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use milmi_catalog::{Catalog, CatalogError, DEFAULT_CATALOG_PATH, parse_edition_date};
use milmi_cli_utils::{GeocodeProgress, MultiProgress};
use milmi_database::audit::DuckDbAuditStore;
use milmi_database::employers::DuckDbStore;
use milmi_database::{DbError, db, paths};
use milmi_geocode::{Dependencies, Phase, PipelineError, RunOptions, RunOutcome};
use milmi_geocoder::GeocodeError;
use milmi_geocoder::census::CensusGeocoder;
use milmi_geocoder::service_registry;

/// Geocoding service used for employer addresses.
const GEOCODING_SERVICE_ID: &str = "census";

const CATALOG_ENV: &str = "MILMI_CATALOG";
const DATABASE_PATH_ENV: &str = "MILMI_DATABASE_PATH";
const METADATA_DATABASE_PATH_ENV: &str = "MILMI_METADATA_DATABASE_PATH";
const SNAPSHOT_DIR_ENV: &str = "MILMI_SNAPSHOT_DIR";
const GEOCODER_URL_ENV: &str = "MILMI_GEOCODER_URL";

/// Where a run reads and writes, after applying `MILMI_*` overrides.
#[derive(Debug, PartialEq, Eq)]
struct Locations {
    catalog: PathBuf,
    database: PathBuf,
    metadata_database: PathBuf,
    snapshot_dir: PathBuf,
    geocoder_url: Option<String>,
}

impl Locations {
    fn from_env() -> Self {
        Self::resolve(|var| std::env::var_os(var))
    }

    /// Empty values count as unset.
    fn resolve(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let value = |var: &str| lookup(var).filter(|v| !v.is_empty());
        let path = |var: &str, default: PathBuf| value(var).map_or(default, PathBuf::from);

        Self {
            catalog: path(CATALOG_ENV, PathBuf::from(DEFAULT_CATALOG_PATH)),
            database: path(DATABASE_PATH_ENV, paths::default_database_path()),
            metadata_database: path(
                METADATA_DATABASE_PATH_ENV,
                paths::default_metadata_database_path(),
            ),
            snapshot_dir: path(SNAPSHOT_DIR_ENV, paths::default_snapshot_dir()),
            geocoder_url: value(GEOCODER_URL_ENV).map(|v| v.to_string_lossy().into_owned()),
        }
    }
}

#[derive(Parser)]
#[command(name = "milmi", about = "MILMI employer data toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode employer records that are not yet in the geocoded table
    Geocode {
        /// Edition date (YYYY-MM-DD), as listed in the catalog
        edition_date: String,
        /// Validate and record provenance without writing any rows
        #[arg(short = 'm', long = "metadata-only", alias = "metadata_only")]
        metadata_only: bool,
        /// Catalog table to produce
        #[arg(long, default_value = "employers_geo")]
        table: String,
        /// Do not write the raw CSV and `GeoJSON` snapshots
        #[arg(long)]
        no_snapshots: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to open {}: {source}", .path.display())]
    Store { path: PathBuf, source: DbError },

    #[error("Geocoding service {0:?} is not configured")]
    UnknownService(&'static str),

    #[error(transparent)]
    Geocoder(#[from] GeocodeError),

    #[error("Geocoding {table} edition {edition} failed during {phase}: {source}")]
    Pipeline {
        table: String,
        edition: NaiveDate,
        phase: Phase,
        source: PipelineError,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let multi = milmi_cli_utils::init_logger();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Geocode {
            edition_date,
            metadata_only,
            table,
            no_snapshots,
        } => geocode(&multi, &table, &edition_date, metadata_only, !no_snapshots).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            if let CommandError::Pipeline { source, .. } = &e
                && let Some(errors) = source.schema_errors()
            {
                for violation in &errors.violations {
                    log::error!("  {violation}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn geocode(
    multi: &MultiProgress,
    table: &str,
    edition_date: &str,
    metadata_only: bool,
    snapshots: bool,
) -> Result<(), CommandError> {
    let locations = Locations::from_env();
    let edition = parse_edition_date(edition_date)?;
    let config = Catalog::load(&locations.catalog)?.edition_config(table, edition)?;

    let store = DuckDbStore::new(open_store(&locations.database)?);
    let metadata_path = &locations.metadata_database;
    let audit = open_store(metadata_path).and_then(|conn| {
        DuckDbAuditStore::new(conn).map_err(|source| CommandError::Store {
            path: metadata_path.clone(),
            source,
        })
    })?;

    let service = service_registry::service(GEOCODING_SERVICE_ID)
        .ok_or(CommandError::UnknownService(GEOCODING_SERVICE_ID))?;
    let mut geocoder = CensusGeocoder::from_service(&service)?;
    match &locations.geocoder_url {
        Some(url) => {
            log::info!("Using {} at {url} (override)", service.name);
            geocoder = geocoder.with_base_url(url);
        }
        None => log::info!(
            "Using {} at {} ({} addresses per request)",
            service.name,
            service.base_url(),
            service.max_batch_size()
        ),
    }

    let progress = GeocodeProgress::new(multi, &format!("Geocoding {table} {edition}"));
    let options = RunOptions {
        metadata_only,
        snapshot_dir: snapshots.then(|| locations.snapshot_dir.clone()),
    };
    let deps = Dependencies {
        store: &store,
        audit: &audit,
        geocoder: &geocoder,
        progress: &progress,
    };

    let outcome = milmi_geocode::run(&config, &options, &deps)
        .await
        .map_err(|source| CommandError::Pipeline {
            table: table.to_string(),
            edition,
            phase: source.phase(),
            source,
        })?;

    match outcome {
        RunOutcome::NothingToDo => {
            log::info!("{table} edition {edition} is already up to date");
        }
        RunOutcome::MetadataOnly { rows, run_id } => {
            log::info!(
                "Metadata-only run {run_id}: {rows} row(s) validated and recorded, none written"
            );
        }
        RunOutcome::Persisted { rows, run_id } => {
            log::info!("Run {run_id}: appended {rows} row(s) to {}", config.target);
        }
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<db::Connection, CommandError> {
    log::debug!("Opening {}", path.display());
    db::open(path).map_err(|source| CommandError::Store {
        path: path.to_path_buf(),
        source,
    })
}
