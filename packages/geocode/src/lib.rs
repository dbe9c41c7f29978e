#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Delta geocoding pipeline for employer records.
//!
//! One [`run`] geocodes the employer rows of an edition that are not yet in
//! the geocoded table, in this order:
//!
//! 1. [`delta::select_delta`] picks source rows with no geocoded
//!    counterpart (every row on the first run).
//! 2. [`partition::partition`] splits them into batches the service
//!    accepts.
//! 3. [`submit::submit_batches`] geocodes the batches one at a time and
//!    re-attaches `(id, date)` to every response.
//! 4. [`snapshot::write_raw_snapshot`] saves the raw responses, then
//!    [`normalize::normalize`] builds the block GEOID and point geometry
//!    and [`snapshot::write_points_snapshot`] saves the points.
//! 5. [`schema::validate_geocoded`] checks the whole dataset and stops the
//!    run on any violation.
//! 6. [`audit::record_metadata`] commits the provenance record.
//! 7. [`persist::persist`] appends the rows, unless the run is
//!    metadata-only.
//!
//! Stores, the geocoder and the progress sink are passed in through
//! [`Dependencies`], so the pipeline itself never opens connections or
//! reads the environment.

pub mod audit;
pub mod delta;
pub mod normalize;
pub mod partition;
pub mod persist;
pub mod progress;
pub mod schema;
pub mod snapshot;
pub mod submit;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use milmi_catalog::EditionConfig;
use milmi_database::{AuditStore, DbError, EmployerStore};
use milmi_database_models::TableRef;
use milmi_geocoder::BatchGeocoder;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::audit::{AuditError, AuditRequest};
use crate::normalize::NormalizeError;
use crate::partition::PartitionError;
use crate::persist::PersistOutcome;
use crate::progress::ProgressCallback;
use crate::schema::SchemaErrors;
use crate::snapshot::SnapshotError;
use crate::submit::SubmitError;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Checking the edition configuration.
    Configure,
    /// Selecting the delta.
    Select,
    /// Splitting the delta into batches.
    Partition,
    /// Calling the geocoding service.
    Submit,
    /// Building GEOIDs and geometries.
    Normalize,
    /// Writing intermediate artifacts.
    Snapshot,
    /// Schema validation.
    Validate,
    /// Recording provenance.
    Audit,
    /// Appending rows.
    Persist,
}

/// A failed run. Each variant belongs to exactly one [`Phase`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The edition configuration cannot drive a run.
    #[error("Invalid edition configuration: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },

    /// The delta query failed.
    #[error("Delta selection failed: {0}")]
    Select(#[source] DbError),

    /// The batch size limit is unusable.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// A geocoding request failed or its responses did not line up.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// A geography fragment could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Snapshot files could not be written.
    #[error("Snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The dataset failed schema validation. Nothing was recorded or
    /// written.
    #[error("Schema validation failed: {0}")]
    Validation(#[from] SchemaErrors),

    /// The audit record could not be committed. No data was written.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The append failed and was rolled back.
    #[error("Persisting rows failed: {0}")]
    Persist(#[source] DbError),
}

impl PipelineError {
    /// The phase that failed.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Config { .. } => Phase::Configure,
            Self::Select(_) => Phase::Select,
            Self::Partition(_) => Phase::Partition,
            Self::Submit(_) => Phase::Submit,
            Self::Normalize(_) => Phase::Normalize,
            Self::Snapshot(_) => Phase::Snapshot,
            Self::Validation(_) => Phase::Validate,
            Self::Audit(_) => Phase::Audit,
            Self::Persist(_) => Phase::Persist,
        }
    }

    /// Schema violations, when the run failed validation.
    #[must_use]
    pub const fn schema_errors(&self) -> Option<&SchemaErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Collaborators a run reads from and writes to.
pub struct Dependencies<'a> {
    /// Source and target tables.
    pub store: &'a dyn EmployerStore,
    /// Provenance log.
    pub audit: &'a dyn AuditStore,
    /// Batch geocoding service.
    pub geocoder: &'a dyn BatchGeocoder,
    /// Progress sink.
    pub progress: &'a dyn ProgressCallback,
}

/// Per-invocation settings.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Validate and record provenance without writing rows.
    pub metadata_only: bool,
    /// Directory for snapshot files; snapshots are skipped when `None`.
    pub snapshot_dir: Option<PathBuf>,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The delta was empty; the geocoder was not called.
    NothingToDo,
    /// Rows were validated and recorded but not written.
    MetadataOnly {
        /// Validated row count.
        rows: u64,
        /// Audit run id.
        run_id: String,
    },
    /// Rows were validated, recorded and appended.
    Persisted {
        /// Appended row count.
        rows: u64,
        /// Audit run id.
        run_id: String,
    },
}

/// Geocodes and stores the missing rows of one edition.
///
/// # Errors
///
/// Returns [`PipelineError`] for the first phase that fails. Validation
/// failures write nothing. Audit failures prevent the data write.
#[allow(clippy::future_not_send)]
pub async fn run(
    config: &EditionConfig,
    options: &RunOptions,
    deps: &Dependencies<'_>,
) -> Result<RunOutcome, PipelineError> {
    let source = source_table(config)?;
    let target = &config.target;

    log::info!(
        "Geocoding {} edition {} ({source} -> {target}{})",
        config.table_name,
        config.edition_date,
        if options.metadata_only {
            ", metadata only"
        } else {
            ""
        }
    );

    let selection =
        delta::select_delta(deps.store, &source, target).map_err(PipelineError::Select)?;
    if selection.records.is_empty() {
        log::info!(
            "Nothing to geocode for {} edition {}",
            config.table_name,
            config.edition_date
        );
        deps.progress.finish("Nothing to geocode".to_string());
        return Ok(RunOutcome::NothingToDo);
    }

    let total = selection.records.len();
    let batches = partition::partition(selection.records, deps.geocoder.max_batch_size())?;
    log::info!("Submitting {total} record(s) in {} request(s)", batches.len());

    deps.progress.set_total(total as u64);
    let merged = submit::submit_batches(deps.geocoder, batches, deps.progress).await?;
    deps.progress.finish(format!("Geocoded {total} record(s)"));

    if let Some(dir) = &options.snapshot_dir {
        snapshot::write_raw_snapshot(dir, &config.table_name, config.edition_date, &merged)?;
    }

    let records = normalize::normalize(&merged)?;

    if let Some(dir) = &options.snapshot_dir {
        snapshot::write_points_snapshot(dir, &config.table_name, config.edition_date, &records)?;
    }

    let table_schema = schema::employer_geo_schema();
    let dataset = schema::validate_geocoded(&table_schema, &records)?;
    log::info!("{} row(s) passed schema validation", dataset.len());

    let record = audit::record_metadata(
        deps.audit,
        &AuditRequest {
            schema_name: &config.schema,
            source_file: audit::SOURCE_FILE,
            table_name: &config.table_name,
            edition_metadata: &config.entry,
            edition_date: config.edition_date,
            table_schema: &table_schema,
            dataset: &dataset,
            metadata_only: options.metadata_only,
        },
    )?;

    match persist::persist(deps.store, target, &dataset, options.metadata_only)
        .map_err(PipelineError::Persist)?
    {
        PersistOutcome::Skipped => Ok(RunOutcome::MetadataOnly {
            rows: record.row_count,
            run_id: record.run_id,
        }),
        PersistOutcome::Appended(rows) => Ok(RunOutcome::Persisted {
            rows,
            run_id: record.run_id,
        }),
    }
}

fn source_table(config: &EditionConfig) -> Result<TableRef, PipelineError> {
    config
        .source
        .clone()
        .ok_or_else(|| PipelineError::Config {
            message: format!(
                "table {} has no source_table to geocode from",
                config.table_name
            ),
        })
}
