//! Scripted collaborators shared by the pipeline tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use milmi_database::{AuditStore, DbError, EmployerStore};
use milmi_database_models::{AuditRecord, GeocodedRecord, SourceRecord, TableRef};
use milmi_geocoder::{AddressInput, BatchGeocoder, GeocodeError, GeocodeResponse};

type Script = Box<dyn Fn(&[AddressInput]) -> Result<Vec<GeocodeResponse>, GeocodeError> + Send + Sync>;

/// A [`BatchGeocoder`] that answers from a closure and records every call.
pub struct ScriptedGeocoder {
    max_batch_size: usize,
    script: Script,
    calls: Mutex<Vec<Vec<AddressInput>>>,
}

impl ScriptedGeocoder {
    /// Answers each address independently.
    pub fn new(
        max_batch_size: usize,
        answer: impl Fn(&AddressInput) -> GeocodeResponse + Send + Sync + 'static,
    ) -> Self {
        Self::scripted(max_batch_size, move |inputs| {
            Ok(inputs.iter().map(&answer).collect())
        })
    }

    /// Answers each batch as a whole.
    pub fn scripted(
        max_batch_size: usize,
        script: impl Fn(&[AddressInput]) -> Result<Vec<GeocodeResponse>, GeocodeError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            max_batch_size,
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Batches received so far.
    pub fn calls(&self) -> Vec<Vec<AddressInput>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchGeocoder for ScriptedGeocoder {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn geocode_batch(
        &self,
        addresses: &[AddressInput],
    ) -> Result<Vec<GeocodeResponse>, GeocodeError> {
        self.calls.lock().unwrap().push(addresses.to_vec());
        (self.script)(addresses)
    }
}

/// Delegates reads to a real store and fails every append.
pub struct FailingAppendStore<S> {
    pub inner: S,
}

impl<S: EmployerStore> EmployerStore for FailingAppendStore<S> {
    fn table_exists(&self, table: &TableRef) -> Result<bool, DbError> {
        self.inner.table_exists(table)
    }

    fn query_source_records(&self, sql: &str) -> Result<Vec<SourceRecord>, DbError> {
        self.inner.query_source_records(sql)
    }

    fn append_geocoded(&self, _table: &TableRef, _rows: &[GeocodedRecord]) -> Result<u64, DbError> {
        Err(DbError::Conversion {
            message: "injected append failure".to_string(),
        })
    }
}

/// An audit store whose writes always fail.
pub struct FailingAuditStore;

impl AuditStore for FailingAuditStore {
    fn record(&self, _record: &AuditRecord) -> Result<(), DbError> {
        Err(DbError::Conversion {
            message: "injected audit failure".to_string(),
        })
    }

    fn latest_for(
        &self,
        _table_name: &str,
        _edition_date: NaiveDate,
    ) -> Result<Option<AuditRecord>, DbError> {
        Ok(None)
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn source_record(id: &str, d: &str, street: &str) -> SourceRecord {
    SourceRecord {
        id: id.to_string(),
        street: street.to_string(),
        city: "Lansing".to_string(),
        state: "MI".to_string(),
        zip: Some("48933".to_string()),
        date: date(d),
    }
}

/// A response placing the address in block 26-065-000001-0002.
pub fn lansing_match(id: &str) -> GeocodeResponse {
    GeocodeResponse {
        id: id.to_string(),
        is_match: true,
        match_type: Some("Exact".to_string()),
        matched_address: Some("100 MAIN ST, LANSING, MI, 48933".to_string()),
        lon: Some(-84.555),
        lat: Some(42.733),
        statefp: Some("26".to_string()),
        countyfp: Some("65".to_string()),
        tract: Some("1".to_string()),
        block: Some("2".to_string()),
    }
}
