//! US Census Bureau batch geographies client.
//!
//! Addresses are submitted as a header-less CSV file via
//! `multipart/form-data` to `POST /geographies/addressbatch`, which returns
//! coordinates plus the state, county, tract and block codes for each
//! matched address.
//!
//! See <https://geocoding.geo.census.gov/geocoder/Geocoding_Services_API.html>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;

use crate::retry::{self, RetryPolicy};
use crate::service_registry::{GeocodingService, ProviderConfig};
use crate::{AddressInput, BatchGeocoder, GeocodeError, GeocodeResponse};

/// Maximum number of addresses the Census Bureau accepts per batch.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Client for the Census batch geographies endpoint.
#[derive(Debug, Clone)]
pub struct CensusGeocoder {
    client: reqwest::Client,
    base_url: String,
    benchmark: String,
    vintage: String,
    max_batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CensusGeocoder {
    /// Builds a client from a service registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP client cannot be built or the
    /// service is not a Census provider.
    pub fn from_service(service: &GeocodingService) -> Result<Self, GeocodeError> {
        let ProviderConfig::Census {
            base_url,
            benchmark,
            vintage,
            max_batch_size,
            max_retries,
            timeout_secs,
        } = &service.provider;

        let client = reqwest::Client::builder()
            .user_agent(concat!("milmi/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            benchmark: benchmark.clone(),
            vintage: vintage.clone(),
            max_batch_size: (*max_batch_size).min(MAX_BATCH_SIZE),
            timeout: Duration::from_secs(*timeout_secs),
            retry: RetryPolicy {
                max_retries: *max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    /// Overrides the base URL (e.g. for a local mirror of the service).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl BatchGeocoder for CensusGeocoder {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn geocode_batch(
        &self,
        addresses: &[AddressInput],
    ) -> Result<Vec<GeocodeResponse>, GeocodeError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let csv_content = build_request_csv(addresses)?;
        let url = format!("{}/geographies/addressbatch", self.base_url);

        let body = retry::send_text(
            || {
                let form = multipart::Form::new()
                    .text("benchmark", self.benchmark.clone())
                    .text("vintage", self.vintage.clone())
                    .part(
                        "addressFile",
                        multipart::Part::bytes(csv_content.clone()).file_name("addresses.csv"),
                    );
                self.client
                    .post(&url)
                    .multipart(form)
                    .timeout(self.timeout)
            },
            self.retry,
        )
        .await?;

        parse_batch_response(&body)
    }
}

/// Builds the header-less request CSV: `id,street,city,state,zip`.
fn build_request_csv(addresses: &[AddressInput]) -> Result<Vec<u8>, GeocodeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for addr in addresses {
        writer.write_record([
            addr.id.as_str(),
            addr.street.as_str(),
            addr.city.as_str(),
            addr.state.as_str(),
            addr.zip.as_deref().unwrap_or(""),
        ])?;
    }

    writer.into_inner().map_err(|e| GeocodeError::Parse {
        message: format!("Failed to finish request CSV: {e}"),
    })
}

/// Parses the CSV response from the batch geographies endpoint.
///
/// Response format (one row per input, no header):
/// ```text
/// "ID","Input","Match"|"No_Match"|"Tie","Exact"|"Non_Exact","Matched","lng,lat","TigerLine","Side","State","County","Tract","Block"
/// ```
fn parse_batch_response(body: &str) -> Result<Vec<GeocodeResponse>, GeocodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut responses = Vec::new();

    for row in reader.records() {
        let row = row?;
        let Some(id) = row.get(0).filter(|s| !s.is_empty()) else {
            continue;
        };

        if row.get(2) != Some("Match") {
            responses.push(GeocodeResponse::unmatched(id));
            continue;
        }

        let coords = row.get(5).and_then(parse_coord_pair);
        if coords.is_none() {
            log::warn!("Census match for {id} has no usable coordinates");
        }

        responses.push(GeocodeResponse {
            id: id.to_string(),
            is_match: true,
            match_type: field(&row, 3),
            matched_address: field(&row, 4),
            lon: coords.map(|(lng, _)| lng),
            lat: coords.map(|(_, lat)| lat),
            statefp: field(&row, 8),
            countyfp: field(&row, 9),
            tract: field(&row, 10),
            block: field(&row, 11),
        });
    }

    Ok(responses)
}

fn field(row: &csv::StringRecord, idx: usize) -> Option<String> {
    row.get(idx).filter(|s| !s.is_empty()).map(String::from)
}

/// Parses a "lng,lat" coordinate pair from the Census batch response.
fn parse_coord_pair(s: &str) -> Option<(f64, f64)> {
    let (lng, lat) = s.split_once(',')?;
    let lng = lng.trim().parse::<f64>().ok()?;
    let lat = lat.trim().parse::<f64>().ok()?;
    Some((lng, lat))
}
