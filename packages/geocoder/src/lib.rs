#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch geocoding client for employer addresses.
//!
//! Resolves street addresses to coordinates and census block geography
//! using the US Census Bureau batch geographies endpoint. The provider is
//! configured via the TOML file in `services/` and exposed behind the
//! [`BatchGeocoder`] trait so callers can substitute their own client.

pub mod census;
pub mod retry;
pub mod service_registry;

use async_trait::async_trait;
use thiserror::Error;

/// An address to be geocoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInput {
    /// Key for correlating the response back to the submitted row.
    pub id: String,
    /// Street address (e.g., "100 Main St").
    pub street: String,
    /// City name.
    pub city: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// ZIP code, if available.
    pub zip: Option<String>,
}

/// Raw geocoder output for one submitted address.
///
/// Geography fragments are kept as the text the service returned; padding
/// them to fixed width is the caller's job. All geography and coordinate
/// fields are `None` for unmatched addresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeResponse {
    /// Key of the submitted address.
    pub id: String,
    /// Whether the service found a match.
    pub is_match: bool,
    /// Match quality (`Exact` or `Non_Exact`).
    pub match_type: Option<String>,
    /// Canonical address returned by the service.
    pub matched_address: Option<String>,
    /// Longitude (WGS84).
    pub lon: Option<f64>,
    /// Latitude (WGS84).
    pub lat: Option<f64>,
    /// State FIPS fragment.
    pub statefp: Option<String>,
    /// County FIPS fragment.
    pub countyfp: Option<String>,
    /// Tract code fragment.
    pub tract: Option<String>,
    /// Block code fragment.
    pub block: Option<String>,
}

impl GeocodeResponse {
    /// Creates an unmatched response for the given key.
    #[must_use]
    pub fn unmatched(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP status {status}: {message}")]
    Status {
        /// Status code returned by the service.
        status: u16,
        /// Additional context.
        message: String,
    },

    /// Request or response CSV handling failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// A geocoding service that accepts addresses in bounded batches.
#[async_trait]
pub trait BatchGeocoder: Send + Sync {
    /// Maximum number of addresses accepted per call.
    fn max_batch_size(&self) -> usize;

    /// Geocodes one batch, returning one response per submitted address.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] on transport or service failure. Addresses
    /// that simply fail to match are not errors.
    async fn geocode_batch(
        &self,
        addresses: &[AddressInput],
    ) -> Result<Vec<GeocodeResponse>, GeocodeError>;
}
