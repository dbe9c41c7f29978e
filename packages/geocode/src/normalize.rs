//! Turns merged geocoder responses into geocoded records.

use chrono::NaiveDate;
use milmi_database_models::GeocodedRecord;
use milmi_geography_models::{BlockGeography, FipsError};
use thiserror::Error;

use crate::submit::MergedResponse;

/// A geography fragment in a response could not be normalized.
#[derive(Debug, Error)]
#[error("Cannot normalize geography for id {id} ({date}): {source}")]
pub struct NormalizeError {
    /// Id of the offending record.
    pub id: String,
    /// Edition date of the offending record.
    pub date: NaiveDate,
    /// The fragment error.
    pub source: FipsError,
}

/// Normalizes every merged response, in order.
///
/// # Errors
///
/// Returns [`NormalizeError`] for the first response carrying a
/// non-numeric geography fragment.
pub fn normalize(merged: &[MergedResponse]) -> Result<Vec<GeocodedRecord>, NormalizeError> {
    merged.iter().map(normalize_one).collect()
}

/// Normalizes one merged response.
///
/// Fragments are zero-padded and concatenated into `block_geoid` only when
/// all four are present. `geom` is set only when both coordinates are.
///
/// # Errors
///
/// Returns [`NormalizeError`] if a fragment is not numeric.
pub fn normalize_one(merged: &MergedResponse) -> Result<GeocodedRecord, NormalizeError> {
    let response = &merged.response;
    let geography = BlockGeography::from_raw(
        response.statefp.as_deref(),
        response.countyfp.as_deref(),
        response.tract.as_deref(),
        response.block.as_deref(),
    )
    .map_err(|source| NormalizeError {
        id: merged.record.id.clone(),
        date: merged.record.date,
        source,
    })?;

    let geom = match (response.lon, response.lat) {
        (Some(lon), Some(lat)) => Some(geo::Point::new(lon, lat)),
        _ => None,
    };

    Ok(GeocodedRecord {
        id: merged.record.id.clone(),
        date: merged.record.date,
        match_type: response
            .match_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        block_geoid: geography.block_geoid(),
        geom,
    })
}
