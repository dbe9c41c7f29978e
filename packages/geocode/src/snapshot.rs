//! Intermediate artifacts written before validation.
//!
//! The raw CSV keeps everything the geocoder returned for each record, and
//! the `GeoJSON` file holds the normalized points keyed by id and date.
//! Both are written even when validation later fails, so a rejected run
//! can be inspected.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use milmi_database_models::GeocodedRecord;
use serde::Serialize;
use thiserror::Error;

use crate::submit::MergedResponse;

/// Errors writing snapshot files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Locations of one run's snapshot files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    /// Raw geocoder responses.
    pub csv: PathBuf,
    /// Normalized points.
    pub geojson: PathBuf,
}

impl SnapshotPaths {
    /// Paths for `table_name` at `edition` under `dir`.
    #[must_use]
    pub fn new(dir: &Path, table_name: &str, edition: NaiveDate) -> Self {
        let stem = format!("{table_name}_{}_geocoded", edition.format("%Y%m%d"));
        Self {
            csv: dir.join(format!("{stem}.csv")),
            geojson: dir.join(format!("{stem}.geojson")),
        }
    }
}

#[derive(Serialize)]
struct RawRow<'a> {
    id: &'a str,
    date: String,
    street: &'a str,
    city: &'a str,
    state: &'a str,
    zip: Option<&'a str>,
    is_match: bool,
    match_type: Option<&'a str>,
    matched_address: Option<&'a str>,
    lon: Option<f64>,
    lat: Option<f64>,
    statefp: Option<&'a str>,
    countyfp: Option<&'a str>,
    tract: Option<&'a str>,
    block: Option<&'a str>,
}

impl<'a> From<&'a MergedResponse> for RawRow<'a> {
    fn from(merged: &'a MergedResponse) -> Self {
        let record = &merged.record;
        let response = &merged.response;
        Self {
            id: &record.id,
            date: record.date.format("%Y-%m-%d").to_string(),
            street: &record.street,
            city: &record.city,
            state: &record.state,
            zip: record.zip.as_deref(),
            is_match: response.is_match,
            match_type: response.match_type.as_deref(),
            matched_address: response.matched_address.as_deref(),
            lon: response.lon,
            lat: response.lat,
            statefp: response.statefp.as_deref(),
            countyfp: response.countyfp.as_deref(),
            tract: response.tract.as_deref(),
            block: response.block.as_deref(),
        }
    }
}

/// Writes merged responses as CSV with a header row.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the file cannot be written.
pub fn write_raw_csv(path: &Path, merged: &[MergedResponse]) -> Result<(), SnapshotError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in merged {
        writer.serialize(RawRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes geocoded records as a `GeoJSON` `FeatureCollection`.
///
/// Unmatched records are kept as features with a null geometry.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the file cannot be written.
pub fn write_points_geojson(path: &Path, records: &[GeocodedRecord]) -> Result<(), SnapshotError> {
    let features = records
        .iter()
        .map(|record| {
            let mut properties = geojson::JsonObject::new();
            properties.insert("id".to_string(), record.id.clone().into());
            properties.insert(
                "date".to_string(),
                record.date.format("%Y-%m-%d").to_string().into(),
            );
            properties.insert("match_type".to_string(), record.match_type.clone().into());
            properties.insert("block_geoid".to_string(), record.block_geoid.clone().into());

            geojson::Feature {
                bbox: None,
                geometry: record
                    .geom
                    .as_ref()
                    .map(|point| geojson::Geometry::new(geojson::Value::from(point))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &collection)?;
    Ok(())
}

/// Writes the raw geocoder responses under `dir`, creating it if needed.
///
/// Runs before any conversion of the responses, so the file exists even
/// when normalization later rejects a fragment.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the file cannot be written.
pub fn write_raw_snapshot(
    dir: &Path,
    table_name: &str,
    edition: NaiveDate,
    merged: &[MergedResponse],
) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(dir)?;
    let path = SnapshotPaths::new(dir, table_name, edition).csv;

    write_raw_csv(&path, merged)?;
    log::info!("Wrote raw geocoder snapshot {}", path.display());
    Ok(path)
}

/// Writes the normalized points under `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the file cannot be written.
pub fn write_points_snapshot(
    dir: &Path,
    table_name: &str,
    edition: NaiveDate,
    records: &[GeocodedRecord],
) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(dir)?;
    let path = SnapshotPaths::new(dir, table_name, edition).geojson;

    write_points_geojson(&path, records)?;
    log::info!("Wrote point snapshot {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use milmi_geocoder::GeocodeResponse;

    use super::*;
    use crate::normalize::normalize;
    use crate::testing::{date, lansing_match, source_record};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("milmi_snapshot_{}", uuid::Uuid::new_v4()))
    }

    fn merged() -> Vec<MergedResponse> {
        vec![
            MergedResponse {
                record: source_record("1", "2025-02-10", "100 Main St"),
                response: lansing_match("1"),
            },
            MergedResponse {
                record: source_record("2", "2025-02-10", "Nowhere"),
                response: GeocodeResponse::unmatched("2"),
            },
        ]
    }

    #[test]
    fn names_files_by_table_and_edition() {
        let paths = SnapshotPaths::new(Path::new("out"), "employers_geo", date("2025-02-10"));
        assert_eq!(paths.csv, Path::new("out/employers_geo_20250210_geocoded.csv"));
        assert_eq!(
            paths.geojson,
            Path::new("out/employers_geo_20250210_geocoded.geojson")
        );
    }

    #[test]
    fn writes_raw_csv_and_points() {
        let dir = temp_dir();
        let merged = merged();
        let records = normalize(&merged).unwrap();

        let csv_path =
            write_raw_snapshot(&dir, "employers_geo", date("2025-02-10"), &merged).unwrap();
        let geojson_path =
            write_points_snapshot(&dir, "employers_geo", date("2025-02-10"), &records).unwrap();

        let paths = SnapshotPaths::new(&dir, "employers_geo", date("2025-02-10"));
        assert_eq!(csv_path, paths.csv);
        assert_eq!(geojson_path, paths.geojson);

        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,date,street,"));
        assert!(lines[1].starts_with("1,2025-02-10,100 Main St,"));
        assert!(lines[2].contains(",false,"));

        let geojson: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&geojson_path).unwrap()).unwrap();
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["block_geoid"], "260650000010002");
        assert_eq!(features[0]["geometry"]["type"], "Point");
        assert_eq!(features[1]["properties"]["id"], "2");
        assert!(features[1]["geometry"].is_null());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn raw_snapshot_keeps_fragments_as_returned() {
        let dir = temp_dir();
        let merged = vec![MergedResponse {
            record: source_record("1", "2025-02-10", "100 Main St"),
            response: GeocodeResponse {
                countyfp: Some("Ingham".to_string()),
                ..lansing_match("1")
            },
        }];

        let path = write_raw_snapshot(&dir, "employers_geo", date("2025-02-10"), &merged).unwrap();

        let csv_text = std::fs::read_to_string(&path).unwrap();
        assert!(csv_text.lines().nth(1).unwrap().contains(",Ingham,"));
        assert!(!SnapshotPaths::new(&dir, "employers_geo", date("2025-02-10"))
            .geojson
            .exists());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
