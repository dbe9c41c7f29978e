//! Sends batches to the geocoder and re-attaches the natural key.
//!
//! The geocoding service only sees address fields. Each address is keyed
//! by its position within the batch, and the `(id, date)` of the source
//! record is restored from that position when the responses come back, so
//! ids repeated across editions never collide.

use chrono::NaiveDate;
use milmi_database_models::SourceRecord;
use milmi_geocoder::{AddressInput, BatchGeocoder, GeocodeError, GeocodeResponse};
use thiserror::Error;

use crate::progress::ProgressCallback;

/// A source record paired with the geocoder's answer for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResponse {
    /// The record that was submitted.
    pub record: SourceRecord,
    /// The service response, with `id` set to the record's id.
    pub response: GeocodeResponse,
}

/// Errors from batch submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The service call failed.
    #[error("Geocoding request {batch} failed: {source}")]
    Geocode {
        /// 1-based request number.
        batch: usize,
        /// Underlying client error.
        source: GeocodeError,
    },

    /// The service answered for an address that was not submitted.
    #[error("Geocoding request {batch} returned unknown key {key:?}")]
    UnknownKey {
        /// 1-based request number.
        batch: usize,
        /// Key as returned by the service.
        key: String,
    },

    /// The service answered twice for the same address.
    #[error("Geocoding request {batch} returned key {key:?} more than once")]
    DuplicateKey {
        /// 1-based request number.
        batch: usize,
        /// Repeated key.
        key: String,
    },

    /// A submitted address got no answer.
    #[error("Geocoding request {batch} has no response for id {id} ({date})")]
    MissingResponse {
        /// 1-based request number.
        batch: usize,
        /// Id of the unanswered record.
        id: String,
        /// Edition date of the unanswered record.
        date: NaiveDate,
    },
}

/// Submits each batch in order and merges the responses with their source
/// records.
///
/// A failure on any batch aborts the whole submission; nothing from
/// earlier batches is returned.
///
/// # Errors
///
/// Returns [`SubmitError`] if a request fails or its responses cannot be
/// matched one-to-one with the submitted records.
pub async fn submit_batches(
    geocoder: &dyn BatchGeocoder,
    batches: Vec<Vec<SourceRecord>>,
    progress: &dyn ProgressCallback,
) -> Result<Vec<MergedResponse>, SubmitError> {
    let total = batches.len();
    let mut merged = Vec::with_capacity(batches.iter().map(Vec::len).sum());

    for (i, batch) in batches.into_iter().enumerate() {
        let number = i + 1;
        log::info!(
            "Completing request {number}/{total} ({} addresses)",
            batch.len()
        );
        progress.set_message(format!("Request {number}/{total}"));

        let inputs = request_inputs(&batch);
        let responses = geocoder
            .geocode_batch(&inputs)
            .await
            .map_err(|source| SubmitError::Geocode {
                batch: number,
                source,
            })?;

        let batch_merged = merge_batch(number, batch, responses)?;
        let matched = batch_merged.iter().filter(|m| m.response.is_match).count();
        log::info!(
            "Request {number}/{total}: {matched} matched, {} unmatched",
            batch_merged.len() - matched
        );

        progress.inc(batch_merged.len() as u64);
        merged.extend(batch_merged);
    }

    Ok(merged)
}

fn request_inputs(batch: &[SourceRecord]) -> Vec<AddressInput> {
    batch
        .iter()
        .enumerate()
        .map(|(i, record)| AddressInput {
            id: i.to_string(),
            street: record.street.clone(),
            city: record.city.clone(),
            state: record.state.clone(),
            zip: record.zip.clone(),
        })
        .collect()
}

fn merge_batch(
    batch: usize,
    records: Vec<SourceRecord>,
    responses: Vec<GeocodeResponse>,
) -> Result<Vec<MergedResponse>, SubmitError> {
    let mut slots: Vec<Option<GeocodeResponse>> =
        std::iter::repeat_with(|| None).take(records.len()).collect();

    for response in responses {
        let Some(index) = response
            .id
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&i| i < slots.len())
        else {
            return Err(SubmitError::UnknownKey {
                batch,
                key: response.id,
            });
        };

        if slots[index].is_some() {
            return Err(SubmitError::DuplicateKey {
                batch,
                key: response.id,
            });
        }
        slots[index] = Some(response);
    }

    records
        .into_iter()
        .zip(slots)
        .map(|(record, slot)| {
            let Some(mut response) = slot else {
                return Err(SubmitError::MissingResponse {
                    batch,
                    id: record.id,
                    date: record.date,
                });
            };
            response.id.clone_from(&record.id);
            Ok(MergedResponse { record, response })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use crate::testing::{ScriptedGeocoder, source_record};

    fn records() -> Vec<SourceRecord> {
        vec![
            source_record("7", "2025-02-10", "1 A St"),
            source_record("7", "2025-03-10", "1 A St"),
            source_record("8", "2025-03-10", "2 B St"),
        ]
    }

    #[tokio::test]
    async fn restores_natural_key_by_position() {
        let geocoder = ScriptedGeocoder::new(10, |input| {
            if input.street == "2 B St" {
                GeocodeResponse::unmatched(&input.id)
            } else {
                GeocodeResponse {
                    id: input.id.clone(),
                    is_match: true,
                    ..GeocodeResponse::default()
                }
            }
        });

        let merged = submit_batches(&geocoder, vec![records()], &NullProgress)
            .await
            .unwrap();

        let keys: Vec<(String, String)> = merged
            .iter()
            .map(|m| (m.response.id.clone(), m.record.date.to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("7".to_string(), "2025-02-10".to_string()),
                ("7".to_string(), "2025-03-10".to_string()),
                ("8".to_string(), "2025-03-10".to_string()),
            ]
        );
        assert!(merged[0].response.is_match);
        assert!(!merged[2].response.is_match);
    }

    #[tokio::test]
    async fn service_never_sees_dates_or_ids() {
        let geocoder = ScriptedGeocoder::new(10, |input| GeocodeResponse::unmatched(&input.id));
        submit_batches(&geocoder, vec![records()], &NullProgress)
            .await
            .unwrap();

        let calls = geocoder.calls();
        assert_eq!(calls.len(), 1);
        let keys: Vec<&str> = calls[0].iter().map(|a| a.id.as_str()).collect();
        assert_eq!(keys, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn submits_batches_in_order() {
        let geocoder = ScriptedGeocoder::new(2, |input| GeocodeResponse::unmatched(&input.id));
        let mut all = records();
        let second = all.split_off(2);

        let merged = submit_batches(&geocoder, vec![all, second], &NullProgress)
            .await
            .unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(geocoder.calls().iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(merged[2].record.id, "8");
    }

    #[tokio::test]
    async fn missing_response_is_an_error() {
        let geocoder = ScriptedGeocoder::scripted(10, |inputs| {
            Ok(inputs
                .iter()
                .skip(1)
                .map(|a| GeocodeResponse::unmatched(&a.id))
                .collect())
        });
        let err = submit_batches(&geocoder, vec![records()], &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::MissingResponse { ref id, .. } if id == "7"));
    }

    #[tokio::test]
    async fn unknown_and_duplicate_keys_are_errors() {
        let unknown = ScriptedGeocoder::scripted(10, |inputs| {
            let mut out: Vec<_> = inputs
                .iter()
                .map(|a| GeocodeResponse::unmatched(&a.id))
                .collect();
            out.push(GeocodeResponse::unmatched("99"));
            Ok(out)
        });
        let err = submit_batches(&unknown, vec![records()], &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::UnknownKey { ref key, .. } if key == "99"));

        let duplicate = ScriptedGeocoder::scripted(10, |inputs| {
            let mut out: Vec<_> = inputs
                .iter()
                .map(|a| GeocodeResponse::unmatched(&a.id))
                .collect();
            out.push(GeocodeResponse::unmatched("0"));
            Ok(out)
        });
        let err = submit_batches(&duplicate, vec![records()], &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::DuplicateKey { ref key, .. } if key == "0"));
    }

    #[tokio::test]
    async fn failed_request_aborts() {
        let geocoder = ScriptedGeocoder::scripted(10, |_| Err(GeocodeError::RateLimited));
        let mut all = records();
        let second = all.split_off(1);

        let err = submit_batches(&geocoder, vec![all, second], &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Geocode { batch: 1, .. }));
        assert_eq!(geocoder.calls().len(), 1);
    }
}
