//! Splits the delta into batches the geocoding service will accept.

use thiserror::Error;

/// Errors from batch partitioning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// The service reported a batch size limit of zero.
    #[error("Batch size limit must be at least 1")]
    ZeroLimit,
}

/// Number of batches needed for `n` items at `limit` items per batch.
///
/// # Errors
///
/// Returns [`PartitionError::ZeroLimit`] if `limit` is zero.
pub const fn batch_count(n: usize, limit: usize) -> Result<usize, PartitionError> {
    if limit == 0 {
        return Err(PartitionError::ZeroLimit);
    }
    Ok(n.div_ceil(limit))
}

/// Splits `items` into `ceil(n / limit)` batches of near-equal size.
///
/// Batch sizes differ by at most one, larger batches first, and relative
/// order is preserved. An empty input produces no batches.
///
/// # Errors
///
/// Returns [`PartitionError::ZeroLimit`] if `limit` is zero.
pub fn partition<T>(items: Vec<T>, limit: usize) -> Result<Vec<Vec<T>>, PartitionError> {
    let count = batch_count(items.len(), limit)?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let base = items.len() / count;
    let extra = items.len() % count;
    let mut iter = items.into_iter();

    Ok((0..count)
        .map(|i| {
            let size = base + usize::from(i < extra);
            iter.by_ref().take(size).collect()
        })
        .collect())
}
