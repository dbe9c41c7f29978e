#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census block geography types.
//!
//! Holds the padded FIPS fragments for one geocoded address and builds the
//! canonical 15-character block GEOID from them.

pub mod fips;

use thiserror::Error;

use crate::fips::{FipsLevel, normalize_fragment};

/// Errors from FIPS fragment handling.
#[derive(Debug, Error)]
pub enum FipsError {
    /// A fragment could not be read as a whole number.
    #[error("{level} FIPS fragment is not numeric: {value:?}")]
    NotNumeric {
        /// Level the fragment belongs to.
        level: FipsLevel,
        /// The offending raw value.
        value: String,
    },
}

/// Zero-padded census block fragments for one address.
///
/// Each fragment is `None` when the geocoder did not return it (unmatched
/// addresses have all four missing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockGeography {
    /// Two-digit state code.
    pub state: Option<String>,
    /// Three-digit county code.
    pub county: Option<String>,
    /// Six-digit tract code.
    pub tract: Option<String>,
    /// Four-digit block code.
    pub block: Option<String>,
}

impl BlockGeography {
    /// Builds padded geography from raw geocoder fragments.
    ///
    /// # Errors
    ///
    /// Returns [`FipsError`] if any present fragment is not numeric.
    pub fn from_raw(
        state: Option<&str>,
        county: Option<&str>,
        tract: Option<&str>,
        block: Option<&str>,
    ) -> Result<Self, FipsError> {
        Ok(Self {
            state: normalize_fragment(state, FipsLevel::State)?,
            county: normalize_fragment(county, FipsLevel::County)?,
            tract: normalize_fragment(tract, FipsLevel::Tract)?,
            block: normalize_fragment(block, FipsLevel::Block)?,
        })
    }

    /// Concatenated block GEOID, or `None` unless all four fragments are
    /// present.
    #[must_use]
    pub fn block_geoid(&self) -> Option<String> {
        match (&self.state, &self.county, &self.tract, &self.block) {
            (Some(s), Some(c), Some(t), Some(b)) => Some(format!("{s}{c}{t}{b}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_padded_geoid() {
        let geo = BlockGeography::from_raw(Some("26"), Some("65"), Some("1"), Some("2")).unwrap();
        assert_eq!(geo.block_geoid().as_deref(), Some("260650000010002"));
    }

    #[test]
    fn partial_geography_has_no_geoid() {
        let geo = BlockGeography::from_raw(Some("26"), Some("65"), None, Some("2")).unwrap();
        assert_eq!(geo.block_geoid(), None);
    }

    #[test]
    fn unmatched_is_empty() {
        let geo = BlockGeography::from_raw(None, None, None, None).unwrap();
        assert_eq!(geo, BlockGeography::default());
        assert_eq!(geo.block_geoid(), None);
    }

    #[test]
    fn wide_fragment_yields_long_geoid() {
        let geo =
            BlockGeography::from_raw(Some("26"), Some("1065"), Some("1"), Some("2")).unwrap();
        assert_eq!(geo.block_geoid().map(|g| g.len()), Some(16));
    }
}
