//! Census FIPS fragment utilities.
//!
//! The Census batch geocoder returns the state, county, tract and block
//! codes as loosely typed numbers (`"26"`, `"65"`, `"1"`, sometimes
//! `"65.0"` when a spreadsheet tool has been in the loop). These helpers
//! turn each fragment back into its fixed-width, zero-padded form.

use crate::FipsError;

/// Length of a full census block GEOID (2 + 3 + 6 + 4).
pub const BLOCK_GEOID_LEN: usize = 15;

/// One level of the Census geographic hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FipsLevel {
    /// Two-digit state code.
    State,
    /// Three-digit county code.
    County,
    /// Six-digit tract code.
    Tract,
    /// Four-digit block code.
    Block,
}

impl FipsLevel {
    /// Every level in GEOID concatenation order.
    pub const ALL: &[Self] = &[Self::State, Self::County, Self::Tract, Self::Block];

    /// Zero-padded width of this level's code.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::State => 2,
            Self::County => 3,
            Self::Tract => 6,
            Self::Block => 4,
        }
    }
}

/// Parses a loosely typed FIPS fragment into its integer value.
///
/// Blank input is treated as missing. Accepts plain digits (with or
/// without leading zeros) and floats with a zero fractional part.
///
/// # Errors
///
/// Returns [`FipsError::NotNumeric`] if the text is not a non-negative
/// whole number.
pub fn parse_fragment(raw: &str, level: FipsLevel) -> Result<Option<u64>, FipsError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<u64>()
            .map(Some)
            .map_err(|_| not_numeric(raw, level));
    }

    // "65.0" style values from float-typed columns
    match trimmed.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < 1e15 => Ok(Some(v as u64)),
        _ => Err(not_numeric(raw, level)),
    }
}

fn not_numeric(raw: &str, level: FipsLevel) -> FipsError {
    FipsError::NotNumeric {
        level,
        value: raw.to_string(),
    }
}

/// Formats a fragment value zero-padded to the level's width.
///
/// Values wider than the level are left intact rather than truncated.
#[must_use]
pub fn pad_fragment(value: u64, level: FipsLevel) -> String {
    format!("{value:0width$}", width = level.width())
}

/// Parses and pads a raw fragment in one step.
///
/// # Errors
///
/// Returns [`FipsError`] if the fragment is not numeric.
pub fn normalize_fragment(raw: Option<&str>, level: FipsLevel) -> Result<Option<String>, FipsError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    Ok(parse_fragment(raw, level)?.map(|v| pad_fragment(v, level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_sum_to_geoid_len() {
        let total: usize = FipsLevel::ALL.iter().map(|l| l.width()).sum();
        assert_eq!(total, BLOCK_GEOID_LEN);
    }

    #[test]
    fn pads_short_values() {
        assert_eq!(pad_fragment(26, FipsLevel::State), "26");
        assert_eq!(pad_fragment(65, FipsLevel::County), "065");
        assert_eq!(pad_fragment(1, FipsLevel::Tract), "000001");
        assert_eq!(pad_fragment(2, FipsLevel::Block), "0002");
    }

    #[test]
    fn does_not_truncate_wide_values() {
        assert_eq!(pad_fragment(12_345, FipsLevel::County), "12345");
    }

    #[test]
    fn parses_loose_numbers() {
        assert_eq!(parse_fragment("065", FipsLevel::County).unwrap(), Some(65));
        assert_eq!(parse_fragment(" 65 ", FipsLevel::County).unwrap(), Some(65));
        assert_eq!(parse_fragment("65.0", FipsLevel::County).unwrap(), Some(65));
        assert_eq!(parse_fragment("", FipsLevel::County).unwrap(), None);
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(parse_fragment("6A", FipsLevel::County).is_err());
        assert!(parse_fragment("65.5", FipsLevel::County).is_err());
        assert!(parse_fragment("-1", FipsLevel::Block).is_err());
    }

    #[test]
    fn normalize_passes_through_missing() {
        assert_eq!(normalize_fragment(None, FipsLevel::Tract).unwrap(), None);
        assert_eq!(
            normalize_fragment(Some("330"), FipsLevel::Tract).unwrap(),
            Some("000330".to_string())
        );
    }
}
