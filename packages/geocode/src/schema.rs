//! Declarative schema for the geocoded employer table.
//!
//! A [`TableSchema`] lists every column with its type, nullability and
//! value checks, plus the composite unique key. [`TableSchema::validate`]
//! evaluates the whole dataset at once and either returns it (coerced to
//! the declared types) or every violation it found. Nothing is written
//! anywhere unless validation passes, and the only way to obtain a
//! [`ValidatedDataset`] is through [`validate_geocoded`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use chrono::NaiveDate;
use milmi_database_models::GeocodedRecord;
use milmi_geography_models::fips::BLOCK_GEOID_LEN;
use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Declared column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// Calendar date.
    Date,
    /// WGS84 point, longitude/latitude order.
    Point,
}

/// One cell of a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Text value.
    Text(String),
    /// Date value.
    Date(NaiveDate),
    /// Point value.
    Point(geo::Point<f64>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    const fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(ColumnType::Text),
            Self::Date(_) => Some(ColumnType::Date),
            Self::Point(_) => Some(ColumnType::Point),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Point(p) => format!("POINT({} {})", p.x(), p.y()),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

/// A value check applied to non-null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// Text must be exactly `length` characters.
    StrLength {
        /// Required length.
        length: usize,
    },
    /// Text must consist of ASCII digits only.
    Digits,
}

impl Check {
    fn passes(self, value: &Value) -> bool {
        match (self, value) {
            (Self::StrLength { length }, Value::Text(s)) => s.chars().count() == length,
            (Self::Digits, Value::Text(s)) => s.chars().all(|c| c.is_ascii_digit()),
            _ => false,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrLength { length } => write!(f, "str_length({length})"),
            Self::Digits => f.write_str("digits"),
        }
    }
}

/// Declaration of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: &'static str,
    /// Declared type.
    pub dtype: ColumnType,
    /// Whether nulls are allowed.
    pub nullable: bool,
    /// Checks applied to non-null values.
    pub checks: Vec<Check>,
}

/// Declaration of a whole table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    /// Schema name, for reporting.
    pub name: &'static str,
    /// Columns in their declared order.
    pub columns: Vec<ColumnSpec>,
    /// Reject columns that are not declared.
    pub strict: bool,
    /// Convert values that parse as the declared type.
    pub coerce: bool,
    /// Columns forming the composite unique key.
    pub unique: Vec<&'static str>,
}

/// Schema of the geocoded employer table.
#[must_use]
pub fn employer_geo_schema() -> TableSchema {
    TableSchema {
        name: "employers_geo",
        columns: vec![
            ColumnSpec {
                name: "id",
                dtype: ColumnType::Text,
                nullable: false,
                checks: vec![],
            },
            ColumnSpec {
                name: "date",
                dtype: ColumnType::Date,
                nullable: false,
                checks: vec![],
            },
            ColumnSpec {
                name: "match_type",
                dtype: ColumnType::Text,
                nullable: true,
                checks: vec![],
            },
            ColumnSpec {
                name: "block_geoid",
                dtype: ColumnType::Text,
                nullable: true,
                checks: vec![
                    Check::StrLength {
                        length: BLOCK_GEOID_LEN,
                    },
                    Check::Digits,
                ],
            },
            ColumnSpec {
                name: "geom",
                dtype: ColumnType::Point,
                nullable: true,
                checks: vec![],
            },
        ],
        strict: true,
        coerce: true,
        unique: vec!["id", "date"],
    }
}

/// A column-oriented dataset awaiting validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, each holding one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Lays geocoded records out under [`GeocodedRecord::COLUMNS`].
    #[must_use]
    pub fn from_records(records: &[GeocodedRecord]) -> Self {
        Self {
            columns: GeocodedRecord::COLUMNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            rows: records
                .iter()
                .map(|r| {
                    vec![
                        Value::Text(r.id.clone()),
                        Value::Date(r.date),
                        Value::from(r.match_type.clone()),
                        Value::from(r.block_geoid.clone()),
                        r.geom.map_or(Value::Null, Value::Point),
                    ]
                })
                .collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Column the check applies to; `None` for table-level checks.
    pub column: Option<String>,
    /// Zero-based row index; `None` for column-level checks.
    pub row: Option<usize>,
    /// Name of the failed check.
    pub check: String,
    /// The offending value or a description of the failure.
    pub failure: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column.as_deref().unwrap_or("<table>"))?;
        if let Some(row) = self.row {
            write!(f, "[{row}]")?;
        }
        write!(f, ": {} failed: {}", self.check, self.failure)
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} schema check(s) failed", .violations.len())]
pub struct SchemaErrors {
    /// Violations in discovery order.
    pub violations: Vec<Violation>,
}

impl TableSchema {
    /// JSON description of this schema, as stored in audit records.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn descriptor(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Validates a frame.
    ///
    /// Returns the frame with coerced values (same rows, same order), or
    /// every violation found.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaErrors`] if any check fails.
    pub fn validate(&self, frame: Frame) -> Result<Frame, SchemaErrors> {
        let mut violations = Vec::new();

        if self.strict {
            for name in &frame.columns {
                if !self.columns.iter().any(|c| c.name == name) {
                    violations.push(Violation {
                        column: Some(name.clone()),
                        row: None,
                        check: "column_in_schema".to_string(),
                        failure: "column is not declared".to_string(),
                    });
                }
            }
        }

        let mut present = Vec::with_capacity(self.columns.len());
        for spec in &self.columns {
            match frame.position(spec.name) {
                Some(index) => present.push((spec, index)),
                None => violations.push(Violation {
                    column: Some(spec.name.to_string()),
                    row: None,
                    check: "column_in_dataframe".to_string(),
                    failure: "column is missing".to_string(),
                }),
            }
        }

        let width = frame.columns.len();
        let mut rows = frame.rows;

        for (row_index, row) in rows.iter_mut().enumerate() {
            if row.len() != width {
                violations.push(Violation {
                    column: None,
                    row: Some(row_index),
                    check: "row_width".to_string(),
                    failure: format!("expected {width} values, found {}", row.len()),
                });
                continue;
            }

            for &(spec, index) in &present {
                if let Some(violation) = self.check_cell(spec, row_index, &mut row[index]) {
                    violations.push(violation);
                }
            }
        }

        violations.extend(self.check_unique(&frame.columns, &rows, width));

        if violations.is_empty() {
            Ok(Frame {
                columns: frame.columns,
                rows,
            })
        } else {
            Err(SchemaErrors { violations })
        }
    }

    fn check_cell(&self, spec: &ColumnSpec, row: usize, cell: &mut Value) -> Option<Violation> {
        let violation = |check: String, failure: String| Violation {
            column: Some(spec.name.to_string()),
            row: Some(row),
            check,
            failure,
        };

        if self.coerce
            && let Err(failure) = coerce(cell, spec.dtype)
        {
            return Some(violation(format!("coerce_dtype('{}')", spec.dtype), failure));
        }

        if cell.is_null() {
            return (!spec.nullable)
                .then(|| violation("not_nullable".to_string(), "null".to_string()));
        }

        if cell.column_type() != Some(spec.dtype) {
            return Some(violation(format!("dtype('{}')", spec.dtype), cell.render()));
        }

        // Only the first failing check per cell is reported.
        spec.checks
            .iter()
            .find(|check| !check.passes(cell))
            .map(|check| violation(check.to_string(), cell.render()))
    }

    fn check_unique(&self, columns: &[String], rows: &[Vec<Value>], width: usize) -> Vec<Violation> {
        let Some(key_positions) = self
            .unique
            .iter()
            .map(|name| columns.iter().position(|c| c == name))
            .collect::<Option<Vec<_>>>()
        else {
            return Vec::new();
        };
        if key_positions.is_empty() {
            return Vec::new();
        }

        let check = format!("unique({})", self.unique.join(", "));
        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
        let mut violations = Vec::new();

        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != width {
                continue;
            }
            let key: Vec<String> = key_positions.iter().map(|&i| row[i].render()).collect();
            match seen.entry(key) {
                Entry::Occupied(first) => violations.push(Violation {
                    column: None,
                    row: Some(row_index),
                    check: check.clone(),
                    failure: format!(
                        "({}) duplicates row {}",
                        first.key().join(", "),
                        first.get()
                    ),
                }),
                Entry::Vacant(slot) => {
                    slot.insert(row_index);
                }
            }
        }

        violations
    }
}

fn coerce(value: &mut Value, dtype: ColumnType) -> Result<(), String> {
    let coerced = match (dtype, &*value) {
        (ColumnType::Date, Value::Text(s)) => Value::Date(
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("{s:?}: {e}"))?,
        ),
        (ColumnType::Text, Value::Date(d)) => Value::Text(d.format("%Y-%m-%d").to_string()),
        (ColumnType::Point, Value::Text(s)) => Value::Point(parse_point(s)?),
        _ => return Ok(()),
    };
    *value = coerced;
    Ok(())
}

fn parse_point(s: &str) -> Result<geo::Point<f64>, String> {
    let geometry: geojson::Geometry =
        serde_json::from_str(s).map_err(|e| format!("{s:?}: {e}"))?;
    match geometry.value {
        geojson::Value::Point(coords) if coords.len() >= 2 => {
            Ok(geo::Point::new(coords[0], coords[1]))
        }
        _ => Err(format!("{s:?} is not a point geometry")),
    }
}

/// Geocoded records that passed [`employer_geo_schema`]-style validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDataset {
    columns: Vec<String>,
    records: Vec<GeocodedRecord>,
}

impl ValidatedDataset {
    /// Validated rows, in input order.
    #[must_use]
    pub fn records(&self) -> &[GeocodedRecord] {
        &self.records
    }

    /// Column names of the validated frame.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Validates geocoded records against `schema`.
///
/// # Errors
///
/// Returns [`SchemaErrors`] listing every failed check. No rows are
/// returned when any check fails.
pub fn validate_geocoded(
    schema: &TableSchema,
    records: &[GeocodedRecord],
) -> Result<ValidatedDataset, SchemaErrors> {
    let frame = schema.validate(Frame::from_records(records))?;
    let records = records_from_frame(&frame)?;
    Ok(ValidatedDataset {
        columns: frame.columns,
        records,
    })
}

fn records_from_frame(frame: &Frame) -> Result<Vec<GeocodedRecord>, SchemaErrors> {
    let positions: Vec<Option<usize>> = GeocodedRecord::COLUMNS
        .iter()
        .map(|name| frame.position(name))
        .collect();

    let mut records = Vec::with_capacity(frame.rows.len());
    let mut violations = Vec::new();

    for (row_index, row) in frame.rows.iter().enumerate() {
        let cell = |column: usize| positions[column].and_then(|i| row.get(i));
        let text = |column: usize| match cell(column) {
            Some(Value::Text(s)) => Some(s.clone()),
            _ => None,
        };

        match (cell(0), cell(1)) {
            (Some(Value::Text(id)), Some(Value::Date(date))) => records.push(GeocodedRecord {
                id: id.clone(),
                date: *date,
                match_type: text(2),
                block_geoid: text(3),
                geom: match cell(4) {
                    Some(Value::Point(p)) => Some(*p),
                    _ => None,
                },
            }),
            (id, date) => violations.push(Violation {
                column: None,
                row: Some(row_index),
                check: "record_shape".to_string(),
                failure: format!("id={} date={}", render_cell(id), render_cell(date)),
            }),
        }
    }

    if violations.is_empty() {
        Ok(records)
    } else {
        Err(SchemaErrors { violations })
    }
}

fn render_cell(value: Option<&Value>) -> String {
    value.map_or_else(|| "missing".to_string(), Value::render)
}
