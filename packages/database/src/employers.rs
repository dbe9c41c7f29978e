//! Employer source and geocoded tables in `DuckDB`.
//!
//! The source table is owned by the upstream ingestion step and is only
//! read here. The geocoded table is created on first append and only ever
//! appended to; duplicate protection comes from the delta query, not from
//! table constraints.

use chrono::NaiveDate;
use duckdb::Connection;
use milmi_database_models::{GeocodedRecord, SourceRecord, TableRef};

use crate::{DbError, EmployerStore, db};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 1_000;

/// Columns bound per geocoded row.
const PARAMS_PER_ROW: usize = 5;

/// Returns the query selecting source rows with no geocoded counterpart
/// on `(id, date)`.
#[must_use]
pub fn new_records_query(source: &TableRef, target: &TableRef) -> String {
    format!(
        "SELECT CAST(p.id AS VARCHAR), \
                COALESCE(p.address, ''), \
                COALESCE(p.city, ''), \
                COALESCE(p.state, ''), \
                CAST(p.zip_code AS VARCHAR), \
                CAST(p.date AS VARCHAR) \
         FROM {source} p \
         LEFT JOIN {target} g \
             ON CAST(p.id AS VARCHAR) = g.id \
             AND p.date = g.date \
         WHERE g.id IS NULL \
         ORDER BY p.date, p.id",
        source = source.qualified(),
        target = target.qualified(),
    )
}

/// Returns the query selecting every source row.
#[must_use]
pub fn all_records_query(source: &TableRef) -> String {
    format!(
        "SELECT CAST(p.id AS VARCHAR), \
                COALESCE(p.address, ''), \
                COALESCE(p.city, ''), \
                COALESCE(p.state, ''), \
                CAST(p.zip_code AS VARCHAR), \
                CAST(p.date AS VARCHAR) \
         FROM {source} p \
         ORDER BY p.date, p.id",
        source = source.qualified(),
    )
}

/// `DuckDB`-backed [`EmployerStore`].
pub struct DuckDbStore {
    conn: Connection,
}

impl DuckDbStore {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates the employer source table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the DDL fails.
    pub fn ensure_source_table(&self, table: &TableRef) -> Result<(), DbError> {
        self.conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {table} (
                id TEXT NOT NULL,
                address TEXT,
                city TEXT,
                state TEXT,
                zip_code TEXT,
                date DATE NOT NULL
             );",
            schema = table.schema,
            table = table.qualified(),
        ))?;
        Ok(())
    }

    /// Returns the number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn count_rows(&self, table: &TableRef) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .prepare(&format!("SELECT COUNT(*) FROM {}", table.qualified()))?
            .query_row([], |row| row.get(0))?;
        u64::try_from(count).map_err(|e| DbError::Conversion {
            message: format!("negative row count: {e}"),
        })
    }

    fn ensure_geocoded_table(&self, table: &TableRef) -> Result<(), DbError> {
        self.conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {table} (
                id TEXT NOT NULL,
                date DATE NOT NULL,
                match_type TEXT,
                block_geoid TEXT,
                geom TEXT
             );",
            schema = table.schema,
            table = table.qualified(),
        ))?;
        Ok(())
    }
}

impl EmployerStore for DuckDbStore {
    fn table_exists(&self, table: &TableRef) -> Result<bool, DbError> {
        db::table_exists(&self.conn, &table.schema, &table.table)
    }

    fn query_source_records(&self, sql: &str) -> Result<Vec<SourceRecord>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, street, city, state, zip, date) = row?;
            records.push(SourceRecord {
                id,
                street,
                city,
                state,
                zip: zip.filter(|z| !z.trim().is_empty()),
                date: parse_date(&date)?,
            });
        }

        Ok(records)
    }

    fn append_geocoded(&self, table: &TableRef, rows: &[GeocodedRecord]) -> Result<u64, DbError> {
        self.ensure_geocoded_table(table)?;

        if rows.is_empty() {
            return Ok(0);
        }

        db::in_transaction(&self.conn, |conn| {
            let mut total = 0u64;

            for chunk in rows.chunks(CHUNK_SIZE) {
                let mut sql = format!(
                    "INSERT INTO {} (id, date, match_type, block_geoid, geom) VALUES ",
                    table.qualified()
                );
                for i in 0..chunk.len() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str("(?, CAST(? AS DATE), ?, ?, ?)");
                }

                let mut stmt = conn.prepare(&sql)?;
                let mut param_idx = 1usize;

                for record in chunk {
                    let geom = record.geom.as_ref().map(point_to_geojson).transpose()?;

                    stmt.raw_bind_parameter(param_idx, &record.id)?;
                    stmt.raw_bind_parameter(param_idx + 1, record.date.to_string())?;
                    stmt.raw_bind_parameter(param_idx + 2, record.match_type.as_deref())?;
                    stmt.raw_bind_parameter(param_idx + 3, record.block_geoid.as_deref())?;
                    stmt.raw_bind_parameter(param_idx + 4, geom.as_deref())?;

                    param_idx += PARAMS_PER_ROW;
                }

                let written = stmt.raw_execute()?;
                total += u64::try_from(written).unwrap_or(0);
            }

            Ok(total)
        })
    }
}

/// Encodes a point as a `GeoJSON` geometry string.
///
/// # Errors
///
/// Returns [`DbError`] if serialization fails.
pub fn point_to_geojson(point: &geo::Point<f64>) -> Result<String, DbError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(point));
    Ok(serde_json::to_string(&geometry)?)
}

fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| DbError::Conversion {
        message: format!("invalid date {s:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> TableRef {
        TableRef::new("milmi", "employers").unwrap()
    }

    fn target() -> TableRef {
        TableRef::new("milmi", "employers_geo").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seeded_store() -> DuckDbStore {
        let store = DuckDbStore::new(db::open_in_memory().unwrap());
        store.ensure_source_table(&source()).unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO milmi.employers VALUES
                    ('1', '100 Main St', 'Lansing', 'MI', '48933', DATE '2025-02-10'),
                    ('2', NULL, 'Lansing', 'MI', NULL, DATE '2025-02-10'),
                    ('1', '100 Main St', 'Lansing', 'MI', '48933', DATE '2025-03-10');",
            )
            .unwrap();
        store
    }

    fn geocoded(id: &str, d: &str) -> GeocodedRecord {
        GeocodedRecord {
            id: id.to_string(),
            date: date(d),
            match_type: Some("Exact".to_string()),
            block_geoid: Some("260650000010002".to_string()),
            geom: Some(geo::Point::new(-84.555, 42.733)),
        }
    }

    #[test]
    fn reads_all_source_records() {
        let store = seeded_store();
        let records = store
            .query_source_records(&all_records_query(&source()))
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[0].zip.as_deref(), Some("48933"));
        assert_eq!(records[1].street, "");
        assert_eq!(records[1].zip, None);
        assert_eq!(records[2].date, date("2025-03-10"));
    }

    #[test]
    fn delta_excludes_rows_on_natural_key() {
        let store = seeded_store();
        assert!(!store.table_exists(&target()).unwrap());

        store
            .append_geocoded(&target(), &[geocoded("1", "2025-02-10")])
            .unwrap();
        assert!(store.table_exists(&target()).unwrap());

        let delta = store
            .query_source_records(&new_records_query(&source(), &target()))
            .unwrap();
        let keys: Vec<(String, NaiveDate)> =
            delta.into_iter().map(|r| (r.id, r.date)).collect();

        // Same id in a later edition is still new.
        assert_eq!(
            keys,
            vec![
                ("2".to_string(), date("2025-02-10")),
                ("1".to_string(), date("2025-03-10")),
            ]
        );
    }

    #[test]
    fn appends_never_overwrite() {
        let store = seeded_store();
        let rows = vec![geocoded("1", "2025-02-10"), geocoded("2", "2025-02-10")];

        assert_eq!(store.append_geocoded(&target(), &rows).unwrap(), 2);
        assert_eq!(store.append_geocoded(&target(), &rows).unwrap(), 2);
        assert_eq!(store.count_rows(&target()).unwrap(), 4);
    }

    #[test]
    fn stores_unmatched_rows_with_nulls() {
        let store = seeded_store();
        let unmatched = GeocodedRecord {
            id: "2".to_string(),
            date: date("2025-02-10"),
            match_type: None,
            block_geoid: None,
            geom: None,
        };
        store.append_geocoded(&target(), &[unmatched]).unwrap();

        let nulls: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM milmi.employers_geo
                 WHERE geom IS NULL AND block_geoid IS NULL AND match_type IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn encodes_points_as_geojson() {
        let json = point_to_geojson(&geo::Point::new(-84.5, 42.7)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "Point");
        assert_eq!(value["coordinates"][0], -84.5);
        assert_eq!(value["coordinates"][1], 42.7);
    }
}
