//! Historical booking dataset
//!
//! An immutable snapshot of booking rows loaded once at startup. Cells are
//! typed by the schema (numbers, dates, flags, labels); columns the schema
//! does not know are kept as text for display. Each snapshot carries a content
//! fingerprint used as the dataset half of the KPI cache key.
//!
//! Rows come from a CSV export or from a table of a SQLite database.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{info, instrument, warn};

use crate::errors::DatasetError;
use crate::record::{parse_date, BookingRecord, RawValue};
use crate::schema::{FieldKind, Schema};
use crate::serde_canon::{hash_bytes_hex, hash_canonical_hex};

#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<BookingRecord>,
    version: String,
}

impl Dataset {
    /// Snapshot from in-memory rows; the version hashes the rows themselves
    pub fn from_records(columns: Vec<String>, rows: Vec<BookingRecord>) -> Self {
        let version = hash_canonical_hex(&rows).unwrap_or_else(|_| hash_bytes_hex(b""));
        Self {
            columns,
            rows,
            version,
        }
    }

    /// Load a CSV file with a header row
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_csv<P: AsRef<Path>>(path: P, schema: &Schema) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(file, schema)
    }

    pub fn from_csv_reader<R: Read>(mut reader: R, schema: &Schema) -> Result<Self, DatasetError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let version = hash_bytes_hex(&bytes);

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut typer = RowTyper::new(&columns, schema);
        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            rows.push(typer.row(record.iter()));
        }

        typer.finish(columns, rows, version)
    }

    /// Load every row of `table` from a SQLite database, opened read-only.
    ///
    /// Integer and real cells go through the same schema typing as CSV text;
    /// blobs are treated as absent. The version hashes the column names and
    /// the loaded cells.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), table = %table))]
    pub fn from_sqlite<P: AsRef<Path>>(
        path: P,
        table: &str,
        schema: &Schema,
    ) -> Result<Self, DatasetError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DatasetError::InvalidTable(table.to_string()));
        }

        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{table}\""))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

        let mut typer = RowTyper::new(&columns, schema);
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(record) = cursor.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                cells.push(sqlite_cell(record.get_ref(index)?));
            }
            rows.push(typer.row(cells.iter().map(String::as_str)));
        }

        let version = hash_canonical_hex(&(&columns, &rows))?;
        typer.finish(columns, rows, version)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[BookingRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Content fingerprint of the snapshot
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Distinct non-null values of a column, numbers ascending before text
    pub fn distinct_values(&self, field: &str) -> Vec<RawValue> {
        let mut values: Vec<RawValue> = self
            .rows
            .iter()
            .filter_map(|row| row.get(field).cloned())
            .collect();
        values.sort_by(RawValue::total_cmp);
        values.dedup();
        values
    }

    /// Smallest and largest numeric value of a column
    pub fn numeric_bounds(&self, field: &str) -> Option<(f64, f64)> {
        self.rows
            .iter()
            .filter_map(|row| row.get(field).and_then(RawValue::as_f64))
            .fold(None, |bounds, v| match bounds {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Earliest and latest date of a column
    pub fn date_bounds(&self, field: &str) -> Option<(NaiveDate, NaiveDate)> {
        self.rows
            .iter()
            .filter_map(|row| row.get(field).and_then(RawValue::as_date))
            .fold(None, |bounds, d| match bounds {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }
}

/// Types cells by column and counts the ones that fell back to text
struct RowTyper {
    kinds: Vec<Option<FieldKind>>,
    untyped: Vec<usize>,
}

impl RowTyper {
    fn new(columns: &[String], schema: &Schema) -> Self {
        Self {
            kinds: columns
                .iter()
                .map(|name| schema.field(name).map(|spec| spec.kind))
                .collect(),
            untyped: vec![0; columns.len()],
        }
    }

    fn row<'c>(&mut self, cells: impl Iterator<Item = &'c str>) -> Vec<RawValue> {
        cells
            .zip(&self.kinds)
            .zip(self.untyped.iter_mut())
            .map(|((cell, kind), untyped)| {
                let value = parse_cell(cell, *kind);
                if let (Some(kind), RawValue::Text(_)) = (kind, &value) {
                    if !matches!(kind, FieldKind::Ordinal | FieldKind::Nominal) {
                        *untyped += 1;
                    }
                }
                value
            })
            .collect()
    }

    fn finish(
        self,
        columns: Vec<String>,
        cells: Vec<Vec<RawValue>>,
        version: String,
    ) -> Result<Dataset, DatasetError> {
        if cells.is_empty() {
            return Err(DatasetError::Empty);
        }

        for (column, &count) in columns.iter().zip(&self.untyped) {
            if count > 0 {
                warn!(column = %column, count, "cells did not parse as the column's declared kind");
            }
        }

        let rows: Vec<BookingRecord> = cells
            .into_iter()
            .map(|values| {
                let mut row = BookingRecord::new();
                for (name, value) in columns.iter().zip(values) {
                    row.insert(name.clone(), value);
                }
                row
            })
            .collect();

        info!(
            rows = rows.len(),
            columns = columns.len(),
            version = %version,
            "dataset loaded"
        );

        Ok(Dataset {
            columns,
            rows,
            version,
        })
    }
}

fn sqlite_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().to_string(),
    }
}

fn parse_cell(cell: &str, kind: Option<FieldKind>) -> RawValue {
    if cell.is_empty() {
        return RawValue::Null;
    }
    let text = || RawValue::Text(cell.to_string());
    match kind {
        Some(FieldKind::Numeric) => cell
            .parse::<f64>()
            .map(RawValue::Number)
            .unwrap_or_else(|_| text()),
        Some(FieldKind::Date) => parse_date(cell).map(RawValue::Date).unwrap_or_else(text),
        Some(FieldKind::Boolean) => text().as_bool().map(RawValue::Bool).unwrap_or_else(text),
        _ => text(),
    }
}
