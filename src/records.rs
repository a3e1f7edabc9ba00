//! Ordered key/value parameter records and their delimited-file form.
//!
//! Conversion jobs are driven by two tables of per-recording arguments
//! (import arguments and path-construction arguments). Each row is a
//! [`ParamRecord`]; a [`ParamTable`] bundles the rows with a stable,
//! first-seen column order so the tables can round-trip through CSV files
//! produced by hand or by a spreadsheet.
//!
//! Empty cells are treated as absent keys in both directions, so a table
//! written with [`ParamTable::write_csv`] and read back with
//! [`ParamTable::read_csv`] yields equivalent records.

use std::fmt;
use std::path::Path;

use tracing::info;

#[derive(Debug)]
pub enum TableError {
    Csv(csv::Error),
    Io(std::io::Error),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Csv(e) => write!(f, "csv error: {e}"),
            TableError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for TableError {}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        TableError::Csv(e)
    }
}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e)
    }
}

/// One row of string-valued arguments, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamRecord {
    entries: Vec<(String, String)>,
}

impl ParamRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for literal tables in code and tests.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value, preserving the position of existing keys.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordered collection of [`ParamRecord`]s with a shared column set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTable {
    columns: Vec<String>,
    rows: Vec<ParamRecord>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records. Columns are the union of all keys in
    /// first-seen order.
    pub fn from_records(records: Vec<ParamRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.push(record);
        }
        table
    }

    pub fn push(&mut self, record: ParamRecord) {
        for key in record.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.to_string());
            }
        }
        self.rows.push(record);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ParamRecord] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&ParamRecord> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Read a table from a comma-delimited file with a header row.
    /// Empty cells become absent keys.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut table = Self::new();
        table.columns = headers.clone();
        for result in reader.records() {
            let row = result?;
            let mut record = ParamRecord::new();
            for (column, field) in headers.iter().zip(row.iter()) {
                if !field.is_empty() {
                    record.set(column, field);
                }
            }
            table.rows.push(record);
        }
        info!(
            path = %path.display(),
            rows = table.rows.len(),
            columns = table.columns.len(),
            "Read parameter table"
        );
        Ok(table)
    }

    /// Write the table as a comma-delimited file with a header row.
    /// Absent keys become empty cells.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            let fields: Vec<&str> = self
                .columns
                .iter()
                .map(|c| row.get(c).unwrap_or(""))
                .collect();
            writer.write_record(&fields)?;
        }
        writer.flush()?;
        info!(
            path = %path.display(),
            rows = self.rows.len(),
            "Wrote parameter table"
        );
        Ok(())
    }
}
