//! CSV tables exchanged between pipeline stages.
//!
//! Every table is plain comma-separated text. Readers accept an optional
//! header row (detected by a non-numeric first field), `#` comment lines and
//! surrounding whitespace. Writers always emit a header row and print floating
//! point values with full round-trip precision.

use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading or writing tables
#[derive(Error, Debug)]
pub enum TableError {
    /// Underlying CSV reader/writer failure (includes file open errors)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O failure while flushing a writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data row has fewer columns than the table requires
    #[error("{path}: row {row} has {found} columns, expected at least {expected}")]
    ShortRow {
        path: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A field could not be parsed
    #[error("{path}: row {row}, column {column}: cannot parse '{value}'")]
    Parse {
        path: String,
        row: usize,
        column: usize,
        value: String,
    },

    /// The table holds no data rows where at least one is required
    #[error("{path}: table has no data rows")]
    Empty { path: String },
}

/// A data row read from a table, with its 1-based position in the file's data
pub(crate) struct Row {
    pub number: usize,
    pub record: StringRecord,
}

/// Read all data rows from `path`, requiring `min_columns` fields per row.
pub(crate) fn read_rows(path: &Path, min_columns: usize) -> Result<Vec<Row>, TableError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        // A leading non-numeric first field marks a header row
        if rows.is_empty() && record.get(0).is_some_and(|f| f.parse::<f64>().is_err()) {
            debug!("{}: skipping header row {:?}", path.display(), record);
            continue;
        }

        let number = rows.len() + 1;
        if record.len() < min_columns {
            return Err(TableError::ShortRow {
                path: path.display().to_string(),
                row: number,
                expected: min_columns,
                found: record.len(),
            });
        }
        rows.push(Row { number, record });
    }

    Ok(rows)
}

/// Parse column `column` (0-based) of a row.
pub(crate) fn parse_field<T: FromStr>(
    path: &Path,
    row: &Row,
    column: usize,
) -> Result<T, TableError> {
    let value = row.record.get(column).unwrap_or_default();
    value.parse::<T>().map_err(|_| TableError::Parse {
        path: path.display().to_string(),
        row: row.number,
        column: column + 1,
        value: value.to_string(),
    })
}

/// Parse a success flag written as `1`/`0` or `true`/`false`.
pub(crate) fn parse_flag(path: &Path, row: &Row, column: usize) -> Result<bool, TableError> {
    match row.record.get(column).unwrap_or_default() {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(TableError::Parse {
            path: path.display().to_string(),
            row: row.number,
            column: column + 1,
            value: other.to_string(),
        }),
    }
}

/// Open a CSV writer on `path` and write the header row.
pub(crate) fn create_writer(path: &Path, header: &[&str]) -> Result<Writer<File>, TableError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(header)?;
    Ok(writer)
}

/// One scheduled readout event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineTimeEntry {
    /// Image line read at this event (for check lines, the source line identity)
    pub line_number: u32,
    /// Mid-exposure time of the event in seconds
    pub exposure_time: f64,
}

/// Explicit mapping from a scheduled event index to the source line it reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLineMap(Vec<u32>);

impl CheckLineMap {
    /// Source line read at event `index` (0-based)
    pub fn source_line(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    /// Number of events in the mapping
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the mapping holds no events
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ordered table of line numbers and exposure times
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineTimeTable {
    entries: Vec<LineTimeEntry>,
}

impl From<Vec<LineTimeEntry>> for LineTimeTable {
    fn from(entries: Vec<LineTimeEntry>) -> Self {
        Self { entries }
    }
}

impl LineTimeTable {
    /// CSV header written by [`LineTimeTable::write_csv`]
    pub const HEADER: [&'static str; 2] = ["lineNumber", "exposureTime"];

    /// Number of rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no rows
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All rows in schedule order
    pub fn entries(&self) -> &[LineTimeEntry] {
        &self.entries
    }

    /// Row at `index` (0-based)
    pub fn get(&self, index: usize) -> Option<&LineTimeEntry> {
        self.entries.get(index)
    }

    /// Exposure times in schedule order
    pub fn times(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.exposure_time).collect()
    }

    /// Latest exposure time in the table
    pub fn max_time(&self) -> Option<f64> {
        self.entries
            .iter()
            .map(|e| e.exposure_time)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Event index → source line mapping used by check-line resampling
    pub fn source_lines(&self) -> CheckLineMap {
        CheckLineMap(self.entries.iter().map(|e| e.line_number).collect())
    }

    /// True if exposure times strictly increase down the table
    pub fn is_time_ordered(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[1].exposure_time > w[0].exposure_time)
    }

    /// Read a `lineNumber,exposureTime` table.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let path = path.as_ref();
        let rows = read_rows(path, 2)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(LineTimeEntry {
                line_number: parse_field(path, row, 0)?,
                exposure_time: parse_field(path, row, 1)?,
            });
        }

        let table = Self { entries };
        if !table.is_time_ordered() {
            warn!(
                "{}: exposure times are not strictly increasing",
                path.display()
            );
        }
        debug!("Read {} line/time rows from {}", table.len(), path.display());
        Ok(table)
    }

    /// Write the table as `lineNumber,exposureTime` rows.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let mut writer = create_writer(path.as_ref(), &Self::HEADER)?;
        for entry in &self.entries {
            writer.write_record(&[
                entry.line_number.to_string(),
                entry.exposure_time.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}
