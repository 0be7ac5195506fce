//! Row types shared by the reader, accumulator and writer

use serde::{Deserialize, Serialize};

/// One row of a tabular file.
///
/// Cells are kept exactly as read; nothing is trimmed, typed or re-encoded.
/// Empty lines in the input produce no row at all (see `RowSource`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    pub cells: Vec<String>,
}

impl Row {
    /// Create a row from its cells
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// Get a cell by column index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Number of cells in this row
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Self::new(cells)
    }
}

impl From<&csv::StringRecord> for Row {
    fn from(record: &csv::StringRecord) -> Self {
        Self::new(record.iter().map(str::to_string).collect())
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.cells.join(", "))
    }
}

/// A contiguous slice of rows read from one file
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    /// Rows in physical read order
    pub rows: Vec<Row>,
    /// True when `rows[0]` is the first row of its file
    pub starts_file: bool,
}

impl RowBatch {
    /// Create a batch
    pub fn new(rows: Vec<Row>, starts_file: bool) -> Self {
        Self { rows, starts_file }
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
