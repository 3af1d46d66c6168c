//! Raw cell grids returned by table detection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How table detection treats text that spans several columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Split text crossing column boundaries (reliable data rows, noisy headers)
    Split,
    /// Keep each text run whole (reliable headers)
    Whole,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Split => f.write_str("split"),
            SplitMode::Whole => f.write_str("unsplit"),
        }
    }
}

/// A rectangular grid of cell texts, top row first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGrid {
    rows: Vec<Vec<String>>,
}

impl RawGrid {
    /// Create a grid, padding short rows with empty cells.
    pub fn new(mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { rows }
    }

    /// Create a grid from string-like values.
    pub fn from_rows<R, S>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            rows.into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// Check if the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.column_count() == 0
    }

    /// Cell text, or `""` outside the grid.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of the first row with a non-blank cell in `column`.
    pub fn first_filled_row(&self, column: usize) -> Option<usize> {
        (0..self.rows.len()).find(|&r| !self.cell(r, column).trim().is_empty())
    }
}
