//! Table grid extraction using text position analysis (Stream mode algorithm).
//!
//! Inspired by Camelot's Stream mode: the caller names the table area, rows
//! are grouped by baseline, and column extents come from the horizontal
//! ranges of text in the rows that have the most common number of spans.
//! No ruling lines are needed.

use std::collections::HashMap;

use crate::model::{RawGrid, Region, SplitMode};

use super::layout::TextSpan;

/// A row of text spans in a table.
#[derive(Debug, Clone)]
pub struct TableRowData {
    /// Y position of this row
    pub y: f32,
    /// Spans in this row, sorted by X
    pub spans: Vec<TextSpan>,
}

/// Horizontal extent of a detected column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnRange {
    /// Left boundary X coordinate
    pub left: f32,
    /// Right boundary X coordinate
    pub right: f32,
}

/// Table detector configuration.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
    /// Minimum number of columns to consider as table
    pub min_columns: usize,
    /// Y tolerance for grouping spans into rows (fraction of font size)
    pub y_tolerance_factor: f32,
    /// Text ranges closer than this (points) belong to the same column
    pub column_padding: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            y_tolerance_factor: 0.4,
            column_padding: 1.0,
        }
    }
}

/// Extracts cell grids from the text spans inside a table area.
#[derive(Debug, Clone, Default)]
pub struct TableDetector {
    config: TableDetectorConfig,
}

impl TableDetector {
    /// Create a new table detector with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new table detector with custom configuration.
    pub fn with_config(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    /// Extract the table filling `region`.
    ///
    /// Returns no grid when the region holds too few rows or columns to
    /// form a table, otherwise exactly one.
    pub fn extract(&self, spans: Vec<TextSpan>, region: &Region, mode: SplitMode) -> Vec<RawGrid> {
        let spans: Vec<TextSpan> = spans
            .into_iter()
            .filter(|s| region.contains(&s.bbox()))
            .collect();
        log::debug!("TableDetector: {} spans inside region", spans.len());

        let rows = self.group_into_rows(spans);
        if rows.len() < self.config.min_rows {
            log::debug!(
                "TableDetector: not enough rows ({} < {})",
                rows.len(),
                self.config.min_rows
            );
            return vec![];
        }

        let columns = self.detect_columns(&rows, region);
        log::debug!(
            "TableDetector: detected {} columns at {:?}",
            columns.len(),
            columns
        );
        if columns.len() < self.config.min_columns {
            return vec![];
        }

        vec![self.to_grid(&rows, &columns, mode)]
    }

    /// Group spans into rows by Y position, top row first.
    fn group_into_rows(&self, mut spans: Vec<TextSpan>) -> Vec<TableRowData> {
        spans.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

        let mut rows: Vec<TableRowData> = Vec::new();
        let mut current_row_spans: Vec<TextSpan> = Vec::new();
        let mut current_y: Option<f32> = None;

        for span in spans {
            let y_tolerance = span.font_size * self.config.y_tolerance_factor;
            match current_y {
                Some(y) if (span.y - y).abs() <= y_tolerance => current_row_spans.push(span),
                _ => {
                    if !current_row_spans.is_empty() {
                        rows.push(make_row(std::mem::take(&mut current_row_spans)));
                    }
                    current_y = Some(span.y);
                    current_row_spans.push(span);
                }
            }
        }

        if !current_row_spans.is_empty() {
            rows.push(make_row(current_row_spans));
        }

        rows
    }

    /// Detect column ranges.
    ///
    /// 1. Find the most common span count among rows with enough spans
    /// 2. Merge the horizontal ranges of those rows' spans
    /// 3. Widen each range to the midpoint of its neighbours' gaps, the
    ///    outer ones to the region edges
    fn detect_columns(&self, rows: &[TableRowData], region: &Region) -> Vec<ColumnRange> {
        let mut count_frequency: HashMap<usize, usize> = HashMap::new();
        for row in rows.iter().filter(|r| r.spans.len() >= self.config.min_columns) {
            *count_frequency.entry(row.spans.len()).or_insert(0) += 1;
        }

        // Most frequent; ties go to the wider row
        let Some((modal_count, _)) = count_frequency
            .into_iter()
            .max_by_key(|&(count, frequency)| (frequency, count))
        else {
            return vec![];
        };

        let mut ranges: Vec<(f32, f32)> = rows
            .iter()
            .filter(|r| r.spans.len() == modal_count)
            .flat_map(|r| r.spans.iter().map(|s| (s.x, s.right())))
            .collect();
        ranges.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f32, f32)> = Vec::new();
        for (left, right) in ranges {
            match merged.last_mut() {
                Some(last) if left <= last.1 + self.config.column_padding => {
                    last.1 = last.1.max(right);
                }
                _ => merged.push((left, right)),
            }
        }

        let count = merged.len();
        (0..count)
            .map(|i| ColumnRange {
                left: if i == 0 {
                    region.left
                } else {
                    (merged[i - 1].1 + merged[i].0) / 2.0
                },
                right: if i + 1 == count {
                    region.right
                } else {
                    (merged[i].1 + merged[i + 1].0) / 2.0
                },
            })
            .collect()
    }

    /// Lay the rows out as cells.
    fn to_grid(&self, rows: &[TableRowData], columns: &[ColumnRange], mode: SplitMode) -> RawGrid {
        let grid_rows = rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Vec<String>> = vec![Vec::new(); columns.len()];

                for span in &row.spans {
                    let first = column_at(columns, span.x);
                    let last = column_at(columns, span.right() - 0.01);

                    if mode == SplitMode::Whole || first == last {
                        let col = column_at(columns, span.x + span.width / 2.0);
                        push_text(&mut cells[col], &span.text);
                        continue;
                    }

                    for (token, left, right) in tokens_with_extent(span) {
                        let col = column_at(columns, (left + right) / 2.0);
                        push_text(&mut cells[col], token);
                    }
                }

                cells.into_iter().map(|parts| parts.join(" ")).collect()
            })
            .collect();

        RawGrid::new(grid_rows)
    }
}

fn make_row(spans: Vec<TextSpan>) -> TableRowData {
    let y = spans.iter().map(|s| s.y).sum::<f32>() / spans.len() as f32;
    let mut spans = spans;
    spans.sort_by(|a, b| a.x.total_cmp(&b.x));
    TableRowData { y, spans }
}

fn push_text(cell: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        cell.push(text.to_string());
    }
}

/// Index of the column containing `x`; positions past the last boundary
/// belong to the last column.
fn column_at(columns: &[ColumnRange], x: f32) -> usize {
    columns
        .iter()
        .position(|c| x < c.right)
        .unwrap_or(columns.len().saturating_sub(1))
}

/// Whitespace-separated tokens of a span with their estimated extents.
fn tokens_with_extent(span: &TextSpan) -> Vec<(&str, f32, f32)> {
    let char_count = span.text.chars().count().max(1);
    let char_width = span.width / char_count as f32;

    let mut tokens = Vec::new();
    let mut start: Option<(usize, usize)> = None; // (byte index, char index)
    for (char_idx, (byte_idx, c)) in span.text.char_indices().enumerate() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some((byte_idx, char_idx)),
            (true, Some((b, ci))) => {
                let left = span.x + ci as f32 * char_width;
                let right = span.x + char_idx as f32 * char_width;
                tokens.push((&span.text[b..byte_idx], left, right));
                start = None;
            }
            _ => {}
        }
    }
    if let Some((b, ci)) = start {
        let left = span.x + ci as f32 * char_width;
        tokens.push((&span.text[b..], left, span.right()));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_span(text: &str, x: f32, y: f32) -> TextSpan {
        TextSpan::new(text, x, y, 10.0, "Helvetica".to_string())
    }

    fn region() -> Region {
        Region::new(0.0, 720.0, 300.0, 600.0)
    }

    fn sample_spans() -> Vec<TextSpan> {
        vec![
            make_span("Grade", 50.0, 700.0),
            make_span("Male", 150.0, 700.0),
            make_span("K", 50.0, 685.0),
            make_span("10", 160.0, 685.0),
            make_span("1", 50.0, 670.0),
            make_span("12", 160.0, 670.0),
            make_span("2", 50.0, 655.0),
            make_span("14", 160.0, 655.0),
            // Crosses the column boundary at 112.5
            make_span("3        16", 100.0, 640.0),
        ]
    }

    #[test]
    fn test_group_into_rows() {
        let detector = TableDetector::new();
        let rows = detector.group_into_rows(sample_spans());
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].spans.len(), 2);
        assert_eq!(rows[0].spans[0].text, "Grade");
        assert_eq!(rows[4].spans.len(), 1);
    }

    #[test]
    fn test_detect_columns() {
        let detector = TableDetector::new();
        let rows = detector.group_into_rows(sample_spans());
        let columns = detector.detect_columns(&rows, &region());
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].left, 0.0);
        assert_eq!(columns[0].right, 112.5);
        assert_eq!(columns[1].right, 300.0);
        assert_eq!(columns[1].left, 112.5);
    }

    #[test]
    fn test_split_mode_splits_crossing_spans() {
        let detector = TableDetector::new();
        let grids = detector.extract(sample_spans(), &region(), SplitMode::Split);
        assert_eq!(grids.len(), 1);
        let grid = &grids[0];
        assert_eq!(grid.row_count(), 5);
        assert_eq!(grid.cell(0, 0), "Grade");
        assert_eq!(grid.cell(1, 1), "10");
        assert_eq!(grid.cell(4, 0), "3");
        assert_eq!(grid.cell(4, 1), "16");
    }

    #[test]
    fn test_whole_mode_keeps_spans_together() {
        let detector = TableDetector::new();
        let grids = detector.extract(sample_spans(), &region(), SplitMode::Whole);
        let grid = &grids[0];
        assert_eq!(grid.cell(4, 0), "");
        assert_eq!(grid.cell(4, 1), "3        16");
    }

    #[test]
    fn test_spans_outside_region_ignored() {
        let detector = TableDetector::new();
        let mut spans = sample_spans();
        spans.push(make_span("School: Adams", 20.0, 740.0));
        spans.push(make_span("NOTES:", 20.0, 580.0));
        let grids = detector.extract(spans, &region(), SplitMode::Split);
        assert_eq!(grids[0].row_count(), 5);
    }

    #[test]
    fn test_no_table_single_column() {
        let detector = TableDetector::new();
        let spans = vec![
            make_span("Line 1", 10.0, 700.0),
            make_span("Line 2", 10.0, 685.0),
            make_span("Line 3", 10.0, 670.0),
        ];
        assert!(detector.extract(spans, &region(), SplitMode::Split).is_empty());
    }

    #[test]
    fn test_no_table_empty_region() {
        let detector = TableDetector::new();
        assert!(detector
            .extract(Vec::new(), &region(), SplitMode::Whole)
            .is_empty());
    }

    #[test]
    fn test_tokens_with_extent() {
        let span = make_span("K 12", 0.0, 0.0);
        let tokens = tokens_with_extent(&span);
        assert_eq!(tokens, vec![("K", 0.0_f32, 5.0_f32), ("12", 10.0, 20.0)]);
    }
}
