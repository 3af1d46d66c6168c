//! # p223
//!
//! Enrollment table extraction for monthly P223 school-district reports.
//!
//! Each report holds one table per school. The library locates every
//! school's table on its page, rebuilds the column headers, repairs the
//! grade labels that table extraction mangles, checks the numbers against
//! the reported totals and writes flat CSV.
//!
//! ## Quick Start
//!
//! ```no_run
//! use p223::{extract_file, render, ExtractOptions};
//!
//! fn main() -> p223::Result<()> {
//!     let extraction = extract_file("input/P223_Sep24.pdf", &ExtractOptions::default())?;
//!     for diagnostic in &extraction.diagnostics {
//!         eprintln!("{}", diagnostic);
//!     }
//!     render::write_month_csv(&extraction.table, "output/p223/month/2024-09.csv")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Batch runs
//!
//! ```no_run
//! use std::sync::Arc;
//! use p223::{Batch, BatchOptions, LogProgress, LopdfLoader};
//!
//! let batch = Batch::plan(BatchOptions::default()).unwrap();
//! let summary = batch.run(Arc::new(LopdfLoader), &mut LogProgress).unwrap();
//! println!("{} documents, {} failed", summary.documents, summary.failed.len());
//! ```
//!
//! ## Features
//!
//! - **Anchor-based table location**: `School:` label to `NOTES:` footer
//! - **Dual extraction**: split grid for data rows, unsplit grid for headers
//! - **Grade rule table**: builtin corrections, extensible from JSON
//! - **Reconciliation**: school and district totals within a tolerance
//! - **Parallel processing**: Rayon across pages, worker threads across documents

pub mod batch;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod render;

// Re-export commonly used types
pub use batch::{
    month_from_filename, Batch, BatchEvent, BatchOptions, BatchSummary, DocumentTask, LogProgress,
    ProgressSink,
};
pub use detect::{detect_format_from_bytes, detect_format_from_path, is_pdf, PdfFormat};
pub use error::{Error, Result};
pub use model::{
    BoundingBox, Counts, Field, Grade, GradeRow, MasterTable, MonthTable, NormalizedTable,
    PageText, RawGrid, Region, ReportRow, SplitMode, TextElement, Totals, ERROR_GRADE,
    OUTPUT_COLUMNS,
};
pub use parser::{DocumentLoader, ExtractOptions, LopdfBackend, LopdfLoader, PdfBackend};
pub use pipeline::{Diagnostic, Diagnostics, Extraction, GradeRule, GradeRules};

use std::path::Path;

/// Extract the school tables of one report file.
///
/// The reporting month is taken from the file name.
///
/// # Example
///
/// ```no_run
/// use p223::{extract_file, ExtractOptions};
///
/// let extraction = extract_file("P223_Sep24.pdf", &ExtractOptions::default()).unwrap();
/// println!("{} rows", extraction.table.row_count());
/// ```
pub fn extract_file<P: AsRef<Path>>(path: P, options: &ExtractOptions) -> Result<Extraction> {
    let path = path.as_ref();
    let month = month_from_filename(path)?;
    extract_file_for_month(path, &month, options)
}

/// Extract one report file, labelling its rows with `month`.
pub fn extract_file_for_month<P: AsRef<Path>>(
    path: P,
    month: &str,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let path = path.as_ref();
    let backend = LopdfBackend::load_file(path)?;
    pipeline::extract_document(&backend, path, month, options)
}

/// Extract a report from memory.
pub fn extract_bytes(
    data: &[u8],
    name: &str,
    month: &str,
    options: &ExtractOptions,
) -> Result<Extraction> {
    detect_format_from_bytes(data)?;
    let backend = LopdfBackend::load_bytes(data)?;
    pipeline::extract_document(&backend, Path::new(name), month, options)
}
