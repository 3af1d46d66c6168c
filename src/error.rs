//! Error types for the p223 library.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::model::SplitMode;

/// Result type alias for p223 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while extracting P223 reports.
///
/// Variants fall into three severities. [`Error::InvalidFileName`] is fatal
/// to a batch run. Page-level variants (see [`Error::is_page_skippable`])
/// cost one school's table and are turned into diagnostics by the
/// assembler. Everything else costs one document.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// A report filename does not carry a `P223_<Mon><YY>.pdf` month.
    #[error("Unable to determine month and year from filename: '{0}'")]
    InvalidFileName(String),

    /// A text anchor delimiting the table region was not found (or was ambiguous).
    #[error("Could not find '{0}' anchor")]
    AnchorMissing(&'static str),

    /// Table detection returned nothing for the region.
    #[error("Could not read table from region")]
    NoTable,

    /// Table detection returned more than one candidate for the region.
    #[error("Found {0} tables in region, expected one")]
    MultipleTables(usize),

    /// No row in the grid carries a value in the Grade column.
    #[error("No data rows in {0} grid")]
    MissingDataRows(SplitMode),

    /// Data starts on the first row, leaving nothing to build column names from.
    #[error("No header rows above the first data row")]
    MissingHeader,

    /// A required column name was not produced by the header merge.
    #[error("Missing column '{0}'")]
    MissingColumn(String),

    /// No page of a document produced a table.
    #[error("No tables extracted from '{}'", .0.display())]
    NoTables(PathBuf),

    /// A grade rule file could not be understood.
    #[error("Invalid grade rule: {0}")]
    InvalidRule(String),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A CSV file does not have the expected layout.
    #[error("Invalid CSV: {0}")]
    InvalidCsv(String),

    /// Extraction of a document panicked.
    #[error("Extraction panicked: {0}")]
    Panicked(String),

    /// No worker reported progress within the stall timeout.
    #[error("No progress from workers for {0:?}")]
    Stalled(Duration),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error only invalidates the current page.
    ///
    /// During page extraction a parse error comes from that page's content
    /// stream; documents that fail to load are reported by the loader.
    pub fn is_page_skippable(&self) -> bool {
        matches!(
            self,
            Error::PdfParse(_)
                | Error::AnchorMissing(_)
                | Error::NoTable
                | Error::MultipleTables(_)
                | Error::MissingDataRows(_)
                | Error::MissingHeader
                | Error::MissingColumn(_)
                | Error::PageOutOfRange(..)
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::PdfParse(err.to_string()),
        }
    }
}
