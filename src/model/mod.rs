//! Value types shared by the extraction pipeline.
//!
//! Geometry and page text describe what the PDF backend sees, raw grids
//! are what table detection returns, and the table types carry
//! normalized enrollment rows through to CSV output.

mod geometry;
mod grade;
mod grid;
mod page;
mod table;

pub use geometry::{BoundingBox, Region};
pub use grade::{Grade, ERROR_GRADE};
pub use grid::{RawGrid, SplitMode};
pub use page::{PageText, TextElement};
pub use table::{
    Counts, Field, GradeRow, MasterTable, MonthTable, NormalizedTable, ReportRow, Totals,
    OUTPUT_COLUMNS,
};
