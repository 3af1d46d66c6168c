//! The extraction pipeline for one report document.
//!
//! Per page: [`locate`] the school table, read it twice through the
//! backend, [`normalize`] the two grids into rows, repair their grades
//! with a [`GradeReconciler`] and [`check_school`] the sums. The
//! [`ReportAssembler`] collects the pages, checks them against the
//! District Total page and sorts the result.

mod assembler;
mod consistency;
mod diagnostics;
mod grades;
mod locator;
mod normalizer;

pub use assembler::{extract_document, Extraction, ReportAssembler};
pub use consistency::{check, check_district, check_school, Reconciliation, DISTRICT_TOTAL};
pub use diagnostics::{Diagnostic, Diagnostics, UnmappedGrade};
pub use grades::{canonicalize, repair_grade, GradeReconciler, GradeRule, GradeRules};
pub use locator::{locate, Located};
pub use normalizer::{
    merge_header_cells, merged_header, normalize, parse_number, single_grid, GRADE_COLUMN,
    UNUSED_COLUMN,
};
