//! Drives the pipeline over the pages of one document.

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{MonthTable, NormalizedTable, SplitMode};
use crate::parser::{ExtractOptions, PdfBackend};

use super::consistency::{check_district, check_school, DISTRICT_TOTAL};
use super::diagnostics::{Diagnostic, Diagnostics};
use super::grades::GradeReconciler;
use super::locator::locate;
use super::normalizer::{normalize, single_grid};

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    /// Rows of every school, sorted by school
    pub table: MonthTable,
    /// Findings in page order, followed by document-level ones
    pub diagnostics: Diagnostics,
    /// Pages that produced a school table
    pub pages_used: u32,
    /// Pages skipped because their table could not be read
    pub pages_skipped: u32,
}

/// Extracts the school tables of one document.
pub struct ReportAssembler<'a> {
    backend: &'a dyn PdfBackend,
    pdf: &'a Path,
    month: &'a str,
    options: &'a ExtractOptions,
}

impl<'a> ReportAssembler<'a> {
    /// Create an assembler for the document `pdf`, reporting `month`.
    pub fn new(
        backend: &'a dyn PdfBackend,
        pdf: &'a Path,
        month: &'a str,
        options: &'a ExtractOptions,
    ) -> Self {
        Self {
            backend,
            pdf,
            month,
            options,
        }
    }

    /// Run the pipeline on every table page.
    ///
    /// Pages whose table cannot be located or read are skipped with a
    /// diagnostic. Fails when no page produced a table.
    pub fn assemble(&self) -> Result<Extraction> {
        let first = self.options.first_table_page;
        let last = self.backend.page_count();
        log::info!(
            "{}: extracting pages {}..={} for {}",
            self.pdf.display(),
            first,
            last,
            self.month
        );

        let outcomes: Vec<Result<(Option<NormalizedTable>, Diagnostics)>> = if self.options.parallel {
            (first..=last)
                .into_par_iter()
                .map(|page| self.process_page(page))
                .collect()
        } else {
            (first..=last).map(|page| self.process_page(page)).collect()
        };

        let mut extraction = Extraction::default();
        let mut tables = Vec::new();
        for outcome in outcomes {
            let (table, diagnostics) = outcome?;
            extraction.diagnostics.append(diagnostics);
            match table {
                Some(table) => {
                    extraction.pages_used += 1;
                    tables.push(table);
                }
                None => extraction.pages_skipped += 1,
            }
        }

        if tables.is_empty() {
            return Err(Error::NoTables(self.pdf.to_path_buf()));
        }

        check_district(
            &tables,
            self.pdf,
            self.options.tolerance,
            &mut extraction.diagnostics,
        );
        tables.retain(|t| t.school != DISTRICT_TOTAL);

        extraction.table = MonthTable::from_schools(self.month, tables);
        log::info!(
            "{}: {} rows from {} pages ({} skipped)",
            self.pdf.display(),
            extraction.table.row_count(),
            extraction.pages_used,
            extraction.pages_skipped
        );
        Ok(extraction)
    }

    /// Extract one page, turning page-level failures into a diagnostic.
    fn process_page(&self, page: u32) -> Result<(Option<NormalizedTable>, Diagnostics)> {
        let mut diagnostics = Diagnostics::new();
        match self.extract_page(page, &mut diagnostics) {
            Ok(table) => Ok((Some(table), diagnostics)),
            Err(e) if e.is_page_skippable() => {
                diagnostics.push(Diagnostic::PageSkipped {
                    pdf: self.pdf.to_path_buf(),
                    page,
                    reason: e.to_string(),
                });
                Ok((None, diagnostics))
            }
            Err(e) => Err(e),
        }
    }

    fn extract_page(&self, page: u32, diagnostics: &mut Diagnostics) -> Result<NormalizedTable> {
        let text = self.backend.page_text(page)?;
        let located = locate(&text, self.pdf, diagnostics)?;

        let split = single_grid(
            self.backend
                .extract_grids(page, &located.region, SplitMode::Split)?,
        )?;
        let unsplit = single_grid(
            self.backend
                .extract_grids(page, &located.region, SplitMode::Whole)?,
        )?;

        let rows = normalize(&split, &unsplit)?;
        let reconciler =
            GradeReconciler::new(&self.options.grade_rules, self.options.materiality_threshold);
        let rows = reconciler.reconcile(rows, &located.school, self.month, self.pdf, diagnostics);

        check_school(
            &rows,
            &located.school,
            self.pdf,
            self.options.tolerance,
            diagnostics,
        );

        Ok(NormalizedTable::new(located.school, rows).without_totals())
    }
}

/// Extract one document through `backend`.
pub fn extract_document(
    backend: &dyn PdfBackend,
    pdf: &Path,
    month: &str,
    options: &ExtractOptions,
) -> Result<Extraction> {
    ReportAssembler::new(backend, pdf, month, options).assemble()
}
