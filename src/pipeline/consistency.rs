//! Checks that detail rows add up to their reported totals.

use std::path::Path;

use crate::model::{Counts, Field, GradeRow, NormalizedTable, Totals};

use super::diagnostics::{Diagnostic, Diagnostics};

/// School name of the district rollup page.
pub const DISTRICT_TOTAL: &str = "District Total";

/// Outcome of comparing summed detail rows against summed total rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Per-field sums of the detail rows
    pub sums: Totals,
    /// Per-field sums of the total rows
    pub totals: Totals,
    /// Fields differing by more than the tolerance
    pub mismatched: Vec<Field>,
}

impl Reconciliation {
    /// Whether every field is within tolerance.
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty()
    }
}

/// Compare the field sums of `parts` against those of `totals`.
pub fn check<'a>(
    parts: impl IntoIterator<Item = &'a Counts>,
    totals: impl IntoIterator<Item = &'a Counts>,
    tolerance: f64,
) -> Reconciliation {
    let sums = Totals::sum(parts);
    let totals = Totals::sum(totals);
    let mismatched = sums.mismatches(&totals, tolerance);
    Reconciliation {
        sums,
        totals,
        mismatched,
    }
}

/// Compare a school's grade rows against its Total row.
///
/// A mismatch is recorded in `diagnostics`; the rows are used regardless.
pub fn check_school(
    rows: &[GradeRow],
    school: &str,
    pdf: &Path,
    tolerance: f64,
    diagnostics: &mut Diagnostics,
) -> bool {
    let (totals, grades): (Vec<&GradeRow>, Vec<&GradeRow>) = rows.iter().partition(|r| r.is_total());
    let result = check(
        grades.iter().map(|r| &r.counts),
        totals.iter().map(|r| &r.counts),
        tolerance,
    );
    if result.is_ok() {
        return true;
    }
    diagnostics.push(Diagnostic::SchoolMismatch {
        pdf: pdf.to_path_buf(),
        school: school.to_string(),
        mismatched: result.mismatched,
        sums: result.sums,
        totals: result.totals,
    });
    false
}

/// Compare every school's rows against the District Total rows.
///
/// Documents without a District Total table are not checked.
pub fn check_district(
    tables: &[NormalizedTable],
    pdf: &Path,
    tolerance: f64,
    diagnostics: &mut Diagnostics,
) -> bool {
    if !tables.iter().any(|t| t.school == DISTRICT_TOTAL) {
        log::debug!("{}: no {} table, district check skipped", pdf.display(), DISTRICT_TOTAL);
        return true;
    }
    let result = check(
        district_counts(tables, false),
        district_counts(tables, true),
        tolerance,
    );
    if result.is_ok() {
        return true;
    }
    diagnostics.push(Diagnostic::DistrictMismatch {
        pdf: pdf.to_path_buf(),
        mismatched: result.mismatched,
        sums: result.sums,
        totals: result.totals,
    });
    false
}

/// Counts of the District Total rows, or of every other school's rows.
fn district_counts(tables: &[NormalizedTable], district: bool) -> impl Iterator<Item = &Counts> {
    tables
        .iter()
        .filter(move |t| (t.school == DISTRICT_TOTAL) == district)
        .flat_map(|t| t.rows.iter().map(|r| &r.counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(base: f64) -> Counts {
        Counts::from_values([base, 1.0, 2.0, base / 2.0, base / 2.0, 0.0, base, base, base - 0.5])
    }

    fn add(a: &Counts, b: &Counts) -> Counts {
        let mut sum = Counts::default();
        for field in Field::ALL {
            sum.set(field, Some(a.get(field).unwrap_or(0.0) + b.get(field).unwrap_or(0.0)));
        }
        sum
    }

    fn school_rows() -> Vec<GradeRow> {
        let k = counts(20.0);
        let first = counts(30.0);
        let total = add(&k, &first);
        vec![
            GradeRow::new("K", k),
            GradeRow::new("1", first),
            GradeRow::new("Total", total),
        ]
    }

    #[test]
    fn test_exact_sums_reconcile() {
        let mut diags = Diagnostics::new();
        assert!(check_school(&school_rows(), "Adams", Path::new("a.pdf"), 0.1, &mut diags));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_within_tolerance_reconciles() {
        let mut rows = school_rows();
        let fte = rows[0].counts.get(Field::P223TotalFte).unwrap_or(0.0);
        rows[0].counts.set(Field::P223TotalFte, Some(fte + 0.05));
        let mut diags = Diagnostics::new();
        assert!(check_school(&rows, "Adams", Path::new("a.pdf"), 0.1, &mut diags));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_perturbed_field_warns_naming_school() {
        for field in Field::ALL {
            let mut rows = school_rows();
            let value = rows[1].counts.get(field).unwrap_or(0.0);
            rows[1].counts.set(field, Some(value + 0.11));

            let mut diags = Diagnostics::new();
            assert!(!check_school(&rows, "Adams", Path::new("a.pdf"), 0.1, &mut diags));
            assert_eq!(diags.len(), 1);
            match diags.iter().next() {
                Some(Diagnostic::SchoolMismatch {
                    school, mismatched, ..
                }) => {
                    assert_eq!(school, "Adams");
                    assert_eq!(mismatched, &vec![field]);
                }
                other => panic!("unexpected diagnostic {:?}", other),
            }
        }
    }

    #[test]
    fn test_missing_total_row_mismatches() {
        let rows = vec![GradeRow::new("K", counts(20.0))];
        let mut diags = Diagnostics::new();
        assert!(!check_school(&rows, "Adams", Path::new("a.pdf"), 0.1, &mut diags));
        assert_eq!(diags.count_kind("school_mismatch"), 1);
    }

    #[test]
    fn test_absent_values_count_as_zero() {
        let mut grade = Counts::default();
        grade.set(Field::Male, Some(5.0));
        let result = check([&grade], [&Counts::default().with(Field::Male, 5.0)], 0.1);
        assert!(result.is_ok());
        assert_eq!(result.sums.get(Field::Female), 0.0);
    }

    #[test]
    fn test_district_check() {
        let adams = NormalizedTable::new("Adams", vec![GradeRow::new("K", counts(20.0))]);
        let whitman = NormalizedTable::new("Whitman", vec![GradeRow::new("6", counts(30.0))]);
        let district = NormalizedTable::new(
            DISTRICT_TOTAL,
            vec![GradeRow::new("K", counts(20.0)), GradeRow::new("6", counts(30.0))],
        );
        let tables = vec![adams, district, whitman];

        let mut diags = Diagnostics::new();
        assert!(check_district(&tables, Path::new("a.pdf"), 0.1, &mut diags));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_district_check_needs_district_table() {
        let adams = NormalizedTable::new("Adams", vec![GradeRow::new("K", counts(20.0))]);
        let mut diags = Diagnostics::new();
        assert!(check_district(&[adams], Path::new("a.pdf"), 0.1, &mut diags));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_district_mismatch_reports_once() {
        let adams = NormalizedTable::new("Adams", vec![GradeRow::new("K", counts(20.0))]);
        let district = NormalizedTable::new(
            DISTRICT_TOTAL,
            vec![GradeRow::new("K", counts(20.0).with(Field::Male, 15.0))],
        );

        let mut diags = Diagnostics::new();
        assert!(!check_district(&[adams, district], Path::new("a.pdf"), 0.1, &mut diags));
        assert_eq!(diags.len(), 1);
        match diags.iter().next() {
            Some(Diagnostic::DistrictMismatch { mismatched, .. }) => {
                assert_eq!(mismatched, &vec![Field::Male]);
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }
}
