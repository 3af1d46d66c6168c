//! Non-fatal findings collected while extracting a document.
//!
//! Every finding is logged at `warn` level when it is recorded and is also
//! kept as data so callers can count, print or serialize it.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::model::{Field, Totals};
use crate::render::format_number;

/// A grade value that could not be mapped onto the vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedGrade {
    /// Grade text after canonicalization
    pub raw: String,
    /// Total Student Count of the row
    pub total_student_count: Option<f64>,
}

/// A single data-quality finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A page was skipped because its table could not be located or read.
    PageSkipped {
        pdf: PathBuf,
        page: u32,
        reason: String,
    },
    /// The school anchor was found but carried no name.
    MissingSchoolName { pdf: PathBuf, page: u32 },
    /// A school's grade rows do not add up to its Total row.
    SchoolMismatch {
        pdf: PathBuf,
        school: String,
        mismatched: Vec<Field>,
        sums: Totals,
        totals: Totals,
    },
    /// The school Total rows do not add up to the District Total row.
    DistrictMismatch {
        pdf: PathBuf,
        mismatched: Vec<Field>,
        sums: Totals,
        totals: Totals,
    },
    /// Unrecognized grades whose student count reached the materiality threshold.
    UnmappedGrades {
        pdf: PathBuf,
        school: String,
        rows: Vec<UnmappedGrade>,
        students: f64,
    },
}

impl Diagnostic {
    /// Short machine-friendly name of the finding.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::PageSkipped { .. } => "page_skipped",
            Diagnostic::MissingSchoolName { .. } => "missing_school_name",
            Diagnostic::SchoolMismatch { .. } => "school_mismatch",
            Diagnostic::DistrictMismatch { .. } => "district_mismatch",
            Diagnostic::UnmappedGrades { .. } => "unmapped_grades",
        }
    }

    /// School the finding is about, when there is one.
    pub fn school(&self) -> Option<&str> {
        match self {
            Diagnostic::SchoolMismatch { school, .. } | Diagnostic::UnmappedGrades { school, .. } => {
                Some(school)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::PageSkipped { pdf, page, reason } => {
                write!(f, "{} page {}: skipped: {}", pdf.display(), page, reason)
            }
            Diagnostic::MissingSchoolName { pdf, page } => write!(
                f,
                "{} page {}: no school name next to the School: anchor",
                pdf.display(),
                page
            ),
            Diagnostic::SchoolMismatch {
                pdf,
                school,
                mismatched,
                sums,
                totals,
            } => {
                writeln!(
                    f,
                    "{}: grade rows of '{}' do not reconcile with its Total row",
                    pdf.display(),
                    school
                )?;
                write_side_by_side(f, "Grades", sums, "Total", totals, mismatched)
            }
            Diagnostic::DistrictMismatch {
                pdf,
                mismatched,
                sums,
                totals,
            } => {
                writeln!(
                    f,
                    "{}: school totals do not reconcile with the District Total row",
                    pdf.display()
                )?;
                write_side_by_side(f, "Schools", sums, "District", totals, mismatched)
            }
            Diagnostic::UnmappedGrades {
                pdf,
                school,
                rows,
                students,
            } => {
                write!(
                    f,
                    "{}: {} unrecognized grade value(s) covering {} students at '{}'",
                    pdf.display(),
                    rows.len(),
                    format_number(*students),
                    school
                )?;
                for row in rows {
                    let count = row
                        .total_student_count
                        .map(format_number)
                        .unwrap_or_default();
                    write!(f, "\n  {:?} (Total Student Count {})", row.raw, count)?;
                }
                Ok(())
            }
        }
    }
}

fn write_side_by_side(
    f: &mut fmt::Formatter<'_>,
    left_label: &str,
    left: &Totals,
    right_label: &str,
    right: &Totals,
    mismatched: &[Field],
) -> fmt::Result {
    write!(f, "  {:<22}{:>12}{:>12}", "", left_label, right_label)?;
    for field in Field::ALL {
        let marker = if mismatched.contains(&field) { " *" } else { "" };
        write!(
            f,
            "\n  {:<22}{:>12}{:>12}{}",
            field.name(),
            format_number(left.get(field)),
            format_number(right.get(field)),
            marker
        )?;
    }
    Ok(())
}

/// Ordered collection of findings for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding and log it.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Append findings that were already logged when they were recorded.
    pub fn append(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Number of findings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over findings in the order they were recorded.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Number of findings of the given kind.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.entries.iter().filter(|d| d.kind() == kind).count()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
