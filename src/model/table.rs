//! Enrollment table types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The nine numeric columns of a P223 school table, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    RegularProgram,
    BilingualServed,
    SpecEdServed,
    Male,
    Female,
    NonBinary,
    TotalStudentCount,
    P223TotalCount,
    P223TotalFte,
}

impl Field {
    /// All fields in column order.
    pub const ALL: [Field; 9] = [
        Field::RegularProgram,
        Field::BilingualServed,
        Field::SpecEdServed,
        Field::Male,
        Field::Female,
        Field::NonBinary,
        Field::TotalStudentCount,
        Field::P223TotalCount,
        Field::P223TotalFte,
    ];

    /// Column name as printed in the report header.
    pub fn name(self) -> &'static str {
        match self {
            Field::RegularProgram => "Regular Program",
            Field::BilingualServed => "Bilingual Served",
            Field::SpecEdServed => "Spec. Ed. Served",
            Field::Male => "Male",
            Field::Female => "Female",
            Field::NonBinary => "Non-Binary",
            Field::TotalStudentCount => "Total Student Count",
            Field::P223TotalCount => "P223 Total Count",
            Field::P223TotalFte => "P223 Total FTE",
        }
    }

    /// Look a field up by its column name.
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output column order shared by month and master CSVs.
pub const OUTPUT_COLUMNS: [&str; 12] = [
    "Month",
    "School",
    "Grade",
    "Regular Program",
    "Bilingual Served",
    "Spec. Ed. Served",
    "Male",
    "Female",
    "Non-Binary",
    "Total Student Count",
    "P223 Total Count",
    "P223 Total FTE",
];

/// Values of the nine numeric fields for one row. Blank cells are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Counts([Option<f64>; 9]);

impl Counts {
    /// Counts with every field present.
    pub fn from_values(values: [f64; 9]) -> Self {
        Self(values.map(Some))
    }

    /// Value of a field.
    pub fn get(&self, field: Field) -> Option<f64> {
        self.0[field.index()]
    }

    /// Set a field.
    pub fn set(&mut self, field: Field, value: Option<f64>) {
        self.0[field.index()] = value;
    }

    /// Builder-style variant of [`Counts::set`].
    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }

    /// Values in column order.
    pub fn values(&self) -> &[Option<f64>; 9] {
        &self.0
    }
}

/// Per-field sums over a set of rows. Absent values contribute nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals([f64; 9]);

impl Totals {
    /// Sum the counts of every row.
    pub fn sum<'a>(counts: impl IntoIterator<Item = &'a Counts>) -> Self {
        let mut totals = Self::default();
        for c in counts {
            totals.add(c);
        }
        totals
    }

    /// Add one row's counts.
    pub fn add(&mut self, counts: &Counts) {
        for (total, value) in self.0.iter_mut().zip(counts.values()) {
            *total += value.unwrap_or(0.0);
        }
    }

    /// Sum for a field.
    pub fn get(&self, field: Field) -> f64 {
        self.0[field.index()]
    }

    /// Fields whose sums differ from `other` by more than `tolerance`.
    pub fn mismatches(&self, other: &Totals, tolerance: f64) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|&f| (self.get(f) - other.get(f)).abs() > tolerance)
            .collect()
    }
}

/// One row of a normalized table, before the school is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRow {
    /// Grade label (raw until reconciled)
    pub grade: String,
    /// Numeric fields
    pub counts: Counts,
}

impl GradeRow {
    /// Create a row.
    pub fn new(grade: impl Into<String>, counts: Counts) -> Self {
        Self {
            grade: grade.into(),
            counts,
        }
    }

    /// Whether this is a school rollup row.
    pub fn is_total(&self) -> bool {
        self.grade == "Total"
    }
}

/// One school's table as recovered from a single page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    /// School name (empty when the page carried none)
    pub school: String,
    /// Grade cohort rows, plus the school's Total row until it is dropped
    pub rows: Vec<GradeRow>,
}

impl NormalizedTable {
    /// Create a table.
    pub fn new(school: impl Into<String>, rows: Vec<GradeRow>) -> Self {
        Self {
            school: school.into(),
            rows,
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Drop rollup rows.
    pub fn without_totals(mut self) -> Self {
        self.rows.retain(|r| !r.is_total());
        self
    }
}

/// A fully attributed output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Reporting month, `YYYY-MM`
    pub month: String,
    /// School name
    pub school: String,
    /// Grade label or the error sentinel
    pub grade: String,
    /// Numeric fields
    pub counts: Counts,
}

/// All rows extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthTable {
    /// Reporting month, `YYYY-MM`
    pub month: String,
    /// Rows sorted by school
    pub rows: Vec<ReportRow>,
}

impl MonthTable {
    /// Build a month table from per-school tables, sorted by school name.
    ///
    /// The sort is stable so grade order within a school is preserved.
    pub fn from_schools(month: impl Into<String>, tables: Vec<NormalizedTable>) -> Self {
        let month = month.into();
        let mut rows: Vec<ReportRow> = tables
            .into_iter()
            .flat_map(|t| {
                let school = t.school;
                let month = month.clone();
                t.rows.into_iter().map(move |r| ReportRow {
                    month: month.clone(),
                    school: school.clone(),
                    grade: r.grade,
                    counts: r.counts,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.school.cmp(&b.school));
        Self { month, rows }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rows from every document, sorted by (month, school).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterTable {
    /// Rows
    pub rows: Vec<ReportRow>,
}

impl MasterTable {
    /// Concatenate month tables and sort by (month, school).
    pub fn from_months(months: impl IntoIterator<Item = MonthTable>) -> Self {
        let mut rows: Vec<ReportRow> = months.into_iter().flat_map(|m| m.rows).collect();
        rows.sort_by(|a, b| (&a.month, &a.school).cmp(&(&b.month, &b.school)));
        Self { rows }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(grade: &str, total: f64) -> GradeRow {
        GradeRow::new(grade, Counts::default().with(Field::TotalStudentCount, total))
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("Grade"), None);
        assert_eq!(&OUTPUT_COLUMNS[3..], Field::ALL.map(Field::name).as_slice());
    }

    #[test]
    fn test_totals_skip_absent_values() {
        let a = Counts::from_values([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.5]);
        let mut b = Counts::default();
        b.set(Field::Male, Some(10.0));

        let totals = Totals::sum([&a, &b]);
        assert_eq!(totals.get(Field::Male), 14.0);
        assert_eq!(totals.get(Field::Female), 5.0);
        assert_eq!(totals.get(Field::P223TotalFte), 9.5);
    }

    #[test]
    fn test_totals_mismatches() {
        let a = Totals::sum([&Counts::default().with(Field::Male, 10.0)]);
        let b = Totals::sum([&Counts::default().with(Field::Male, 10.05)]);
        assert!(a.mismatches(&b, 0.1).is_empty());

        let c = Totals::sum([&Counts::default().with(Field::Male, 10.2)]);
        assert_eq!(a.mismatches(&c, 0.1), vec![Field::Male]);
    }

    #[test]
    fn test_without_totals() {
        let table = NormalizedTable::new("Adams", vec![row("K", 20.0), row("Total", 20.0)]);
        let table = table.without_totals();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.rows[0].grade, "K");
    }

    #[test]
    fn test_month_table_sorted_stably() {
        let tables = vec![
            NormalizedTable::new("Whitman", vec![row("6", 1.0), row("7", 2.0)]),
            NormalizedTable::new("Adams", vec![row("K", 3.0), row("1", 4.0)]),
        ];
        let month = MonthTable::from_schools("2024-09", tables);
        let order: Vec<(&str, &str)> = month
            .rows
            .iter()
            .map(|r| (r.school.as_str(), r.grade.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("Adams", "K"), ("Adams", "1"), ("Whitman", "6"), ("Whitman", "7")]
        );
        assert!(month.rows.iter().all(|r| r.month == "2024-09"));
    }

    #[test]
    fn test_master_table_sorted_by_month_then_school() {
        let oct = MonthTable::from_schools(
            "2024-10",
            vec![NormalizedTable::new("Adams", vec![row("K", 1.0)])],
        );
        let sep = MonthTable::from_schools(
            "2024-09",
            vec![
                NormalizedTable::new("Whitman", vec![row("6", 1.0)]),
                NormalizedTable::new("Adams", vec![row("K", 1.0)]),
            ],
        );
        let master = MasterTable::from_months(vec![oct, sep]);
        let keys: Vec<(&str, &str)> = master
            .rows
            .iter()
            .map(|r| (r.month.as_str(), r.school.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-09", "Adams"),
                ("2024-09", "Whitman"),
                ("2024-10", "Adams")
            ]
        );
    }
}
