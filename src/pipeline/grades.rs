//! Grade label repair.
//!
//! Table extraction often collapses the grade labels of several rows into
//! one cell (`"5 6 7"`). The collapsed text is canonicalized and looked up
//! in a rule table; anything that still is not a grade becomes
//! [`ERROR_GRADE`].
//!
//! Rules are checked in two passes: school-specific rules first, then
//! generic ones, each in insertion order. The first matching rule wins.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Field, Grade, GradeRow, ERROR_GRADE};

use super::diagnostics::{Diagnostic, Diagnostics, UnmappedGrade};

/// One correction: collapsed cell text to grade label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRule {
    /// Canonicalized cell text to match exactly
    pub raw: String,
    /// Grade label to substitute
    pub grade: String,
    /// Schools the rule is limited to; empty for every school
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schools: Vec<String>,
    /// Report months (`YYYY-MM`) the rule is limited to; empty for every month
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub months: Vec<String>,
    /// Free-form remark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl GradeRule {
    /// A rule applying to every school.
    pub fn generic(raw: impl Into<String>, grade: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            grade: grade.into(),
            schools: Vec::new(),
            months: Vec::new(),
            note: None,
        }
    }

    /// A rule limited to the named schools.
    pub fn for_schools(schools: &[&str], raw: impl Into<String>, grade: impl Into<String>) -> Self {
        Self {
            schools: schools.iter().map(|s| s.to_string()).collect(),
            ..Self::generic(raw, grade)
        }
    }

    /// Limit the rule to the given report months.
    pub fn in_months(mut self, months: &[&str]) -> Self {
        self.months = months.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Attach a remark.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Whether the rule is limited to particular schools.
    pub fn is_school_specific(&self) -> bool {
        !self.schools.is_empty()
    }

    /// Whether the rule rewrites `value` for `school` in `month`.
    pub fn applies(&self, school: &str, month: &str, value: &str) -> bool {
        self.raw == value
            && (self.schools.is_empty() || self.schools.iter().any(|s| s == school))
            && (self.months.is_empty() || self.months.iter().any(|m| m == month))
    }

    /// Reject rules that would make repair non-idempotent or produce
    /// labels outside the vocabulary.
    fn validate(&self) -> Result<()> {
        if self.raw.trim().is_empty() {
            return Err(Error::InvalidRule("empty raw text".to_string()));
        }
        if canonicalize(&self.raw) != self.raw {
            return Err(Error::InvalidRule(format!(
                "raw text {:?} is not canonical (expected {:?})",
                self.raw,
                canonicalize(&self.raw)
            )));
        }
        if Grade::is_valid(&self.raw) || self.raw == ERROR_GRADE {
            return Err(Error::InvalidRule(format!(
                "raw text {:?} is already a grade",
                self.raw
            )));
        }
        if !Grade::is_valid(&self.grade) {
            return Err(Error::InvalidRule(format!(
                "{:?} -> {:?}: target is not a grade",
                self.raw, self.grade
            )));
        }
        if let Some(month) = self.months.iter().find(|m| !is_month(m)) {
            return Err(Error::InvalidRule(format!(
                "{:?} -> {:?}: month {:?} is not YYYY-MM",
                self.raw, self.grade, month
            )));
        }
        Ok(())
    }
}

fn is_month(value: &str) -> bool {
    value.len() == 7 && NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").is_ok()
}

/// Schools whose grade cells need corrections of their own.
const SCHOOL_RULES: &[(&[&str], &str, &str)] = &[
    (&["Non-Public Agencies"], "K Preschool", "Preschool"),
    (&["Exp Ed Unit"], "K 1 2 3 4", "K"),
    (&["Exp Ed Unit"], "K 1 2 3 4 5", "K"),
    (&["Exp Ed Unit"], "1 2 3 4 5 K", "K"),
    (&["Special Ed Private Svcs"], "K 1 Preschool", "Preschool"),
    (&["Special Ed Private Svcs"], "K 1 2 3 4 Preschool", "Preschool"),
    (&["Cascadia", "Decatur"], "K Preschool", "Preschool"),
    (&["Cascadia", "Decatur"], "K 1", "1"),
    (&["Cascadia", "Decatur"], "1 2", "2"),
];

/// Corrections for every school. Collapsed runs usually resolve to their
/// last label; `"5 6 7"` and `"8 9"` are the exceptions.
const GENERIC_RULES: &[(&str, &str)] = &[
    ("5 6 7", "5"),
    ("4 5 6", "6"),
    ("3 4 5 6", "6"),
    ("8 9", "8"),
    ("4 5 6 7 8 9", "9"),
    ("5 6 7 8 9", "9"),
    ("6 7 8 9 10", "10"),
    ("5 6 7 8 9 10", "10"),
];

/// JSON document accepted by [`GradeRules::from_json`].
#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<GradeRule>,
}

/// Ordered table of grade corrections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradeRules {
    rules: Vec<GradeRule>,
}

impl GradeRules {
    /// A table without rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The corrections known to be needed for every report.
    pub fn builtin() -> Self {
        let school = SCHOOL_RULES
            .iter()
            .map(|&(schools, raw, grade)| GradeRule::for_schools(schools, raw, grade));
        let generic = GENERIC_RULES
            .iter()
            .map(|&(raw, grade)| GradeRule::generic(raw, grade));
        Self {
            rules: school.chain(generic).collect(),
        }
    }

    /// Build a table from validated rules.
    pub fn from_rules(rules: impl IntoIterator<Item = GradeRule>) -> Result<Self> {
        let mut table = Self::empty();
        for rule in rules {
            table.push(rule)?;
        }
        Ok(table)
    }

    /// Builtin rules followed by those in a JSON document of the form
    /// `{"rules": [{"raw": "2 3 4", "grade": "4", "schools": [...], "months": [...]}]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut table = Self::builtin();
        table.extend(Self::parse_json(json)?);
        Ok(table)
    }

    /// Only the rules of a JSON document.
    pub fn parse_json(json: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(json)?;
        Self::from_rules(file.rules)
    }

    /// Builtin rules followed by those of a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Append a rule after validating it.
    pub fn push(&mut self, rule: GradeRule) -> Result<()> {
        rule.validate()?;
        self.rules.push(rule);
        Ok(())
    }

    /// Append every rule of `other`.
    pub fn extend(&mut self, other: GradeRules) {
        self.rules.extend(other.rules);
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over the rules in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, GradeRule> {
        self.rules.iter()
    }

    /// The rule rewriting `value`, school-specific rules first.
    pub fn lookup(&self, school: &str, month: &str, value: &str) -> Option<&GradeRule> {
        let applies = |r: &&GradeRule| r.applies(school, month, value);
        self.rules
            .iter()
            .filter(|r| r.is_school_specific())
            .find(applies)
            .or_else(|| self.rules.iter().filter(|r| !r.is_school_specific()).find(applies))
    }
}

/// Remove newlines, collapse whitespace and spell `State FDK` as `K`.
pub fn canonicalize(raw: &str) -> String {
    let joined: String = raw.chars().filter(|&c| c != '\n').collect();
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace("State FDK", "K")
}

/// Repair a single grade cell.
pub fn repair_grade(raw: &str, school: &str, month: &str, rules: &GradeRules) -> String {
    let value = canonicalize(raw);
    let value = match rules.lookup(school, month, &value) {
        Some(rule) => {
            log::debug!("{}: grade {:?} -> {:?}", school, value, rule.grade);
            rule.grade.clone()
        }
        None => value,
    };
    if Grade::is_valid(&value) {
        value
    } else {
        ERROR_GRADE.to_string()
    }
}

/// Applies the rule table to a school's rows.
#[derive(Debug, Clone, Copy)]
pub struct GradeReconciler<'a> {
    rules: &'a GradeRules,
    materiality_threshold: f64,
}

impl<'a> GradeReconciler<'a> {
    /// Create a reconciler.
    pub fn new(rules: &'a GradeRules, materiality_threshold: f64) -> Self {
        Self {
            rules,
            materiality_threshold,
        }
    }

    /// Repair the Grade column of `rows`.
    ///
    /// Unrecognized values always become [`ERROR_GRADE`]. They are reported
    /// only when their summed Total Student Count reaches the materiality
    /// threshold.
    pub fn reconcile(
        &self,
        mut rows: Vec<GradeRow>,
        school: &str,
        month: &str,
        pdf: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Vec<GradeRow> {
        let mut unmapped = Vec::new();
        for row in &mut rows {
            let repaired = repair_grade(&row.grade, school, month, self.rules);
            if repaired == ERROR_GRADE {
                unmapped.push(UnmappedGrade {
                    raw: canonicalize(&row.grade),
                    total_student_count: row.counts.get(Field::TotalStudentCount),
                });
            }
            row.grade = repaired;
        }

        let students: f64 = unmapped
            .iter()
            .filter_map(|u| u.total_student_count)
            .sum();
        if !unmapped.is_empty() && students >= self.materiality_threshold {
            diagnostics.push(Diagnostic::UnmappedGrades {
                pdf: pdf.to_path_buf(),
                school: school.to_string(),
                rows: unmapped,
                students,
            });
        } else if !unmapped.is_empty() {
            log::debug!(
                "{}: {} unrecognized grade(s) below materiality ({} students)",
                school,
                unmapped.len(),
                students
            );
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Counts;

    const MONTH: &str = "2024-09";

    fn repair(raw: &str, school: &str) -> String {
        repair_grade(raw, school, MONTH, &GradeRules::builtin())
    }

    fn row(grade: &str, students: f64) -> GradeRow {
        GradeRow::new(grade, Counts::default().with(Field::TotalStudentCount, students))
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("5\n6 7"), "56 7");
        assert_eq!(canonicalize("  5   6\t7 "), "5 6 7");
        assert_eq!(canonicalize("State FDK"), "K");
        assert_eq!(canonicalize("State FDK 1"), "K 1");
    }

    #[test]
    fn test_builtin_generic_rules() {
        assert_eq!(repair("5 6 7", "Adams"), "5");
        assert_eq!(repair("4 5 6", "Adams"), "6");
        assert_eq!(repair("3 4 5 6", "Adams"), "6");
        assert_eq!(repair("8 9", "Adams"), "8");
        assert_eq!(repair("4 5 6 7 8 9", "Adams"), "9");
        assert_eq!(repair("5 6 7 8 9", "Adams"), "9");
        assert_eq!(repair("6 7 8 9 10", "Adams"), "10");
        assert_eq!(repair("5 6 7 8 9 10", "Adams"), "10");
    }

    #[test]
    fn test_builtin_school_rules() {
        assert_eq!(repair("K Preschool", "Non-Public Agencies"), "Preschool");
        assert_eq!(repair("K 1 2 3 4 5", "Exp Ed Unit"), "K");
        assert_eq!(repair("1 2 3 4 5 K", "Exp Ed Unit"), "K");
        assert_eq!(repair("K 1 2 3 4 Preschool", "Special Ed Private Svcs"), "Preschool");
        assert_eq!(repair("K 1", "Cascadia"), "1");
        assert_eq!(repair("1 2", "Decatur"), "2");
        assert_eq!(repair("K Preschool", "Decatur"), "Preschool");
    }

    #[test]
    fn test_school_rules_do_not_leak() {
        assert_eq!(repair("K 1", "Adams"), ERROR_GRADE);
        assert_eq!(repair("K Preschool", "Adams"), ERROR_GRADE);
    }

    #[test]
    fn test_school_rule_before_generic() {
        let mut rules = GradeRules::builtin();
        rules
            .push(GradeRule::for_schools(&["Interagency"], "5 6 7", "7"))
            .unwrap();
        assert_eq!(repair_grade("5 6 7", "Interagency", MONTH, &rules), "7");
        assert_eq!(repair_grade("5 6 7", "Adams", MONTH, &rules), "5");
    }

    #[test]
    fn test_state_fdk_and_valid_values() {
        assert_eq!(repair("State FDK", "Adams"), "K");
        assert_eq!(repair("Preschool", "Adams"), "Preschool");
        assert_eq!(repair("Total", "Adams"), "Total");
        assert_eq!(repair("12", "Adams"), "12");
        assert_eq!(repair("2 3", "Adams"), ERROR_GRADE);
    }

    #[test]
    fn test_month_restricted_rule() {
        let rules = GradeRules::from_rules([GradeRule::for_schools(
            &["In Tandem"],
            "2 3 4",
            "4",
        )
        .in_months(&["2020-09"])])
        .unwrap();
        assert_eq!(repair_grade("2 3 4", "In Tandem", "2020-09", &rules), "4");
        assert_eq!(repair_grade("2 3 4", "In Tandem", "2020-10", &rules), ERROR_GRADE);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let rules = GradeRules::builtin();
        let schools = ["Adams", "Exp Ed Unit", "Cascadia", "Non-Public Agencies"];
        let raws = [
            "5 6 7", "K 1 2 3 4 5", "K 1", "State FDK", "K\nPreschool", "7 8 9 10 11", "", "Total",
            ERROR_GRADE,
        ];
        for school in schools {
            for raw in raws {
                let once = repair_grade(raw, school, MONTH, &rules);
                let twice = repair_grade(&once, school, MONTH, &rules);
                assert_eq!(once, twice, "{:?} at {}", raw, school);
            }
        }
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let rules = GradeRules::builtin();
        let reconciler = GradeReconciler::new(&rules, 10.0);
        let rows = vec![row("5 6 7", 40.0), row("2 3", 3.0), row("Total", 43.0)];
        let pdf = Path::new("P223_Sep24.pdf");

        let once = reconciler.reconcile(rows, "Adams", MONTH, pdf, &mut Diagnostics::new());
        let twice = reconciler.reconcile(once.clone(), "Adams", MONTH, pdf, &mut Diagnostics::new());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_materiality_below_threshold_is_silent() {
        let rules = GradeRules::builtin();
        let reconciler = GradeReconciler::new(&rules, 10.0);
        let mut diags = Diagnostics::new();
        let rows = vec![row("2 3", 4.0), row("7 8 9 10 11", 5.9), row("K", 20.0)];

        let rows = reconciler.reconcile(rows, "Adams", MONTH, Path::new("a.pdf"), &mut diags);
        assert!(diags.is_empty());
        assert_eq!(rows[0].grade, ERROR_GRADE);
        assert_eq!(rows[1].grade, ERROR_GRADE);
        assert_eq!(rows[2].grade, "K");
    }

    #[test]
    fn test_materiality_at_threshold_warns() {
        let rules = GradeRules::builtin();
        let reconciler = GradeReconciler::new(&rules, 10.0);
        let mut diags = Diagnostics::new();
        let rows = vec![row("2 3", 4.0), row("7 8 9 10 11", 6.0)];

        let rows = reconciler.reconcile(rows, "Whitman", MONTH, Path::new("a.pdf"), &mut diags);
        assert!(rows.iter().all(|r| r.grade == ERROR_GRADE));
        assert_eq!(diags.len(), 1);
        match diags.iter().next() {
            Some(Diagnostic::UnmappedGrades {
                school,
                rows,
                students,
                ..
            }) => {
                assert_eq!(school, "Whitman");
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].raw, "2 3");
                assert_eq!(*students, 10.0);
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let cases = [
            GradeRule::generic("", "K"),
            GradeRule::generic("5", "6"),
            GradeRule::generic("5  6", "6"),
            GradeRule::generic("5 6", "13"),
            GradeRule::generic("5 6", "6").in_months(&["Sep 2024"]),
        ];
        for rule in cases {
            let mut rules = GradeRules::empty();
            assert!(
                matches!(rules.push(rule.clone()), Err(Error::InvalidRule(_))),
                "{:?} should be rejected",
                rule
            );
        }
    }

    #[test]
    fn test_from_json_appends_to_builtin() {
        let json = r#"{"rules": [
            {"raw": "2 3", "grade": "3"},
            {"raw": "4 5 6 7", "grade": "7", "schools": ["Interagency"], "months": ["2022-06"]}
        ]}"#;
        let rules = GradeRules::from_json(json).unwrap();
        assert_eq!(rules.len(), GradeRules::builtin().len() + 2);
        assert_eq!(repair_grade("2 3", "Adams", MONTH, &rules), "3");
        assert_eq!(repair_grade("4 5 6 7", "Interagency", "2022-06", &rules), "7");
    }

    #[test]
    fn test_from_json_rejects_bad_documents() {
        assert!(matches!(GradeRules::from_json("[]"), Err(Error::Json(_))));
        assert!(matches!(
            GradeRules::from_json(r#"{"rules": [{"raw": "2 3", "grade": "Pre-K"}]}"#),
            Err(Error::InvalidRule(_))
        ));
    }

    #[test]
    fn test_era_corrections_file() {
        let extra = GradeRules::parse_json(include_str!("../../rules/era-corrections.json")).unwrap();
        assert_eq!(extra.len(), 6);
        assert!(extra.iter().all(|r| r.is_school_specific() && !r.months.is_empty()));

        let rules = GradeRules::from_json(include_str!("../../rules/era-corrections.json")).unwrap();
        assert_eq!(repair_grade("3 4 5 6 7", "Interagency", "2022-12", &rules), "6");
        assert_eq!(repair_grade("3 4 5 6 7", "Interagency", "2022-11", &rules), ERROR_GRADE);
    }

    #[test]
    fn test_builtin_rules_are_valid() {
        for rule in GradeRules::builtin().iter() {
            assert!(rule.validate().is_ok(), "{:?}", rule);
        }
    }
}
