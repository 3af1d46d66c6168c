//! Extraction options and configuration.

use crate::pipeline::GradeRules;

/// Options for extracting one report document.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Absolute tolerance when comparing summed rows against a Total row
    pub tolerance: f64,

    /// Summed Total Student Count of unmapped grades at which a warning is raised
    pub materiality_threshold: f64,

    /// First page (1-indexed) that carries a school table
    pub first_table_page: u32,

    /// Whether to process pages in parallel
    pub parallel: bool,

    /// Grade correction rules
    pub grade_rules: GradeRules,
}

impl ExtractOptions {
    /// Create new extract options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconciliation tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the materiality threshold for unmapped grades.
    pub fn with_materiality_threshold(mut self, threshold: f64) -> Self {
        self.materiality_threshold = threshold;
        self
    }

    /// Set the first page holding a school table.
    pub fn with_first_table_page(mut self, page: u32) -> Self {
        self.first_table_page = page.max(1);
        self
    }

    /// Enable or disable parallel processing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Replace the grade correction rules.
    pub fn with_grade_rules(mut self, rules: GradeRules) -> Self {
        self.grade_rules = rules;
        self
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.1,
            materiality_threshold: 10.0,
            first_table_page: 2,
            parallel: true,
            grade_rules: GradeRules::builtin(),
        }
    }
}
