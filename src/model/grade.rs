//! Grade vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sentinel written in place of a Grade value that could not be repaired.
pub const ERROR_GRADE: &str = "(error)";

/// A recognized Grade value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    /// Preschool cohort
    Preschool,
    /// Kindergarten
    Kindergarten,
    /// Grades 1 through 12
    Numbered(u8),
    /// Rollup row for a school
    Total,
}

impl Grade {
    /// Every value of the vocabulary, in report order.
    pub fn all() -> impl Iterator<Item = Grade> {
        [Grade::Preschool, Grade::Kindergarten]
            .into_iter()
            .chain((1..=12).map(Grade::Numbered))
            .chain(std::iter::once(Grade::Total))
    }

    /// Parse an exact vocabulary label.
    pub fn parse(label: &str) -> Option<Grade> {
        match label {
            "Preschool" => Some(Grade::Preschool),
            "K" => Some(Grade::Kindergarten),
            "Total" => Some(Grade::Total),
            _ => match label.parse::<u8>() {
                // Reject "01", "+3" and similar spellings
                Ok(n @ 1..=12) if label == n.to_string() => Some(Grade::Numbered(n)),
                _ => None,
            },
        }
    }

    /// Whether `label` is in the vocabulary.
    pub fn is_valid(label: &str) -> bool {
        Self::parse(label).is_some()
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Preschool => f.write_str("Preschool"),
            Grade::Kindergarten => f.write_str("K"),
            Grade::Numbered(n) => write!(f, "{}", n),
            Grade::Total => f.write_str("Total"),
        }
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::parse(s).ok_or_else(|| format!("not a grade: '{}'", s))
    }
}
