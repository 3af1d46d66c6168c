//! Rebuilds one school table from its split and unsplit grids.
//!
//! The unsplit grid has the more reliable column headers, the split grid
//! the more reliable data rows. Header rows of the unsplit grid are merged
//! into column names which replace the split grid's own header rows.

use crate::error::{Error, Result};
use crate::model::{Counts, Field, GradeRow, RawGrid, SplitMode};

/// Name given to the first physical column, which carries no data.
pub const UNUSED_COLUMN: &str = "UNUSED";

/// Name given to the second physical column.
pub const GRADE_COLUMN: &str = "Grade";

/// Column holding grade labels; its first filled cell marks the first data row.
const GRADE_INDEX: usize = 1;

/// Pick the single grid the backend returned for a region.
pub fn single_grid(mut grids: Vec<RawGrid>) -> Result<RawGrid> {
    match grids.len() {
        0 => Err(Error::NoTable),
        1 => Ok(grids.remove(0)),
        n => Err(Error::MultipleTables(n)),
    }
}

/// Merge stacked header cells into one column name.
///
/// Each cell is trimmed and blank cells are skipped, so the result does
/// not depend on how many rows the header spans or on stray whitespace.
pub fn merge_header_cells<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column names merged from the header rows of the unsplit grid.
pub fn merged_header(unsplit: &RawGrid) -> Result<Vec<String>> {
    let header_rows = unsplit
        .first_filled_row(GRADE_INDEX)
        .ok_or(Error::MissingDataRows(SplitMode::Whole))?;
    if header_rows == 0 {
        return Err(Error::MissingHeader);
    }

    let names = (0..unsplit.column_count())
        .map(|column| match column {
            0 => UNUSED_COLUMN.to_string(),
            GRADE_INDEX => GRADE_COLUMN.to_string(),
            _ => merge_header_cells((0..header_rows).map(|row| unsplit.cell(row, column))),
        })
        .collect();
    Ok(names)
}

/// Build grade rows from the two grids of one region.
///
/// Grade cells are returned raw; rows without a Total Student Count are
/// dropped.
pub fn normalize(split: &RawGrid, unsplit: &RawGrid) -> Result<Vec<GradeRow>> {
    let names = merged_header(unsplit)?;
    log::debug!("merged header: {:?}", names);

    let data_start = split
        .first_filled_row(GRADE_INDEX)
        .ok_or(Error::MissingDataRows(SplitMode::Split))?;

    let mut columns = [0usize; 9];
    for (slot, field) in columns.iter_mut().zip(Field::ALL) {
        *slot = names
            .iter()
            .position(|name| name == field.name())
            .ok_or_else(|| Error::MissingColumn(field.name().to_string()))?;
    }

    let rows = (data_start..split.row_count())
        .filter_map(|row| {
            let mut counts = Counts::default();
            for (&column, field) in columns.iter().zip(Field::ALL) {
                counts.set(field, parse_number(split.cell(row, column)));
            }
            if counts.get(Field::TotalStudentCount).is_none() {
                log::debug!("dropping row {} without a student count", row);
                return None;
            }
            Some(GradeRow::new(split.cell(row, GRADE_INDEX), counts))
        })
        .collect();

    Ok(rows)
}

/// Parse a numeric cell. Thousands separators are accepted; blank or
/// unparsable text is absent.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().chars().filter(|&c| c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_TOP: [&str; 11] = [
        "", "", "Regular", "Bilingual", "Spec. Ed.", "", "", "", "Total Student", "P223 Total",
        "P223 Total",
    ];
    const HEADER_BOTTOM: [&str; 11] = [
        "", "", "Program", "Served", "Served", "Male", "Female", "Non-Binary", "Count", "Count",
        "FTE",
    ];

    fn unsplit() -> RawGrid {
        RawGrid::from_rows(vec![
            HEADER_TOP.to_vec(),
            HEADER_BOTTOM.to_vec(),
            vec!["", "K", "50", "3", "4", "26", "24", "0", "50", "50", "50.0"],
        ])
    }

    fn split() -> RawGrid {
        RawGrid::from_rows(vec![
            vec!["", "", "Regu", "lar Bilingual", "", "", "", "", "", "", ""],
            vec!["", "", "", "", "", "", "", "", "", "", ""],
            vec!["", "K", "50", "3", "4", "26", "24", "0", "50", "50", "50.0"],
            vec!["", "", "", "", "", "", "", "", "", "", ""],
            vec!["", "1", "1,020", "3", "", "510", "510", "0", "1,020", "1,020", "1,019.5"],
            vec!["", "Total", "1,070", "6", "4", "536", "534", "0", "1,070", "1,070", "1,069.5"],
        ])
    }

    #[test]
    fn test_merge_header_cells() {
        assert_eq!(merge_header_cells(["Total Student", "Count"]), "Total Student Count");
        assert_eq!(merge_header_cells(["", "Male"]), "Male");
        assert_eq!(merge_header_cells(["  P223 ", " Total", "FTE  "]), "P223 Total FTE");
        assert_eq!(merge_header_cells(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_header_merge_independent_of_row_count_and_padding() {
        let stacked: [&[&str]; 3] = [
            &["P223 Total FTE"],
            &["P223 Total", "FTE"],
            &["P223", "Total", "FTE"],
        ];
        for rows in stacked {
            let plain = merge_header_cells(rows.iter().copied());
            let padded: Vec<String> = rows.iter().map(|c| format!("  {}\t ", c)).collect();
            let padded = merge_header_cells(padded.iter().map(String::as_str));
            assert_eq!(plain, "P223 Total FTE");
            assert_eq!(padded, plain);
        }
    }

    #[test]
    fn test_merged_header_forces_first_columns() {
        let mut rows: Vec<Vec<&str>> = vec![HEADER_TOP.to_vec(), HEADER_BOTTOM.to_vec()];
        rows[0][0] = "Sch";
        rows[1][0] = "ool";
        rows.push(vec!["", "K"]);
        let names = merged_header(&RawGrid::from_rows(rows)).unwrap();
        assert_eq!(names[0], UNUSED_COLUMN);
        assert_eq!(names[1], GRADE_COLUMN);
        assert_eq!(&names[2..], Field::ALL.map(Field::name).as_slice());
    }

    #[test]
    fn test_normalize() {
        let rows = normalize(&split(), &unsplit()).unwrap();
        let grades: Vec<&str> = rows.iter().map(|r| r.grade.as_str()).collect();
        assert_eq!(grades, vec!["K", "1", "Total"]);

        assert_eq!(rows[1].counts.get(Field::RegularProgram), Some(1020.0));
        assert_eq!(rows[1].counts.get(Field::SpecEdServed), None);
        assert_eq!(rows[1].counts.get(Field::P223TotalFte), Some(1019.5));
        assert_eq!(rows[2].counts.get(Field::Male), Some(536.0));
    }

    #[test]
    fn test_normalize_missing_data_rows() {
        let empty = RawGrid::from_rows(vec![HEADER_TOP.to_vec()]);
        assert!(matches!(
            normalize(&split(), &empty),
            Err(Error::MissingDataRows(SplitMode::Whole))
        ));
        assert!(matches!(
            normalize(&empty, &unsplit()),
            Err(Error::MissingDataRows(SplitMode::Split))
        ));
    }

    #[test]
    fn test_normalize_missing_header() {
        let headerless = RawGrid::from_rows(vec![vec!["", "K", "1"]]);
        assert!(matches!(
            normalize(&split(), &headerless),
            Err(Error::MissingHeader)
        ));
    }

    #[test]
    fn test_normalize_missing_column() {
        let mut top = HEADER_TOP.to_vec();
        let mut bottom = HEADER_BOTTOM.to_vec();
        top[8] = "";
        bottom[8] = "Students";
        let grid = RawGrid::from_rows(vec![top, bottom, vec!["", "K"]]);
        match normalize(&split(), &grid) {
            Err(Error::MissingColumn(name)) => assert_eq!(name, "Total Student Count"),
            other => panic!("expected missing column, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" 1,234.5 "), Some(1234.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("  "), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_single_grid() {
        assert!(matches!(single_grid(vec![]), Err(Error::NoTable)));
        let grid = RawGrid::from_rows(vec![vec!["a"]]);
        assert!(single_grid(vec![grid.clone()]).is_ok());
        assert!(matches!(
            single_grid(vec![grid.clone(), grid]),
            Err(Error::MultipleTables(2))
        ));
    }
}
