//! CSV output of month and master tables.
//!
//! Month and master files share one layout: the twelve columns of
//! [`OUTPUT_COLUMNS`], numbers without trailing `.0`, absent values empty.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::{Error, Result};
use crate::model::{Counts, Field, MasterTable, MonthTable, ReportRow, OUTPUT_COLUMNS};
use crate::pipeline::parse_number;

/// Format a count for output.
///
/// Integral values print without a decimal point, others in their
/// shortest round-trip form.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // Avoid "-0"
        return "0".to_string();
    }
    value.to_string()
}

/// Write rows with the output header to `writer`.
pub fn write_rows<W: Write>(rows: &[ReportRow], writer: W) -> Result<()> {
    let mut csv = WriterBuilder::new().from_writer(writer);
    csv.write_record(OUTPUT_COLUMNS)?;
    for row in rows {
        let mut record = Vec::with_capacity(OUTPUT_COLUMNS.len());
        record.push(row.month.clone());
        record.push(row.school.clone());
        record.push(row.grade.clone());
        record.extend(
            row.counts
                .values()
                .iter()
                .map(|v| v.map(format_number).unwrap_or_default()),
        );
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Render rows as a CSV string.
pub fn to_csv_string(rows: &[ReportRow]) -> Result<String> {
    let mut buffer = Vec::new();
    write_rows(rows, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::InvalidCsv(e.to_string()))
}

/// Write a month table, creating parent directories.
pub fn write_month_csv<P: AsRef<Path>>(table: &MonthTable, path: P) -> Result<()> {
    write_file(&table.rows, path.as_ref())?;
    log::info!(
        "wrote {} rows for {} to {}",
        table.row_count(),
        table.month,
        path.as_ref().display()
    );
    Ok(())
}

/// Write the master table, creating parent directories.
pub fn write_master_csv<P: AsRef<Path>>(table: &MasterTable, path: P) -> Result<()> {
    write_file(&table.rows, path.as_ref())?;
    log::info!(
        "wrote {} rows to {}",
        table.row_count(),
        path.as_ref().display()
    );
    Ok(())
}

fn write_file(rows: &[ReportRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_rows(rows, File::create(path)?)
}

/// Read rows written by [`write_rows`].
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ReportRow>> {
    let mut csv = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = csv.headers()?;
    if !headers.iter().eq(OUTPUT_COLUMNS) {
        return Err(Error::InvalidCsv(format!(
            "unexpected header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    csv.records()
        .map(|record| Ok(parse_record(&record?)))
        .collect()
}

fn parse_record(record: &StringRecord) -> ReportRow {
    let text = |i: usize| record.get(i).unwrap_or_default().to_string();
    let mut counts = Counts::default();
    for (i, field) in Field::ALL.into_iter().enumerate() {
        counts.set(field, record.get(3 + i).and_then(parse_number));
    }
    ReportRow {
        month: text(0),
        school: text(1),
        grade: text(2),
        counts,
    }
}

/// Read back a month CSV as the table for `month`.
pub fn read_month_csv<P: AsRef<Path>>(path: P, month: &str) -> Result<MonthTable> {
    let rows = read_rows(File::open(path.as_ref())?)?;
    if let Some(row) = rows.iter().find(|r| r.month != month) {
        return Err(Error::InvalidCsv(format!(
            "{} holds a row for {}, expected {}",
            path.as_ref().display(),
            row.month,
            month
        )));
    }
    Ok(MonthTable {
        month: month.to_string(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GradeRow, NormalizedTable};

    fn table() -> MonthTable {
        let mut partial = Counts::from_values([10.0, 0.0, 1.0, 5.0, 5.0, 0.0, 10.0, 10.0, 9.5]);
        partial.set(Field::NonBinary, None);
        MonthTable::from_schools(
            "2024-09",
            vec![NormalizedTable::new(
                "Adams, North",
                vec![GradeRow::new("K", partial)],
            )],
        )
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(50.0), "50");
        assert_eq!(format_number(9.5), "9.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1234567.0), "1234567");
    }

    #[test]
    fn test_csv_layout() {
        let text = to_csv_string(&table().rows).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(OUTPUT_COLUMNS.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("2024-09,\"Adams, North\",K,10,0,1,5,5,,10,10,9.5")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_month_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("month").join("2024-09.csv");
        write_month_csv(&table(), &path).unwrap();

        let read = read_month_csv(&path, "2024-09").unwrap();
        assert_eq!(read, table());
    }

    #[test]
    fn test_read_month_csv_rejects_other_month() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-10.csv");
        write_month_csv(&table(), &path).unwrap();
        assert!(matches!(
            read_month_csv(&path, "2024-10"),
            Err(Error::InvalidCsv(_))
        ));
    }

    #[test]
    fn test_read_rows_rejects_foreign_header() {
        let data = "Month,School,Grade\n2024-09,Adams,K\n";
        assert!(matches!(
            read_rows(data.as_bytes()),
            Err(Error::InvalidCsv(_))
        ));
    }

    #[test]
    fn test_master_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.csv");
        let master = MasterTable::from_months(vec![table()]);
        write_master_csv(&master, &path).unwrap();

        let rows = read_rows(File::open(&path).unwrap()).unwrap();
        assert_eq!(rows, master.rows);
    }
}
