//! Rendering of extracted tables to CSV and JSON.

mod csv;
mod json;

pub use self::csv::{
    format_number, read_month_csv, read_rows, to_csv_string, write_master_csv, write_month_csv,
    write_rows,
};
pub use self::json::{to_json, JsonFormat};
