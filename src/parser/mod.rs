//! PDF access: text geometry and table grid extraction.

mod backend;
mod layout;
mod options;
mod table_detector;

pub use backend::{decode_text_simple, DocumentLoader, LopdfBackend, LopdfLoader, PdfBackend};
pub use layout::{group_into_elements, group_into_lines, LayoutAnalyzer, TextLine, TextSpan};
pub use options::ExtractOptions;
pub use table_detector::{ColumnRange, TableDetector, TableDetectorConfig, TableRowData};
