//! Input vetting: PDF header check and report file discovery.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// PDF header information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3; // e.g., "1.7"
const HEADER_LEN: u64 = 16;

/// Detect the PDF header of a file.
///
/// Files shorter than a PDF header are [`Error::UnknownFormat`], not I/O errors.
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<PdfFormat> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
    detect_format_from_bytes(&header)
}

/// Detect the PDF header of in-memory data.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<PdfFormat> {
    let rest = data.strip_prefix(PDF_MAGIC).ok_or(Error::UnknownFormat)?;
    let version = rest.get(..VERSION_LEN).ok_or(Error::UnknownFormat)?;

    match version {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => Ok(PdfFormat {
            version: String::from_utf8_lossy(version).into_owned(),
        }),
        _ => Err(Error::UnsupportedVersion(
            String::from_utf8_lossy(version).into_owned(),
        )),
    }
}

/// Check if a file starts with a PDF header.
pub fn is_pdf<P: AsRef<Path>>(path: P) -> bool {
    detect_format_from_path(path).is_ok()
}

/// Check if bytes start with a PDF header.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    detect_format_from_bytes(data).is_ok()
}

/// Whether the path names a `.pdf` file (case-insensitive).
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// PDF files directly inside `dir`, sorted by path.
pub fn discover_pdfs<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && has_pdf_extension(&path) {
            found.push(path);
        }
    }
    found.sort();
    log::debug!(
        "found {} PDF files in {}",
        found.len(),
        dir.as_ref().display()
    );
    Ok(found)
}
