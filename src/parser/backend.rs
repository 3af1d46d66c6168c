//! PDF backend abstraction layer.
//!
//! Provides a trait-based interface for the two extraction engines the
//! pipeline relies on (page text geometry, and table grids for a region),
//! isolating the concrete PDF library (lopdf) from the pipeline logic.

use std::path::Path;

use lopdf::{Document as LopdfDocument, Object, ObjectId};

use crate::detect::detect_format_from_path;
use crate::error::{Error, Result};
use crate::model::{PageText, RawGrid, Region, SplitMode};

use super::layout::{group_into_elements, LayoutAnalyzer};
use super::table_detector::TableDetector;

/// Abstract interface for a loaded report document.
pub trait PdfBackend: Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Text elements and extent of a page (1-indexed).
    fn page_text(&self, page: u32) -> Result<PageText>;

    /// Candidate table grids for `region` on `page`.
    ///
    /// The pipeline calls this twice per page, once per [`SplitMode`].
    fn extract_grids(&self, page: u32, region: &Region, mode: SplitMode) -> Result<Vec<RawGrid>>;
}

/// Opens documents for the batch driver.
pub trait DocumentLoader: Send + Sync {
    /// Load the document at `path`.
    fn load(&self, path: &Path) -> Result<Box<dyn PdfBackend>>;
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // UTF-16BE with BOM
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }

    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        return s;
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// LopdfBackend: implementation backed by lopdf
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] backed by `lopdf::Document`.
pub struct LopdfBackend {
    doc: LopdfDocument,
    detector: TableDetector,
}

impl LopdfBackend {
    /// Load from a file path.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        detect_format_from_path(path)?;
        let doc = LopdfDocument::load(path)?;
        Ok(Self::from_document(doc))
    }

    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data)?;
        Ok(Self::from_document(doc))
    }

    fn from_document(doc: LopdfDocument) -> Self {
        if doc.is_encrypted() {
            log::warn!("Document is encrypted; text extraction may fail");
        }
        Self {
            doc,
            detector: TableDetector::new(),
        }
    }

    /// Replace the table detector.
    pub fn with_detector(mut self, detector: TableDetector) -> Self {
        self.detector = detector;
        self
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        let pages = self.doc.get_pages();
        pages
            .get(&page)
            .copied()
            .ok_or(Error::PageOutOfRange(page, pages.len() as u32))
    }

    /// Page dimensions from the MediaBox, walking up the page tree for
    /// inherited boxes. Falls back to US Letter.
    fn page_dimensions(&self, page_id: ObjectId) -> (f32, f32) {
        let mut current = Some(page_id);
        while let Some(id) = current {
            let Ok(dict) = self.doc.get_dictionary(id) else {
                break;
            };
            if let Ok(array) = dict.get(b"MediaBox").and_then(Object::as_array) {
                let n: Vec<f32> = array.iter().filter_map(|o| o.as_float().ok()).collect();
                if n.len() >= 4 {
                    return (n[2] - n[0], n[3] - n[1]);
                }
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        (612.0, 792.0)
    }
}

impl PdfBackend for LopdfBackend {
    fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    fn page_text(&self, page: u32) -> Result<PageText> {
        let (width, height) = self.page_dimensions(self.page_id(page)?);
        let spans = LayoutAnalyzer::new(&self.doc).extract_page_spans(page)?;

        let mut text = PageText::new(page, width, height);
        text.elements = group_into_elements(spans);
        Ok(text)
    }

    fn extract_grids(&self, page: u32, region: &Region, mode: SplitMode) -> Result<Vec<RawGrid>> {
        let spans = LayoutAnalyzer::new(&self.doc).extract_page_spans(page)?;
        Ok(self.detector.extract(spans, region, mode))
    }
}

/// [`DocumentLoader`] producing [`LopdfBackend`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfLoader;

impl DocumentLoader for LopdfLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn PdfBackend>> {
        Ok(Box::new(LopdfBackend::load_file(path)?))
    }
}
