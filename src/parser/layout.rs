//! Text geometry extraction for PDF pages.
//!
//! This module walks a page's content stream, tracking the text and
//! transformation matrices, and produces positioned text spans. Spans are
//! then grouped into horizontal text boxes ([`TextElement`]) for anchor
//! lookup, or handed as-is to the table detector.

use std::collections::{BTreeMap, HashMap};

use lopdf::{Document as LopdfDocument, Object, ObjectId};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::model::{BoundingBox, TextElement};

use super::backend::decode_text_simple;

/// Average glyph advance as a fraction of the font size, used when the
/// font's real metrics are not consulted.
const AVG_CHAR_WIDTH: f32 = 0.5;

/// Horizontal gap (in multiples of font size) that separates two text boxes
/// on the same line.
const BOX_GAP_FACTOR: f32 = 1.5;

/// A text span with position and style information.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// The text content
    pub text: String,
    /// X position (left edge)
    pub x: f32,
    /// Y position (baseline)
    pub y: f32,
    /// Width of the text
    pub width: f32,
    /// Font size in points
    pub font_size: f32,
    /// Font name (e.g., "Helvetica-Bold")
    pub font_name: String,
}

impl TextSpan {
    /// Create a new text span. The text is NFKC-normalized and its width
    /// estimated from the character count.
    pub fn new(text: &str, x: f32, y: f32, font_size: f32, font_name: String) -> Self {
        let text: String = text.nfkc().collect();
        let width = text.chars().count() as f32 * font_size * AVG_CHAR_WIDTH;
        Self {
            text,
            x,
            y,
            width,
            font_size,
            font_name,
        }
    }

    /// Get the bottom Y coordinate (approximate, based on font size).
    pub fn bottom(&self) -> f32 {
        self.y - self.font_size * 0.2 // Approximate descender
    }

    /// Get the top Y coordinate (approximate, based on font size).
    pub fn top(&self) -> f32 {
        self.y + self.font_size * 0.8 // Approximate ascender
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bounding box of the span.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.bottom(), self.right(), self.top())
    }
}

/// A text line composed of multiple spans on the same baseline.
#[derive(Debug, Clone)]
pub struct TextLine {
    /// The spans in this line, sorted by X position
    pub spans: Vec<TextSpan>,
    /// Y position (baseline)
    pub y: f32,
}

impl TextLine {
    /// Create a new text line from spans.
    pub fn from_spans(mut spans: Vec<TextSpan>) -> Self {
        spans.sort_by(|a, b| a.x.total_cmp(&b.x));
        let y = spans.first().map(|s| s.y).unwrap_or(0.0);
        Self { spans, y }
    }

    /// Get the combined text of all spans.
    ///
    /// A space is inserted where the gap between two spans exceeds a fifth
    /// of the average character width and neither side already has one.
    pub fn text(&self) -> String {
        let mut result = String::new();

        for (i, span) in self.spans.iter().enumerate() {
            if i > 0 {
                let prev = &self.spans[i - 1];
                let gap = span.x - prev.right();
                let char_count = span.text.chars().count();
                let avg_char_width = if char_count > 0 && span.width > 0.0 {
                    span.width / char_count as f32
                } else {
                    span.font_size * AVG_CHAR_WIDTH
                };

                if gap > avg_char_width * 0.2
                    && !prev.text.ends_with(char::is_whitespace)
                    && !span.text.starts_with(char::is_whitespace)
                {
                    result.push(' ');
                }
            }
            result.push_str(&span.text);
        }

        result
    }

    /// Bounding box of all spans.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.spans
            .iter()
            .map(TextSpan::bbox)
            .reduce(|acc, b| acc.union(&b))
    }
}

/// Extracts positioned text from the pages of a loaded document.
pub struct LayoutAnalyzer<'a> {
    doc: &'a LopdfDocument,
}

impl<'a> LayoutAnalyzer<'a> {
    /// Create a new layout analyzer.
    pub fn new(doc: &'a LopdfDocument) -> Self {
        Self { doc }
    }

    /// Extract text spans from a page with position and font information.
    pub fn extract_page_spans(&self, page_num: u32) -> Result<Vec<TextSpan>> {
        let pages = self.doc.get_pages();
        let page_id = pages
            .get(&page_num)
            .ok_or(Error::PageOutOfRange(page_num, pages.len() as u32))?;

        let lopdf_fonts = self
            .doc
            .get_page_fonts(*page_id)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        let mut fonts = HashMap::new();
        for (name, font) in &lopdf_fonts {
            let base_font = font
                .get(b"BaseFont")
                .ok()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            fonts.insert(name.clone(), base_font);
        }

        let content = self.get_page_content(*page_id)?;
        let spans = self.parse_content_stream(&content, &fonts, &lopdf_fonts)?;
        log::debug!("Page {}: extracted {} spans", page_num, spans.len());
        Ok(spans)
    }

    /// Extract horizontal text boxes from a page.
    pub fn extract_page_elements(&self, page_num: u32) -> Result<Vec<TextElement>> {
        let spans = self.extract_page_spans(page_num)?;
        Ok(group_into_elements(spans))
    }

    /// Get page content stream.
    fn get_page_content(&self, page_id: ObjectId) -> Result<Vec<u8>> {
        let page_dict = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        let contents = page_dict
            .get(b"Contents")
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        match contents {
            Object::Reference(r) => {
                if let Ok(Object::Stream(s)) = self.doc.get_object(*r) {
                    return s
                        .decompressed_content()
                        .map_err(|e| Error::PdfParse(e.to_string()));
                }
                Err(Error::PdfParse("Invalid content stream".to_string()))
            }
            Object::Array(arr) => {
                let mut content = Vec::new();
                for obj in arr {
                    if let Object::Reference(r) = obj {
                        if let Ok(Object::Stream(s)) = self.doc.get_object(*r) {
                            if let Ok(data) = s.decompressed_content() {
                                content.extend_from_slice(&data);
                                content.push(b' ');
                            }
                        }
                    }
                }
                Ok(content)
            }
            _ => Err(Error::PdfParse("Invalid content stream".to_string())),
        }
    }

    /// Walk a content stream and collect the text it shows.
    fn parse_content_stream(
        &self,
        content: &[u8],
        fonts: &HashMap<Vec<u8>, String>,
        lopdf_fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
    ) -> Result<Vec<TextSpan>> {
        let content =
            lopdf::content::Content::decode(content).map_err(|e| Error::PdfParse(e.to_string()))?;

        let mut spans = Vec::new();
        let mut state = TextState::default();
        let mut ctm_stack: Vec<Matrix> = Vec::new();
        let mut in_text_block = false;

        for op in content.operations {
            match op.operator.as_str() {
                "q" => ctm_stack.push(state.ctm),
                "Q" => {
                    if let Some(ctm) = ctm_stack.pop() {
                        state.ctm = ctm;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from_operands(&op.operands) {
                        state.ctm = m.multiply(&state.ctm);
                    }
                }
                "BT" => {
                    in_text_block = true;
                    state.text = Matrix::IDENTITY;
                    state.line = Matrix::IDENTITY;
                }
                "ET" => in_text_block = false,
                "Tf" => {
                    if op.operands.len() >= 2 {
                        if let Object::Name(font_name) = &op.operands[0] {
                            state.font_key = font_name.clone();
                            state.font_name = fonts.get(font_name).cloned().unwrap_or_else(|| {
                                String::from_utf8_lossy(font_name.as_slice()).to_string()
                            });
                        }
                        state.font_size = get_number(&op.operands[1]).unwrap_or(12.0);
                    }
                }
                "TL" => {
                    if let Some(leading) = op.operands.first().and_then(get_number) {
                        state.leading = leading;
                    }
                }
                "Td" | "TD" => {
                    if op.operands.len() >= 2 {
                        let tx = get_number(&op.operands[0]).unwrap_or(0.0);
                        let ty = get_number(&op.operands[1]).unwrap_or(0.0);
                        if op.operator == "TD" {
                            state.leading = -ty;
                        }
                        state.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_from_operands(&op.operands) {
                        state.text = m;
                        state.line = m;
                    }
                }
                "T*" => state.next_line(),
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator == "'" || op.operator == "\"" {
                        state.next_line();
                    }
                    if !in_text_block {
                        continue;
                    }
                    let text = self.decode_shown_text(&op.operator, &op.operands, &state, lopdf_fonts);
                    if let Some(span) = state.show(&text) {
                        spans.push(span);
                    }
                }
                _ => {}
            }
        }

        Ok(spans)
    }

    /// Decode the string operands of a text-showing operator.
    fn decode_shown_text(
        &self,
        operator: &str,
        operands: &[Object],
        state: &TextState,
        lopdf_fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
    ) -> String {
        let encoding = lopdf_fonts
            .get(&state.font_key)
            .and_then(|f| f.get_font_encoding(self.doc).ok());
        let decode = |bytes: &[u8]| match encoding {
            Some(ref enc) => LopdfDocument::decode_text(enc, bytes).unwrap_or_default(),
            None => decode_text_simple(bytes),
        };

        match operator {
            "TJ" => {
                let Some(Object::Array(arr)) = operands.first() else {
                    return String::new();
                };
                // Adjustments are in thousandths of text space; large negative
                // values are word gaps.
                let space_threshold = 200.0;
                let mut combined = String::new();
                for item in arr {
                    match item {
                        Object::String(bytes, _) => combined.push_str(&decode(bytes)),
                        Object::Integer(_) | Object::Real(_) => {
                            let adjustment = -get_number(item).unwrap_or(0.0);
                            if adjustment > space_threshold
                                && !combined.is_empty()
                                && !combined.ends_with(char::is_whitespace)
                            {
                                combined.push(' ');
                            }
                        }
                        _ => {}
                    }
                }
                combined
            }
            "\"" => match operands.get(2) {
                Some(Object::String(bytes, _)) => decode(bytes),
                _ => String::new(),
            },
            _ => match operands.first() {
                Some(Object::String(bytes, _)) => decode(bytes),
                _ => String::new(),
            },
        }
    }
}

/// Group spans into horizontal text boxes.
///
/// Spans sharing a baseline (within 30% of the font size) form a line;
/// a line is cut into separate boxes wherever the horizontal gap exceeds
/// [`BOX_GAP_FACTOR`] times the font size.
pub fn group_into_elements(spans: Vec<TextSpan>) -> Vec<TextElement> {
    let mut elements = Vec::new();

    for line in group_into_lines(spans) {
        let mut current: Vec<TextSpan> = Vec::new();
        for span in line.spans {
            let split = current.last().is_some_and(|prev: &TextSpan| {
                span.x - prev.right() > prev.font_size.max(span.font_size) * BOX_GAP_FACTOR
            });
            if split {
                elements.extend(element_from_spans(std::mem::take(&mut current)));
            }
            current.push(span);
        }
        elements.extend(element_from_spans(current));
    }

    elements
}

fn element_from_spans(spans: Vec<TextSpan>) -> Option<TextElement> {
    let line = TextLine::from_spans(spans);
    let bbox = line.bbox()?;
    Some(TextElement::new(line.text(), bbox))
}

/// Group spans into lines by baseline, top of the page first.
pub fn group_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    spans.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<TextLine> = Vec::new();
    let mut current_line_spans: Vec<TextSpan> = Vec::new();
    let mut current_y: Option<f32> = None;

    for span in spans {
        let y_tolerance = span.font_size * 0.3;
        match current_y {
            Some(y) if (span.y - y).abs() <= y_tolerance => current_line_spans.push(span),
            _ => {
                if !current_line_spans.is_empty() {
                    lines.push(TextLine::from_spans(std::mem::take(
                        &mut current_line_spans,
                    )));
                }
                current_y = Some(span.y);
                current_line_spans.push(span);
            }
        }
    }

    if !current_line_spans.is_empty() {
        lines.push(TextLine::from_spans(current_line_spans));
    }

    lines
}

/// A 2-D affine matrix `[a b c d e f]` as used by PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self × other`
    fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn translated(&self, tx: f32, ty: f32) -> Matrix {
        Matrix {
            e: self.e + tx * self.a + ty * self.c,
            f: self.f + tx * self.b + ty * self.d,
            ..*self
        }
    }

    fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Graphics and text state tracked while walking a content stream.
#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    text: Matrix,
    line: Matrix,
    leading: f32,
    font_key: Vec<u8>,
    font_name: String,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            text: Matrix::IDENTITY,
            line: Matrix::IDENTITY,
            leading: 12.0,
            font_key: Vec::new(),
            font_name: String::new(),
            font_size: 12.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line = self.line.translated(tx, ty);
        self.text = self.line;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    /// Emit a span for `text` at the current position and advance past it.
    fn show(&mut self, text: &str) -> Option<TextSpan> {
        let device = self.text.multiply(&self.ctm);
        let size = self.font_size * device.scale();
        let advance = text.chars().count() as f32 * self.font_size * AVG_CHAR_WIDTH;
        self.text = self.text.translated(advance, 0.0);

        if text.trim().is_empty() {
            return None;
        }
        Some(TextSpan::new(
            text,
            device.e,
            device.f,
            size,
            self.font_name.clone(),
        ))
    }
}

fn matrix_from_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let n: Vec<f32> = operands.iter().take(6).filter_map(get_number).collect();
    if n.len() < 6 {
        return None;
    }
    Some(Matrix {
        a: n[0],
        b: n[1],
        c: n[2],
        d: n[3],
        e: n[4],
        f: n[5],
    })
}

/// Helper to extract number from PDF object.
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
