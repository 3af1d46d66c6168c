//! Page-level types.

use super::BoundingBox;
use serde::{Deserialize, Serialize};

/// A horizontal run of text with its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    /// Text content
    pub text: String,

    /// Bounding box in page coordinates
    pub bbox: BoundingBox,
}

impl TextElement {
    /// Create a text element.
    pub fn new(text: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// The text layer of a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// Page number (1-indexed)
    pub number: u32,

    /// Page width in points
    pub width: f32,

    /// Page height in points
    pub height: f32,

    /// Text elements on the page
    pub elements: Vec<TextElement>,
}

impl PageText {
    /// Create an empty page with the given dimensions.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number,
            width,
            height,
            elements: Vec::new(),
        }
    }

    /// Create an empty US Letter page (8.5 x 11 inches).
    pub fn letter(number: u32) -> Self {
        Self::new(number, 612.0, 792.0)
    }

    /// Add a text element.
    pub fn add_element(&mut self, element: TextElement) {
        self.elements.push(element);
    }

    /// Builder-style variant of [`PageText::add_element`].
    pub fn with_element(mut self, text: impl Into<String>, bbox: BoundingBox) -> Self {
        self.add_element(TextElement::new(text, bbox));
        self
    }

    /// Right extent of the page.
    pub fn right(&self) -> f32 {
        self.width
    }

    /// Elements whose text contains `needle`, in page order.
    pub fn containing<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a TextElement> {
        self.elements.iter().filter(move |e| e.text.contains(needle))
    }

    /// Elements overlapping `band`, ordered left to right.
    pub fn overlapping(&self, band: &BoundingBox) -> Vec<&TextElement> {
        let mut found: Vec<&TextElement> = self
            .elements
            .iter()
            .filter(|e| e.bbox.overlaps(band))
            .collect();
        found.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        found
    }

    /// Check if the page has no text.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_new() {
        let page = PageText::letter(2);
        assert_eq!(page.number, 2);
        assert_eq!(page.right(), 612.0);
        assert!(page.is_empty());
    }

    #[test]
    fn test_containing_and_overlapping() {
        let page = PageText::letter(2)
            .with_element("Name", BoundingBox::new(200.0, 700.0, 260.0, 710.0))
            .with_element("School:", BoundingBox::new(20.0, 700.0, 60.0, 710.0))
            .with_element("NOTES:", BoundingBox::new(20.0, 80.0, 60.0, 90.0));

        assert_eq!(page.containing("School").count(), 1);
        assert_eq!(page.containing("OTES:").count(), 1);

        let band = BoundingBox::new(0.0, 700.0, 612.0, 710.0);
        let hits = page.overlapping(&band);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "School:");
        assert_eq!(hits[1].text, "Name");
    }
}
