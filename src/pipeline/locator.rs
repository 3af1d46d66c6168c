//! Finds the table region of a school page from its text anchors.
//!
//! A school table sits between the `School: <name>` label and the `NOTES:`
//! footer and spans the full page width.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::model::{BoundingBox, PageText, Region, TextElement};

use super::diagnostics::{Diagnostic, Diagnostics};

/// Substring shared by the footer anchor. The leading `N` of `NOTES:` is
/// often lost by text extraction.
const NOTES_NEEDLE: &str = "OTES:";

/// Anchor for the school label.
const SCHOOL_NEEDLE: &str = "School";

fn school_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^School:(.*)$").expect("valid school label pattern"))
}

/// Result of locating a school table on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    /// Area holding the table
    pub region: Region,
    /// School name; empty when the page does not print one
    pub school: String,
}

/// Locate the school table on `page`.
///
/// Fails with [`Error::AnchorMissing`] when the school label is absent or
/// the notes footer is not found exactly once. A missing school name is
/// recorded in `diagnostics` and the table is still located.
pub fn locate(page: &PageText, pdf: &Path, diagnostics: &mut Diagnostics) -> Result<Located> {
    let (anchor, name) = find_school_anchor(page).ok_or(Error::AnchorMissing("School"))?;

    let school = match name {
        Some(name) => name,
        None => school_name_from_band(page, &anchor.bbox),
    };
    if school.is_empty() {
        diagnostics.push(Diagnostic::MissingSchoolName {
            pdf: pdf.to_path_buf(),
            page: page.number,
        });
    }

    let mut notes = page.containing(NOTES_NEEDLE);
    let footer = match (notes.next(), notes.next()) {
        (Some(footer), None) => footer,
        _ => return Err(Error::AnchorMissing("NOTES")),
    };

    let region = Region::new(0.0, anchor.bbox.y0, page.right(), footer.bbox.y1);
    log::debug!(
        "page {}: school '{}' table region {:?}",
        page.number,
        school,
        region
    );

    Ok(Located { region, school })
}

/// First element whose trimmed text is a school label, with the name it
/// carries when that is not blank.
fn find_school_anchor(page: &PageText) -> Option<(&TextElement, Option<String>)> {
    page.containing(SCHOOL_NEEDLE).find_map(|element| {
        let caps = school_label().captures(element.text.trim())?;
        let name = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        Some((element, name))
    })
}

/// Name printed beside the label, looked up across the label's band.
fn school_name_from_band(page: &PageText, anchor: &BoundingBox) -> String {
    let band = BoundingBox::new(0.0, anchor.y0, page.right(), anchor.y1);
    let elements = page.overlapping(&band);

    let labelled = elements.iter().find_map(|element| {
        school_label()
            .captures(element.text.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|name| !name.is_empty())
    });
    if let Some(name) = labelled {
        return name.to_string();
    }

    let Some(last) = elements.last() else {
        return String::new();
    };
    let text = last.text.trim();
    match school_label().captures(text).and_then(|caps| caps.get(1)) {
        Some(rest) => rest.as_str().trim().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf() -> &'static Path {
        Path::new("input/P223_Sep24.pdf")
    }

    fn page_with(elements: &[(&str, f32, f32, f32, f32)]) -> PageText {
        elements
            .iter()
            .fold(PageText::letter(2), |page, &(text, x0, y0, x1, y1)| {
                page.with_element(text, BoundingBox::new(x0, y0, x1, y1))
            })
    }

    #[test]
    fn test_locate_inline_name() {
        let page = page_with(&[
            ("School: Adams Elementary", 20.0, 700.0, 200.0, 712.0),
            ("Grade", 20.0, 680.0, 50.0, 690.0),
            ("NOTES: counts as of the 1st", 20.0, 100.0, 300.0, 110.0),
        ]);
        let mut diags = Diagnostics::new();
        let located = locate(&page, pdf(), &mut diags).unwrap();

        assert_eq!(located.school, "Adams Elementary");
        assert_eq!(located.region, Region::new(0.0, 700.0, 612.0, 110.0));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_locate_name_in_separate_box() {
        let page = page_with(&[
            ("School:", 20.0, 700.0, 60.0, 712.0),
            ("Whitman Middle", 120.0, 701.0, 220.0, 711.0),
            ("Report date", 400.0, 740.0, 460.0, 750.0),
            ("OTES:", 20.0, 100.0, 60.0, 110.0),
        ]);
        let mut diags = Diagnostics::new();
        let located = locate(&page, pdf(), &mut diags).unwrap();
        assert_eq!(located.school, "Whitman Middle");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_locate_skips_non_label_school_text() {
        let page = page_with(&[
            ("Seattle School District", 20.0, 760.0, 200.0, 772.0),
            ("School: Decatur", 20.0, 700.0, 200.0, 712.0),
            ("NOTES:", 20.0, 100.0, 60.0, 110.0),
        ]);
        let mut diags = Diagnostics::new();
        let located = locate(&page, pdf(), &mut diags).unwrap();
        assert_eq!(located.school, "Decatur");
        assert_eq!(located.region.top, 700.0);
    }

    #[test]
    fn test_locate_missing_name_warns() {
        let page = page_with(&[
            ("School:", 20.0, 700.0, 60.0, 712.0),
            ("NOTES:", 20.0, 100.0, 60.0, 110.0),
        ]);
        let mut diags = Diagnostics::new();
        let located = locate(&page, pdf(), &mut diags).unwrap();
        assert_eq!(located.school, "");
        assert_eq!(diags.count_kind("missing_school_name"), 1);
    }

    #[test]
    fn test_locate_missing_school_anchor() {
        let page = page_with(&[("NOTES:", 20.0, 100.0, 60.0, 110.0)]);
        let result = locate(&page, pdf(), &mut Diagnostics::new());
        assert!(matches!(result, Err(Error::AnchorMissing("School"))));
    }

    #[test]
    fn test_locate_missing_notes() {
        let page = page_with(&[("School: Adams", 20.0, 700.0, 200.0, 712.0)]);
        let result = locate(&page, pdf(), &mut Diagnostics::new());
        assert!(matches!(result, Err(Error::AnchorMissing("NOTES"))));
    }

    #[test]
    fn test_locate_duplicate_notes() {
        let page = page_with(&[
            ("School: Adams", 20.0, 700.0, 200.0, 712.0),
            ("NOTES:", 20.0, 300.0, 60.0, 310.0),
            ("OTES: continued", 20.0, 100.0, 60.0, 110.0),
        ]);
        let result = locate(&page, pdf(), &mut Diagnostics::new());
        assert!(matches!(result, Err(Error::AnchorMissing("NOTES"))));
    }
}
