//! Scanned-document heuristic.
//!
//! A PDF whose trimmed text layer is shorter than `threshold` characters is
//! treated as image-only. Labels with a short but real text layer therefore
//! go to the vision path too.

/// Which extractor a document is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRoute {
    /// Text layer sent to the text-completion model.
    Text,
    /// Pages rasterised and sent to the vision model.
    Vision,
}

/// `true` when the trimmed text is shorter than `threshold` characters.
///
/// Counts `char`s, not bytes, so accented label text is measured the way a
/// reader would count it.
pub fn is_scanned(text: &str, threshold: usize) -> bool {
    text.trim().chars().count() < threshold
}

/// Route a document given the outcome of text extraction.
///
/// Extraction failure routes to vision rather than aborting.
pub fn route<E>(extracted: &Result<String, E>, threshold: usize) -> ExtractionRoute {
    match extracted {
        Ok(text) if !is_scanned(text, threshold) => ExtractionRoute::Text,
        _ => ExtractionRoute::Vision,
    }
}
