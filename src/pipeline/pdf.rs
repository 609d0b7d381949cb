//! PDF access: text extraction and page rasterisation via pdfium.
//!
//! Both operations sit behind the synchronous [`PdfEngine`] trait. pdfium is
//! CPU-bound and not async-safe; the async wrappers [`extract_text`] and
//! [`render_pages`] run every call on tokio's blocking pool.

use crate::error::LabelError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Backend that can read text from a PDF and rasterise its pages.
pub trait PdfEngine: Send + Sync + 'static {
    /// Concatenated text of every page, pages separated by `\n`.
    fn extract_text(&self, pdf_path: &Path) -> Result<String, LabelError>;

    /// Every page in document order, rendered at `scale` × its natural size.
    ///
    /// Fails as a whole if any single page fails.
    fn render_pages(&self, pdf_path: &Path, scale: f32) -> Result<Vec<DynamicImage>, LabelError>;
}

/// Run [`PdfEngine::extract_text`] on the blocking pool.
pub async fn extract_text(engine: &Arc<dyn PdfEngine>, pdf_path: &Path) -> Result<String, LabelError> {
    let engine = Arc::clone(engine);
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || engine.extract_text(&path))
        .await
        .map_err(|e| LabelError::Internal(format!("Text extraction task panicked: {}", e)))?
}

/// Run [`PdfEngine::render_pages`] on the blocking pool.
pub async fn render_pages(
    engine: &Arc<dyn PdfEngine>,
    pdf_path: &Path,
    scale: f32,
) -> Result<Vec<DynamicImage>, LabelError> {
    let engine = Arc::clone(engine);
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || engine.render_pages(&path, scale))
        .await
        .map_err(|e| LabelError::Internal(format!("Render task panicked: {}", e)))?
}

/// [`PdfEngine`] backed by the pdfium shared library.
///
/// Binds a fresh `Pdfium` instance per call.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    library: Option<PathBuf>,
}

impl PdfiumEngine {
    /// Use the pdfium library at `library`, or the system library when `None`.
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }

    fn bind(&self) -> Result<Pdfium, LabelError> {
        let bindings = match &self.library {
            Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| LabelError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfEngine for PdfiumEngine {
    fn extract_text(&self, pdf_path: &Path) -> Result<String, LabelError> {
        let pdfium = self.bind()?;
        let extraction_error = |e: PdfiumError| LabelError::Extraction {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        };

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(extraction_error)?;

        let mut text = String::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let page_text = page.text().map_err(extraction_error)?.all();
            if idx > 0 {
                text.push('\n');
            }
            text.push_str(&page_text);
        }

        debug!("Extracted {} chars of text from {}", text.len(), pdf_path.display());
        Ok(text)
    }

    fn render_pages(&self, pdf_path: &Path, scale: f32) -> Result<Vec<DynamicImage>, LabelError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| LabelError::DocumentOpen {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded for rendering: {} pages at {}x", total_pages, scale);

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

        let mut images = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                LabelError::Render {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}
