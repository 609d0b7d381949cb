//! Image encoding: `DynamicImage` → base64 PNG.
//!
//! Pages are always PNG. The base64 strings are wrapped into provider image
//! parts with `detail: "high"` by [`crate::pipeline::llm`].

use crate::error::LabelError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode one rendered page as base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(b64)
}

/// Encode every page, preserving order. The first failure aborts the batch.
pub fn encode_pages(pages: &[DynamicImage]) -> Result<Vec<String>, LabelError> {
    pages
        .iter()
        .enumerate()
        .map(|(idx, img)| {
            encode_page(img).map_err(|e| LabelError::Render {
                page: idx + 1,
                detail: format!("PNG encoding failed: {}", e),
            })
        })
        .collect()
}
