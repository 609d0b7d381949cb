//! Upload intake: multipart field → validated PDF on disk.
//!
//! [`receive_pdf`] enforces every intake rule before a single byte is written:
//! the file must arrive under the `pdf` field, be declared `application/pdf`,
//! fit under the size cap and start with the `%PDF` magic. Only then is it
//! stored as a [`StoredUpload`].
//!
//! A [`StoredUpload`] is removed exactly once: either by [`StoredUpload::remove`]
//! on the normal path, or by `Drop` if the request task is cancelled (client
//! disconnect) or an error unwinds past it.

use crate::error::LabelError;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Multipart field the PDF must be sent under.
pub const UPLOAD_FIELD: &str = "pdf";

/// Body of the 400 returned when no file arrives under [`UPLOAD_FIELD`].
pub const NO_PDF_UPLOADED: &str = "No PDF file uploaded";

const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A PDF stored in the working directory for the lifetime of one request.
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
    original_name: String,
    content_type: String,
    size: usize,
    removed: bool,
}

impl StoredUpload {
    /// Write `bytes` into `dir` under a generated unique name.
    pub async fn store(
        dir: &Path,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<Self, LabelError> {
        let path = dir.join(unique_name(original_name));
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            LabelError::Internal(format!("Failed to store upload at '{}': {}", path.display(), e))
        })?;

        debug!("Stored upload '{}' → {}", original_name, path.display());
        Ok(Self {
            path,
            original_name: original_name.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filename as sent by the client, unsanitised.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Delete the stored file. Consumes the upload so it cannot be removed twice.
    pub async fn remove(mut self) -> Result<(), LabelError> {
        let result = tokio::fs::remove_file(&self.path).await;
        self.removed = true;
        result.map_err(|source| LabelError::Cleanup {
            path: self.path.clone(),
            source,
        })?;
        debug!("Removed upload {}", self.path.display());
        Ok(())
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed abandoned upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove abandoned upload {}: {}", self.path.display(), e),
        }
    }
}

/// `<unix-millis>-<8 hex>-<sanitised name>`.
///
/// The timestamp orders files for operators; the random part keeps two
/// uploads of the same name in the same millisecond apart.
pub fn unique_name(original_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", millis, &nonce[..8], sanitise_file_name(original_name))
}

/// Keep `[A-Za-z0-9._-]`, replace the rest, never return an empty or hidden name.
fn sanitise_file_name(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Read the multipart body and store the single PDF it must contain.
///
/// Fields other than [`UPLOAD_FIELD`] are skipped. A `pdf` field without a
/// filename is a form value, not a file, and is skipped too.
pub async fn receive_pdf(
    multipart: &mut Multipart,
    dir: &Path,
    max_bytes: usize,
) -> Result<StoredUpload, LabelError> {
    let mut stored: Option<StoredUpload> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if stored.is_some() {
            return Err(LabelError::Validation(
                "Only one PDF file may be uploaded per request".into(),
            ));
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.eq_ignore_ascii_case(PDF_MEDIA_TYPE) {
            info!("Rejected '{}': media type '{}'", file_name, content_type);
            return Err(LabelError::Validation("Only PDF files are allowed".into()));
        }

        let bytes = read_capped(&mut field, max_bytes).await?;
        if !bytes.starts_with(b"%PDF") {
            info!("Rejected '{}': missing %PDF header", file_name);
            return Err(LabelError::Validation(
                "Uploaded file is not a valid PDF".into(),
            ));
        }

        stored = Some(StoredUpload::store(dir, &file_name, &content_type, &bytes).await?);
    }

    stored.ok_or_else(|| LabelError::Validation(NO_PDF_UPLOADED.into()))
}

async fn read_capped(field: &mut Field<'_>, max_bytes: usize) -> Result<Vec<u8>, LabelError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if buf.len() + chunk.len() > max_bytes {
            return Err(too_large(max_bytes));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> LabelError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        LabelError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

fn too_large(max_bytes: usize) -> LabelError {
    LabelError::Validation(format!(
        "PDF exceeds the {} MiB upload limit",
        max_bytes / (1024 * 1024)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitises_names() {
        assert_eq!(sanitise_file_name("label.pdf"), "label.pdf");
        assert_eq!(sanitise_file_name("Címke 1.pdf"), "C_mke_1.pdf");
        assert_eq!(sanitise_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitise_file_name("C:\\Users\\me\\label.pdf"), "label.pdf");
        assert_eq!(sanitise_file_name(".hidden"), "hidden");
        assert_eq!(sanitise_file_name(""), "upload.pdf");
    }

    #[test]
    fn unique_names_differ() {
        let a = unique_name("label.pdf");
        let b = unique_name("label.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("-label.pdf"));
    }

    #[tokio::test]
    async fn remove_deletes_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let upload = StoredUpload::store(dir.path(), "a.pdf", PDF_MEDIA_TYPE, b"%PDF-1.4")
            .await
            .unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(upload.size(), 8);

        upload.remove().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_abandoned_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload = StoredUpload::store(dir.path(), "a.pdf", PDF_MEDIA_TYPE, b"%PDF-1.4")
            .await
            .unwrap();
        let path = upload.path().to_path_buf();
        drop(upload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload = StoredUpload::store(dir.path(), "a.pdf", PDF_MEDIA_TYPE, b"%PDF-1.4")
            .await
            .unwrap();
        std::fs::remove_file(upload.path()).unwrap();
        let err = upload.remove().await.unwrap_err();
        assert!(matches!(err, LabelError::Cleanup { .. }));
    }
}
