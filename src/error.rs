//! Error types for the label-extract library.
//!
//! Two error types reflect two distinct layers:
//!
//! * [`LabelError`]: everything the extraction pipeline can fail with. The
//!   HTTP layer maps `Validation` to 400 and every other variant to 500.
//!
//! * [`ModelError`]: what a [`crate::pipeline::llm::LabelModel`] reports back.
//!   It only distinguishes quota exhaustion from everything else, because that
//!   is the one distinction the pipeline acts on: quota errors become a
//!   degraded success, the rest become [`LabelError::Provider`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the label-extract library.
#[derive(Debug, Error)]
pub enum LabelError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// The upload is missing, not a PDF, or too large.
    #[error("{0}")]
    Validation(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document or read its text layer.
    #[error("Text extraction failed for '{path}': {detail}")]
    Extraction { path: PathBuf, detail: String },

    /// pdfium could not open the document for rendering.
    #[error("Could not open '{path}' for rendering: {detail}")]
    DocumentOpen { path: PathBuf, detail: String },

    /// A page could not be loaded, rendered or encoded.
    #[error("Rendering failed for page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider reported quota exhaustion or rate limiting.
    ///
    /// Never reaches the HTTP layer: the pipeline turns it into a
    /// degraded [`crate::label::LabelData`].
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Any other provider failure (network, auth, 5xx, content filter).
    #[error("LLM API error: {0}")]
    Provider(String),

    /// The inference call did not finish within `api_timeout_secs`.
    #[error("LLM call timed out after {secs}s")]
    ProviderTimeout { secs: u64 },

    /// The model answered, but not with the JSON object we asked for.
    #[error("Model returned malformed JSON: {detail}")]
    MalformedResponse { detail: String },

    // ── Cleanup errors ────────────────────────────────────────────────────
    /// The stored upload could not be removed. Logged, never returned to clients.
    #[error("Failed to remove upload '{path}': {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LabelError {
    /// `true` for errors caused by the client's upload rather than by us.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LabelError::Validation(_))
    }
}

/// Failure reported by a [`crate::pipeline::llm::LabelModel`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// HTTP 429, `insufficient_quota`, or an equivalent provider signal.
    #[error("quota exceeded or rate limited: {0}")]
    QuotaExceeded(String),

    /// Anything else.
    #[error("{0}")]
    Failed(String),
}

impl From<ModelError> for LabelError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::QuotaExceeded(msg) => LabelError::ProviderQuota(msg),
            ModelError::Failed(msg) => LabelError::Provider(msg),
        }
    }
}
