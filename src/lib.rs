//! # label-extract
//!
//! Extract allergen and nutrition data from food-label PDFs with LLMs.
//!
//! A label PDF is either *digital* (it has a text layer) or *scanned* (its
//! pages are pictures). Digital labels are cheap: the text goes to a
//! text-completion model. Scanned labels are rasterised page by page and sent,
//! all pages in one request, to a vision model. Either way the answer is a
//! [`LabelData`] whose keys are drawn from two closed vocabularies,
//! [`Allergen`] and [`Nutrient`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Intake    multipart field `pdf`, media type, 10 MiB cap, %PDF magic
//!  ├─ 2. Text      pdfium text layer (spawn_blocking)
//!  ├─ 3. Classify  < 50 trimmed chars (or failure) → scanned
//!  ├─ 4a. Text     one JSON-mode call with the full text
//!  ├─ 4b. Vision   render every page at 3× → PNG → base64 → one JSON-mode call
//!  ├─ 5. Validate  parse JSON, keep only vocabulary keys
//!  └─ 6. Cleanup   uploaded file removed before responding
//! ```
//!
//! Quota or rate-limit refusals from the provider do not fail the request;
//! they produce a degraded result with `fallback: true` and empty maps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use label_extract::{ExtractionConfig, Extractor};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let extractor = Extractor::from_config(ExtractionConfig::default())?;
//!     let out = extractor.extract_path(Path::new("label.pdf")).await?;
//!     println!("{}", serde_json::to_string_pretty(&out.data)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `label-extract` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Capacity
//!
//! Each request holds its upload (≤ 10 MiB) and, on the vision path, every
//! rendered page in memory at once. There is no limit on concurrent requests;
//! put the server behind a proxy that enforces one.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod label;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
pub use error::{LabelError, ModelError};
pub use extract::{Extractor, LabelExtraction};
pub use label::{Allergen, LabelData, Nutrient};
pub use pipeline::classify::ExtractionRoute;
pub use pipeline::llm::{LabelModel, ModelRequest, ProviderModel};
pub use pipeline::pdf::{PdfEngine, PdfiumEngine};
pub use server::{build_router, serve, AppState};
