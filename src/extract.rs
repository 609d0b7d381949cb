//! The extraction orchestrator: PDF path in, [`LabelData`] out.
//!
//! ```text
//! Classifying ──▶ TextExtraction ───┐
//!      │                            ├──▶ LabelExtraction
//!      └────────▶ VisionExtraction ─┘
//! ```
//!
//! The orchestrator never touches the uploaded file's lifecycle; removing it
//! is the caller's job (see [`crate::upload::StoredUpload`]), so the same
//! pipeline serves the HTTP handler and the one-shot CLI.

use crate::config::ExtractionConfig;
use crate::error::LabelError;
use crate::label::LabelData;
use crate::pipeline::classify::{route, ExtractionRoute};
use crate::pipeline::llm::{self, LabelModel, ProviderModel};
use crate::pipeline::pdf::{self, PdfEngine, PdfiumEngine};
use crate::pipeline::encode;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one extraction, with the route it took.
#[derive(Debug, Clone, Serialize)]
pub struct LabelExtraction {
    pub data: LabelData,
    pub route: ExtractionRoute,
    /// Trimmed length of the text layer; 0 when extraction failed.
    pub text_chars: usize,
    /// Pages rasterised; `None` on the text path.
    pub page_count: Option<usize>,
    pub duration_ms: u64,
}

/// Everything one extraction needs, built once and shared across requests.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    pdf: Arc<dyn PdfEngine>,
    text_model: Arc<dyn LabelModel>,
    vision_model: Arc<dyn LabelModel>,
}

impl Extractor {
    /// Assemble an extractor from explicit parts.
    pub fn new(
        config: ExtractionConfig,
        pdf: Arc<dyn PdfEngine>,
        text_model: Arc<dyn LabelModel>,
        vision_model: Arc<dyn LabelModel>,
    ) -> Self {
        Self {
            config,
            pdf,
            text_model,
            vision_model,
        }
    }

    /// Production wiring: pdfium engine plus providers resolved from the
    /// environment.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, LabelError> {
        let text_provider = resolve_provider(&config, &config.text_model)?;
        let vision_provider = resolve_provider(&config, &config.vision_model)?;
        let text_model = Arc::new(ProviderModel::new(text_provider, config.text_model.clone()));
        let vision_model = Arc::new(ProviderModel::new(vision_provider, config.vision_model.clone()));
        let pdf = Arc::new(PdfiumEngine::new(config.pdfium_library.clone()));

        Ok(Self::new(config, pdf, text_model, vision_model))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the full pipeline on a PDF already on disk.
    pub async fn extract_path(&self, pdf_path: &Path) -> Result<LabelExtraction, LabelError> {
        let start = Instant::now();

        // ── Classifying ──────────────────────────────────────────────────
        let extracted = pdf::extract_text(&self.pdf, pdf_path).await;
        if let Err(ref e) = extracted {
            warn!("Text extraction failed, falling back to vision: {}", e);
        }
        let chosen = route(&extracted, self.config.scanned_text_threshold);
        let text_chars = extracted
            .as_ref()
            .map(|t| t.trim().chars().count())
            .unwrap_or(0);
        info!(
            "{}: {} chars of text → {:?} route",
            pdf_path.display(),
            text_chars,
            chosen
        );

        // ── TextExtraction | VisionExtraction ────────────────────────────
        let (data, page_count) = match (chosen, extracted) {
            (ExtractionRoute::Text, Ok(text)) => {
                let data = llm::extract_from_text(self.text_model.as_ref(), &text, &self.config).await?;
                (data, None)
            }
            _ => {
                let render_start = Instant::now();
                let images = pdf::render_pages(&self.pdf, pdf_path, self.config.render_scale).await?;
                let pages = encode::encode_pages(&images)?;
                drop(images);
                debug!(
                    "Rendered and encoded {} pages in {}ms",
                    pages.len(),
                    render_start.elapsed().as_millis()
                );
                let count = pages.len();
                let data = llm::extract_from_pages(self.vision_model.as_ref(), pages, &self.config).await?;
                (data, Some(count))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Extraction complete via {:?}: {} allergen(s) present, fallback={}, {}ms",
            chosen,
            data.present_allergens().count(),
            data.fallback,
            duration_ms
        );

        Ok(LabelExtraction {
            data,
            route: chosen,
            text_chars,
            page_count,
            duration_ms,
        })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Environment variable naming the provider when none is configured.
pub const PROVIDER_ENV: &str = "EDGEQUAKE_LLM_PROVIDER";

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, LabelError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LabelError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    ensure_model(provider_name, provider.model(), model)?;
    Ok(provider)
}

/// Some providers (the mock one) ignore the requested model.
fn ensure_model(provider_name: &str, actual: &str, requested: &str) -> Result<(), LabelError> {
    if actual == requested {
        return Ok(());
    }
    Err(LabelError::ProviderNotConfigured {
        provider: provider_name.to_string(),
        hint: format!("provider serves model '{actual}' but '{requested}' was requested"),
    })
}

/// Credential variables checked by auto-detection, in priority order.
const DETECTION_ORDER: &[(&str, &[&str])] = &[
    ("ollama", &["OLLAMA_HOST", "OLLAMA_MODEL"]),
    ("lmstudio", &["LMSTUDIO_HOST", "LMSTUDIO_MODEL"]),
    ("anthropic", &["ANTHROPIC_API_KEY"]),
    ("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    ("mistral", &["MISTRAL_API_KEY"]),
    ("xai", &["XAI_API_KEY"]),
    ("huggingface", &["HF_TOKEN", "HUGGINGFACE_TOKEN"]),
    ("openrouter", &["OPENROUTER_API_KEY"]),
];

/// Name of the first provider whose credentials `lookup` finds.
///
/// Follows `ProviderFactory::from_env`'s order, minus its mock fallback, so
/// the detected provider can then be built with an explicit model.
fn detect_provider(lookup: impl Fn(&str) -> Option<String>) -> Option<&'static str> {
    let set = |var: &str| lookup(var).is_some_and(|v| !v.is_empty());

    for (name, vars) in DETECTION_ORDER {
        if vars.iter().any(|v| set(*v)) {
            return Some(*name);
        }
    }
    let azure_key = set("AZURE_OPENAI_CONTENTGEN_API_KEY") || set("AZURE_OPENAI_API_KEY");
    let azure_endpoint =
        set("AZURE_OPENAI_CONTENTGEN_API_ENDPOINT") || set("AZURE_OPENAI_ENDPOINT");
    if azure_key && azure_endpoint {
        return Some("azure");
    }
    None
}

/// Resolve the LLM provider for `model`, from most-specific to least-specific.
///
/// 1. **Named provider** (`config.provider_name`): created with
///    [`ProviderFactory::create_llm_provider`], which reads the matching
///    API key (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …) from the environment.
/// 2. **`EDGEQUAKE_LLM_PROVIDER`**: same, with the provider named by the
///    deployment environment.
/// 3. **`OPENAI_API_KEY`**: OpenAI, preferred when several keys are present.
/// 4. **Auto-detection** from the other providers' credential variables.
///
/// Every step builds the provider for `model`; a provider that cannot serve
/// it is `ProviderNotConfigured`.
fn resolve_provider(config: &ExtractionConfig, model: &str) -> Result<Arc<dyn LLMProvider>, LabelError> {
    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let Ok(prov) = std::env::var(PROVIDER_ENV) {
        if !prov.is_empty() {
            return create_provider(&prov, model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    match detect_provider(|var| std::env::var(var).ok()) {
        Some(name) => {
            debug!("Auto-detected provider '{}' for model '{}'", name, model);
            create_provider(name, model)
        }
        None => Err(LabelError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider."
                .to_string(),
        }),
    }
}
