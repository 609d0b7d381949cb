//! Model interaction: build the request, call the provider, validate the JSON.
//!
//! The pipeline talks to models through [`LabelModel`], a one-method seam
//! over "instructions (+ images) in, JSON text out". [`ProviderModel`] is the
//! production implementation on top of `edgequake-llm`; tests substitute
//! their own. All prompt wording lives in [`crate::prompts`].
//!
//! ## Failure policy
//!
//! There is no retry. Each call is bounded by `api_timeout_secs`. A quota or
//! rate-limit refusal becomes a degraded [`LabelData`] (see
//! [`LabelData::quota_fallback`]); every other failure propagates.

use crate::config::ExtractionConfig;
use crate::error::{LabelError, ModelError};
use crate::label::LabelData;
use crate::pipeline::postprocess::parse_label_response;
use crate::prompts::{text_extraction_prompt, vision_extraction_prompt, PROMPT_VERSION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Message returned in a degraded result.
pub const QUOTA_FALLBACK_MESSAGE: &str =
    "AI provider quota exceeded or rate limited. Allergen and nutrition data could not be extracted; please try again later.";

/// One inference call: instruction block, optional page images, sampling knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub instructions: String,
    /// Base64 PNG pages, in page order. Empty on the text path.
    pub images: Vec<String>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

/// Something that answers a [`ModelRequest`] with a JSON string.
#[async_trait]
pub trait LabelModel: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Issue one call in strict-JSON mode and return the raw response text.
    async fn complete_json(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// [`LabelModel`] backed by an `edgequake-llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LabelModel for ProviderModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let message = if request.images.is_empty() {
            ChatMessage::user(request.instructions.clone())
        } else {
            let images = request
                .images
                .iter()
                .map(|b64| ImageData::new(b64.clone(), "image/png").with_detail("high"))
                .collect();
            ChatMessage::user_with_images(request.instructions.clone(), images)
        };

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: request.max_tokens,
            response_format: Some("json_object".to_string()),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&[message], Some(&options))
            .await
            .map_err(|e| classify_llm_error(&e))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Sort a provider failure into quota vs. everything else.
///
/// `RateLimited` is quota by construction. Errors that only carry the
/// provider's message are checked with [`classify_provider_error`]; every
/// other variant (token limit, auth, bad request, timeout) is a failure.
pub fn classify_llm_error(e: &LlmError) -> ModelError {
    match e {
        LlmError::RateLimited(_) => ModelError::QuotaExceeded(e.to_string()),
        LlmError::ApiError(_) | LlmError::ProviderError(_) | LlmError::Unknown(_) => {
            classify_provider_error(e.to_string())
        }
        _ => ModelError::Failed(e.to_string()),
    }
}

/// Quota phrases as providers word them: HTTP 429, OpenAI's
/// `insufficient_quota`, Anthropic's `rate_limit_error`, Gemini's
/// `RESOURCE_EXHAUSTED`.
static RE_QUOTA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|\bquota\b|insufficient_quota|rate[ _-]?limit|too many requests|resource_exhausted")
        .unwrap()
});

/// Classify a provider error from its rendered message alone.
pub fn classify_provider_error(message: String) -> ModelError {
    if RE_QUOTA.is_match(&message) {
        ModelError::QuotaExceeded(message)
    } else {
        ModelError::Failed(message)
    }
}

/// Text path: send the full extracted text in one call.
pub async fn extract_from_text(
    model: &dyn LabelModel,
    text: &str,
    config: &ExtractionConfig,
) -> Result<LabelData, LabelError> {
    let request = ModelRequest {
        instructions: text_extraction_prompt(text),
        images: Vec::new(),
        temperature: config.temperature,
        max_tokens: config.text_max_tokens,
    };
    run(model, &request, config.api_timeout_secs).await
}

/// Vision path: one call carrying every page image in order.
pub async fn extract_from_pages(
    model: &dyn LabelModel,
    pages: Vec<String>,
    config: &ExtractionConfig,
) -> Result<LabelData, LabelError> {
    let request = ModelRequest {
        instructions: vision_extraction_prompt(pages.len()),
        images: pages,
        temperature: config.temperature,
        max_tokens: Some(config.vision_max_tokens),
    };
    run(model, &request, config.api_timeout_secs).await
}

async fn run(
    model: &dyn LabelModel,
    request: &ModelRequest,
    timeout_secs: u64,
) -> Result<LabelData, LabelError> {
    let start = Instant::now();
    info!(
        "Calling {} (prompt v{}, {} image(s))",
        model.model_name(),
        PROMPT_VERSION,
        request.images.len()
    );

    let outcome = timeout(Duration::from_secs(timeout_secs), model.complete_json(request)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Err(_) => Err(LabelError::ProviderTimeout { secs: timeout_secs }),
        Ok(Err(ModelError::QuotaExceeded(detail))) => {
            warn!("{}: quota exceeded after {}ms, returning fallback: {}", model.model_name(), elapsed_ms, detail);
            Ok(LabelData::quota_fallback(QUOTA_FALLBACK_MESSAGE))
        }
        Ok(Err(e)) => {
            warn!("{}: call failed after {}ms: {}", model.model_name(), elapsed_ms, e);
            Err(e.into())
        }
        Ok(Ok(raw)) => {
            debug!("{}: {} chars in {}ms", model.model_name(), raw.len(), elapsed_ms);
            parse_label_response(&raw)
        }
    }
}
