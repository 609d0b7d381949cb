//! Configuration types for label extraction and the HTTP server.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`] once at process start and shared
//! read-only by every request. [`ServerConfig`] holds the HTTP-only knobs
//! (bind address, upload directory, size cap).

use crate::error::LabelError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Configuration for the extraction pipeline.
///
/// # Example
/// ```rust
/// use label_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .scanned_text_threshold(80)
///     .render_scale(2.0)
///     .vision_model("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.scanned_text_threshold, 80);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Trimmed text shorter than this many characters marks the PDF as
    /// scanned and routes it to the vision path. Default: 50.
    pub scanned_text_threshold: usize,

    /// Upscaling factor applied to each page's natural size when rasterising
    /// for the vision model. Range: 0.5–6.0. Default: 3.0.
    pub render_scale: f32,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Model used for the text path. Default: "gpt-4o-mini".
    pub text_model: String,

    /// Vision-capable model used for scanned documents. Default: "gpt-4o".
    pub vision_model: String,

    /// Sampling temperature for both paths. Default: 0.1.
    pub temperature: f32,

    /// Output-token cap for the text path. Default: None (provider default).
    pub text_max_tokens: Option<usize>,

    /// Output-token cap for the vision path. Default: 1500.
    pub vision_max_tokens: usize,

    /// Per-inference-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Explicit pdfium shared library. If None, the system library is used.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            scanned_text_threshold: 50,
            render_scale: 3.0,
            provider_name: None,
            text_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            temperature: 0.1,
            text_max_tokens: None,
            vision_max_tokens: 1500,
            api_timeout_secs: 60,
            pdfium_library: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("scanned_text_threshold", &self.scanned_text_threshold)
            .field("render_scale", &self.render_scale)
            .field("provider_name", &self.provider_name)
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .field("temperature", &self.temperature)
            .field("text_max_tokens", &self.text_max_tokens)
            .field("vision_max_tokens", &self.vision_max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_library", &self.pdfium_library)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn scanned_text_threshold(mut self, chars: usize) -> Self {
        self.config.scanned_text_threshold = chars;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn text_max_tokens(mut self, n: usize) -> Self {
        self.config.text_max_tokens = Some(n);
        self
    }

    pub fn vision_max_tokens(mut self, n: usize) -> Self {
        self.config.vision_max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, LabelError> {
        let c = &self.config;
        if !(0.5..=6.0).contains(&c.render_scale) {
            return Err(LabelError::InvalidConfig(format!(
                "render scale must be 0.5–6.0, got {}",
                c.render_scale
            )));
        }
        if c.vision_max_tokens == 0 {
            return Err(LabelError::InvalidConfig(
                "vision max tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(LabelError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.text_model.trim().is_empty() || c.vision_model.trim().is_empty() {
            return Err(LabelError::InvalidConfig("model names must not be empty".into()));
        }
        Ok(self.config)
    }
}

/// 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Where uploads are stored while a request is in flight.
    pub upload_dir: PathBuf,
    /// Largest accepted PDF, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3001,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
