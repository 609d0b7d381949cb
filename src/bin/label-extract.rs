//! CLI binary for label-extract.
//!
//! `serve` (the default) runs the HTTP API; `extract` runs the same pipeline
//! once on a local file and prints the JSON result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use label_extract::server::prepare_upload_dir;
use label_extract::{serve, AppState, ExtractionConfig, Extractor, ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API on port 3001
  label-extract serve

  # Upload a label
  curl -F "pdf=@label.pdf;type=application/pdf" http://localhost:3001/api/extract

  # One-shot extraction without the server
  label-extract extract label.pdf --pretty

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  PDFIUM_LIB_PATH         Path to libpdfium (default: system library)
  PORT                    Listening port for `serve`
"#;

/// Extract allergen and nutrition data from food-label PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "label-extract",
    version,
    about = "Extract allergen and nutrition data from food-label PDFs using text and vision LLMs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Server settings used when no subcommand is given.
    #[command(flatten)]
    serve: ServeArgs,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LABEL_EXTRACT_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve(ServeArgs),
    /// Extract one local PDF and print the JSON result.
    Extract {
        /// Local PDF file path.
        input: PathBuf,

        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Working directory for in-flight uploads (created if absent).
    #[arg(long, env = "LABEL_EXTRACT_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Largest accepted upload, in bytes.
    #[arg(long, env = "LABEL_EXTRACT_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model for digital (text-layer) labels.
    #[arg(long, global = true, env = "LABEL_EXTRACT_TEXT_MODEL", default_value = "gpt-4o-mini")]
    text_model: String,

    /// Vision model for scanned labels.
    #[arg(long, global = true, env = "LABEL_EXTRACT_VISION_MODEL", default_value = "gpt-4o")]
    vision_model: String,

    /// Texts shorter than this many characters are treated as scanned.
    #[arg(long, global = true, env = "LABEL_EXTRACT_SCANNED_THRESHOLD", default_value_t = 50)]
    scanned_threshold: usize,

    /// Page upscaling factor for the vision path (0.5–6.0).
    #[arg(long, global = true, env = "LABEL_EXTRACT_RENDER_SCALE", default_value_t = 3.0)]
    render_scale: f32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "LABEL_EXTRACT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens for the vision path.
    #[arg(long, global = true, env = "LABEL_EXTRACT_VISION_MAX_TOKENS", default_value_t = 1500)]
    vision_max_tokens: usize,

    /// Max output tokens for the text path (provider default when unset).
    #[arg(long, global = true, env = "LABEL_EXTRACT_TEXT_MAX_TOKENS")]
    text_max_tokens: Option<usize>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "LABEL_EXTRACT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.pipeline)?;
    let extractor = Extractor::from_config(config).context("Failed to initialise extractor")?;

    match cli.command {
        None => run_server(cli.serve, extractor).await,
        Some(Command::Serve(args)) => run_server(args, extractor).await,
        Some(Command::Extract { input, pretty }) => run_once(&input, pretty, &extractor).await,
    }
}

async fn run_server(args: ServeArgs, extractor: Extractor) -> Result<()> {
    let server = ServerConfig {
        host: args.host,
        port: args.port,
        upload_dir: args.upload_dir,
        max_upload_bytes: args.max_upload_bytes,
    };
    prepare_upload_dir(&server)
        .await
        .context("Failed to prepare upload directory")?;

    let addr = server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("{:?}", extractor.config());
    let state = AppState::new(extractor, &server);
    serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await
    .context("Server error")
}

async fn run_once(input: &Path, pretty: bool, extractor: &Extractor) -> Result<()> {
    let out = extractor
        .extract_path(input)
        .await
        .with_context(|| format!("Extraction failed for {}", input.display()))?;

    let json = if pretty {
        serde_json::to_string_pretty(&out).context("Failed to serialise output")?
    } else {
        serde_json::to_string(&out).context("Failed to serialise output")?
    };
    println!("{json}");
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(args: &PipelineArgs) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .text_model(&args.text_model)
        .vision_model(&args.vision_model)
        .scanned_text_threshold(args.scanned_threshold)
        .render_scale(args.render_scale)
        .temperature(args.temperature)
        .vision_max_tokens(args.vision_max_tokens)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(n) = args.text_max_tokens {
        builder = builder.text_max_tokens(n);
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }

    builder.build().context("Invalid configuration")
}
