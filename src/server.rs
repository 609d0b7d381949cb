//! HTTP surface: `POST /api/extract` and `GET /api/health`.
//!
//! The handler is the request orchestrator's outer shell:
//!
//! ```text
//! Received ──▶ (intake) ──▶ Extractor::extract_path ──▶ Cleanup ──▶ Responded
//!    │ no/invalid file                    │ error            ▲
//!    └──▶ 400                             └──────────────────┘──▶ 500
//! ```
//!
//! Cleanup runs after the pipeline on both the success and the error path,
//! before the response is built. Requests share nothing mutable; the state
//! only holds `Arc`s to immutable configuration and backends.

use crate::config::ServerConfig;
use crate::error::LabelError;
use crate::extract::Extractor;
use crate::label::LabelData;
use crate::upload::{self, NO_PDF_UPLOADED};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Slack on top of the file cap for multipart boundaries and headers.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Generic message for every 500.
pub const PROCESSING_FAILED: &str = "Failed to process PDF";

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    extractor: Arc<Extractor>,
    upload_dir: Arc<PathBuf>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(extractor: Extractor, server: &ServerConfig) -> Self {
        Self {
            extractor: Arc::new(extractor),
            upload_dir: Arc::new(server.upload_dir.clone()),
            max_upload_bytes: server.max_upload_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
struct ExtractResponse<'a> {
    success: bool,
    data: &'a LabelData,
    filename: &'a str,
}

#[derive(Debug, Serialize)]
struct FailureResponse {
    success: bool,
    error: &'static str,
    details: String,
}

/// Every intake rejection carries the same `error`; `details` says which
/// rule failed and is omitted when no file was uploaded at all.
#[derive(Debug, Serialize)]
struct RejectionResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Build the API router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/extract", post(extract_label))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the upload directory if it does not exist yet.
pub async fn prepare_upload_dir(server: &ServerConfig) -> Result<(), LabelError> {
    tokio::fs::create_dir_all(&server.upload_dir)
        .await
        .map_err(|e| {
            LabelError::InvalidConfig(format!(
                "cannot create upload directory '{}': {}",
                server.upload_dir.display(),
                e
            ))
        })
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

async fn extract_label(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    // ── Received ─────────────────────────────────────────────────────────
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            info!("Rejected non-multipart request: {}", rejection.body_text());
            return rejection_response(None);
        }
    };

    let upload =
        match upload::receive_pdf(&mut multipart, &state.upload_dir, state.max_upload_bytes).await {
            Ok(upload) => upload,
            Err(e) => return error_response(e),
        };
    info!(
        "Received '{}' ({} bytes, {})",
        upload.original_name(),
        upload.size(),
        upload.content_type()
    );

    // ── Classifying → Text/VisionExtraction ──────────────────────────────
    let result = state.extractor.extract_path(upload.path()).await;
    let filename = upload.original_name().to_string();

    // ── Cleanup ──────────────────────────────────────────────────────────
    if let Err(e) = upload.remove().await {
        warn!("{}", e);
    }

    // ── Responded ────────────────────────────────────────────────────────
    match result {
        Ok(extraction) => (
            StatusCode::OK,
            Json(ExtractResponse {
                success: true,
                data: &extraction.data,
                filename: &filename,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

fn rejection_response(details: Option<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(RejectionResponse {
            error: NO_PDF_UPLOADED,
            details,
        }),
    )
        .into_response()
}

fn error_response(e: LabelError) -> Response {
    if e.is_client_error() {
        let reason = e.to_string();
        let details = (reason != NO_PDF_UPLOADED).then_some(reason);
        return rejection_response(details);
    }
    error!("Extraction failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(FailureResponse {
            success: false,
            error: PROCESSING_FAILED,
            details: e.to_string(),
        }),
    )
        .into_response()
}
