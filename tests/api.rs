//! HTTP-level tests for the extraction API.
//!
//! Each test starts the real axum router on a loopback port with a fake PDF
//! engine and fake models behind the crate's `PdfEngine` / `LabelModel`
//! traits, then talks to it with `reqwest` multipart uploads. No pdfium
//! library and no API key are needed.
//!
//! Fake PDF format: the bytes `%PDF-1.7\n` followed by the "text layer". A
//! body containing `CORRUPT` makes text extraction fail.

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use label_extract::pipeline::encode::encode_pages;
use label_extract::{
    serve, AppState, ExtractionConfig, Extractor, LabelError, LabelModel, ModelError, ModelRequest,
    PdfEngine, ServerConfig,
};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

const HEADER: &[u8] = b"%PDF-1.7\n";

struct FakePdf {
    pages: u32,
    fail_render: bool,
    /// Delete the stored upload after reading it, so cleanup finds nothing.
    delete_upload: bool,
    text_calls: AtomicUsize,
    render_calls: AtomicUsize,
    file_present_during_processing: AtomicBool,
}

impl FakePdf {
    fn new(pages: u32) -> Arc<Self> {
        Arc::new(Self {
            pages,
            fail_render: false,
            delete_upload: false,
            text_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            file_present_during_processing: AtomicBool::new(false),
        })
    }

    fn failing_render() -> Arc<Self> {
        Arc::new(Self {
            pages: 2,
            fail_render: true,
            delete_upload: false,
            text_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            file_present_during_processing: AtomicBool::new(false),
        })
    }

    fn deleting_upload() -> Arc<Self> {
        Arc::new(Self {
            pages: 1,
            fail_render: false,
            delete_upload: true,
            text_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            file_present_during_processing: AtomicBool::new(false),
        })
    }
}

/// Pages are told apart by width: page N is N pixels wide.
fn page_images(n: u32) -> Vec<DynamicImage> {
    (1..=n)
        .map(|w| DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, 1, Rgba([0, 0, 0, 255]))))
        .collect()
}

impl PdfEngine for FakePdf {
    fn extract_text(&self, pdf_path: &Path) -> Result<String, LabelError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = std::fs::read(pdf_path).map_err(|e| LabelError::Extraction {
            path: pdf_path.to_path_buf(),
            detail: e.to_string(),
        })?;
        self.file_present_during_processing.store(true, Ordering::SeqCst);
        if self.delete_upload {
            std::fs::remove_file(pdf_path).expect("delete upload");
        }
        let text = String::from_utf8_lossy(&bytes[HEADER.len()..]).to_string();
        if text.contains("CORRUPT") {
            return Err(LabelError::Extraction {
                path: pdf_path.to_path_buf(),
                detail: "broken xref table".into(),
            });
        }
        Ok(text)
    }

    fn render_pages(&self, _: &Path, _: f32) -> Result<Vec<DynamicImage>, LabelError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_render {
            return Err(LabelError::Render {
                page: 2,
                detail: "FPDF_RenderPageBitmap failed".into(),
            });
        }
        Ok(page_images(self.pages))
    }
}

struct FakeModel {
    reply: Result<String, ModelError>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl FakeModel {
    fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn err(e: ModelError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(e),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LabelModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake"
    }

    async fn complete_json(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply.clone()
    }
}

const LABEL_REPLY: &str = r#"{
  "allergens": {"gluten": true, "egg": false, "crustaceans": null, "fish": null,
                "peanut": null, "soy": null, "milk": true, "tree_nuts": null,
                "celery": null, "mustard": null},
  "nutritional_values": {"energy": "1046 kJ / 250 kcal", "fat": null, "carbohydrate": null,
                         "sugar": null, "protein": null, "sodium": null}
}"#;

const DIGITAL_LABEL: &str =
    "Allergének: Glutén, Tej. Energia: 250 kcal. Összetevők: búzaliszt, teljes tejpor, cukor, só.";

// ── Harness ──────────────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    upload_dir: TempDir,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(pdf: Arc<FakePdf>, text: Arc<FakeModel>, vision: Arc<FakeModel>) -> Self {
        Self::start_with_cap(pdf, text, vision, label_extract::DEFAULT_MAX_UPLOAD_BYTES).await
    }

    async fn start_with_cap(
        pdf: Arc<FakePdf>,
        text: Arc<FakeModel>,
        vision: Arc<FakeModel>,
        max_upload_bytes: usize,
    ) -> Self {
        let upload_dir = tempfile::tempdir().expect("tempdir");
        let server = ServerConfig {
            upload_dir: upload_dir.path().to_path_buf(),
            max_upload_bytes,
            ..ServerConfig::default()
        };
        let extractor = Extractor::new(ExtractionConfig::default(), pdf, text, vision);
        let state = AppState::new(extractor, &server);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            serve(listener, state, std::future::pending())
                .await
                .expect("server");
        });

        Self {
            base,
            upload_dir,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn stored_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.upload_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    async fn upload(&self, form: Form) -> (reqwest::StatusCode, Value) {
        let resp = reqwest::Client::new()
            .post(self.url("/api/extract"))
            .multipart(form)
            .send()
            .await
            .expect("request");
        let status = resp.status();
        let body = resp.json::<Value>().await.expect("json body");
        (status, body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn fake_pdf_bytes(text: &str) -> Vec<u8> {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

fn pdf_form(name: &str, bytes: Vec<u8>, mime: &str) -> Form {
    let part = Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str(mime)
        .unwrap();
    Form::new().part("pdf", part)
}

fn label_form(text: &str) -> Form {
    pdf_form("label.pdf", fake_pdf_bytes(text), "application/pdf")
}

fn object_keys(v: &Value) -> Vec<String> {
    v.as_object().unwrap().keys().cloned().collect()
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    let server = TestServer::start(FakePdf::new(1), FakeModel::ok("{}"), FakeModel::ok("{}")).await;
    let resp = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok", "message": "Server is running" }));
}

// ── Intake ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_pdf_field_is_400() {
    let pdf = FakePdf::new(1);
    let server = TestServer::start(pdf.clone(), FakeModel::ok("{}"), FakeModel::ok("{}")).await;

    let form = Form::new().text("comment", "no file here");
    let (status, body) = server.upload(form).await;

    assert_eq!(status, 400);
    assert_eq!(body, json!({ "error": "No PDF file uploaded" }));
    assert_eq!(pdf.text_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn file_under_wrong_field_name_is_400() {
    let server = TestServer::start(FakePdf::new(1), FakeModel::ok("{}"), FakeModel::ok("{}")).await;
    let part = Part::bytes(fake_pdf_bytes(DIGITAL_LABEL))
        .file_name("label.pdf")
        .mime_str("application/pdf")
        .unwrap();
    let (status, body) = server.upload(Form::new().part("file", part)).await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "error": "No PDF file uploaded" }));
}

#[tokio::test]
async fn non_multipart_request_is_400() {
    let server = TestServer::start(FakePdf::new(1), FakeModel::ok("{}"), FakeModel::ok("{}")).await;
    let resp = reqwest::Client::new()
        .post(server.url("/api/extract"))
        .json(&json!({ "pdf": "label.pdf" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": "No PDF file uploaded" }));
}

#[tokio::test]
async fn non_pdf_media_type_is_rejected_before_extraction() {
    let pdf = FakePdf::new(1);
    let text = FakeModel::ok(LABEL_REPLY);
    let server = TestServer::start(pdf.clone(), text.clone(), FakeModel::ok("{}")).await;

    let form = pdf_form("label.png", fake_pdf_bytes(DIGITAL_LABEL), "image/png");
    let (status, body) = server.upload(form).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "No PDF file uploaded");
    assert_eq!(body["details"], "Only PDF files are allowed");
    assert_eq!(pdf.text_calls.load(Ordering::SeqCst), 0);
    assert_eq!(pdf.render_calls.load(Ordering::SeqCst), 0);
    assert_eq!(text.calls(), 0);
    assert!(server.stored_files().is_empty());
}

#[tokio::test]
async fn pdf_media_type_without_pdf_magic_is_rejected() {
    let pdf = FakePdf::new(1);
    let server = TestServer::start(pdf.clone(), FakeModel::ok("{}"), FakeModel::ok("{}")).await;

    let form = pdf_form("label.pdf", b"PK\x03\x04 not a pdf".to_vec(), "application/pdf");
    let (status, body) = server.upload(form).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "No PDF file uploaded");
    assert_eq!(body["details"], "Uploaded file is not a valid PDF");
    assert_eq!(pdf.text_calls.load(Ordering::SeqCst), 0);
    assert!(server.stored_files().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_storage() {
    let pdf = FakePdf::new(1);
    let server = TestServer::start_with_cap(
        pdf.clone(),
        FakeModel::ok("{}"),
        FakeModel::ok("{}"),
        1024 * 1024,
    )
    .await;

    let big = fake_pdf_bytes(&"x".repeat(1024 * 1024 + 1));
    let (status, body) = server.upload(label_form_bytes(big)).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "No PDF file uploaded");
    assert!(
        body["details"].as_str().unwrap().contains("1 MiB upload limit"),
        "got {body}"
    );
    assert_eq!(pdf.text_calls.load(Ordering::SeqCst), 0);
    assert!(server.stored_files().is_empty());
}

#[tokio::test]
async fn upload_at_exact_cap_is_accepted() {
    let cap = 64 * 1024;
    let pdf = FakePdf::new(1);
    let server =
        TestServer::start_with_cap(pdf.clone(), FakeModel::ok(LABEL_REPLY), FakeModel::ok("{}"), cap)
            .await;

    let body_len = cap - HEADER.len();
    let (status, _) = server.upload(label_form(&"a".repeat(body_len))).await;
    assert_eq!(status, 200);
}

fn label_form_bytes(bytes: Vec<u8>) -> Form {
    pdf_form("label.pdf", bytes, "application/pdf")
}

// ── Routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn digital_label_goes_through_text_path() {
    let pdf = FakePdf::new(1);
    let text = FakeModel::ok(LABEL_REPLY);
    let vision = FakeModel::ok("{}");
    let server = TestServer::start(pdf.clone(), text.clone(), vision.clone()).await;

    let (status, body) = server.upload(label_form(DIGITAL_LABEL)).await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "label.pdf");
    assert_eq!(body["data"]["allergens"]["gluten"], true);
    assert_eq!(body["data"]["allergens"]["milk"], true);
    assert_eq!(body["data"]["allergens"]["egg"], false);
    assert!(body["data"]["nutritional_values"]["energy"]
        .as_str()
        .unwrap()
        .contains("250 kcal"));
    assert!(body["data"].get("fallback").is_none());

    assert_eq!(pdf.render_calls.load(Ordering::SeqCst), 0);
    assert_eq!(vision.calls(), 0);
    let requests = text.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].instructions.contains(DIGITAL_LABEL));
    assert!(requests[0].images.is_empty());
}

#[tokio::test]
async fn scanned_label_sends_every_page_in_order() {
    let pdf = FakePdf::new(3);
    let text = FakeModel::ok("{}");
    let vision = FakeModel::ok(LABEL_REPLY);
    let server = TestServer::start(pdf.clone(), text.clone(), vision.clone()).await;

    let (status, body) = server.upload(label_form("   \n")).await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["data"]["allergens"]["gluten"], true);
    assert_eq!(text.calls(), 0);
    assert_eq!(pdf.render_calls.load(Ordering::SeqCst), 1);

    let requests = vision.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].images.len(), 3);
    assert_eq!(requests[0].images, encode_pages(&page_images(3)).unwrap());
    assert_eq!(requests[0].max_tokens, Some(1500));
}

#[tokio::test]
async fn text_just_under_threshold_is_scanned() {
    let pdf = FakePdf::new(1);
    let vision = FakeModel::ok(LABEL_REPLY);
    let server = TestServer::start(pdf.clone(), FakeModel::ok("{}"), vision.clone()).await;

    let (status, _) = server.upload(label_form(&format!("  {}  ", "a".repeat(49)))).await;
    assert_eq!(status, 200);
    assert_eq!(vision.calls(), 1);
}

#[tokio::test]
async fn unreadable_text_layer_falls_back_to_vision() {
    let pdf = FakePdf::new(1);
    let vision = FakeModel::ok(LABEL_REPLY);
    let server = TestServer::start(pdf.clone(), FakeModel::ok("{}"), vision.clone()).await;

    let (status, _) = server
        .upload(label_form("CORRUPT but long enough to pass the scanned-text threshold easily"))
        .await;

    assert_eq!(status, 200);
    assert_eq!(pdf.render_calls.load(Ordering::SeqCst), 1);
    assert_eq!(vision.calls(), 1);
}

// ── Output vocabulary ────────────────────────────────────────────────────────

#[tokio::test]
async fn only_vocabulary_keys_are_returned() {
    let reply = r#"{
      "allergens": {"gluten": true, "sesame": true, "lupin": false},
      "nutritional_values": {"energy": "250 kcal", "fibre": "3 g", "salt": "1 g"},
      "confidence": 0.9
    }"#;
    let server = TestServer::start(FakePdf::new(1), FakeModel::ok(reply), FakeModel::ok("{}")).await;

    let (status, body) = server.upload(label_form(DIGITAL_LABEL)).await;
    assert_eq!(status, 200);

    let mut allergens = object_keys(&body["data"]["allergens"]);
    allergens.sort();
    let mut expected = vec![
        "celery", "crustaceans", "egg", "fish", "gluten", "milk", "mustard", "peanut", "soy",
        "tree_nuts",
    ];
    expected.sort();
    assert_eq!(allergens, expected);

    let mut nutrients = object_keys(&body["data"]["nutritional_values"]);
    nutrients.sort();
    assert_eq!(
        nutrients,
        vec!["carbohydrate", "energy", "fat", "protein", "sodium", "sugar"]
    );
    assert!(body["data"].get("confidence").is_none());
}

// ── Degraded mode ────────────────────────────────────────────────────────────

#[tokio::test]
async fn quota_on_text_path_is_degraded_success() {
    let server = TestServer::start(
        FakePdf::new(1),
        FakeModel::err(ModelError::QuotaExceeded("insufficient_quota".into())),
        FakeModel::ok("{}"),
    )
    .await;

    let (status, body) = server.upload(label_form(DIGITAL_LABEL)).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["fallback"], true);
    assert!(body["data"]["message"].is_string());
    assert_eq!(body["data"]["allergens"], json!({}));
    assert_eq!(body["data"]["nutritional_values"], json!({}));
    assert!(server.stored_files().is_empty());
}

#[tokio::test]
async fn quota_on_vision_path_is_degraded_success() {
    let server = TestServer::start(
        FakePdf::new(2),
        FakeModel::ok("{}"),
        FakeModel::err(ModelError::QuotaExceeded("429 Too Many Requests".into())),
    )
    .await;

    let (status, body) = server.upload(label_form("")).await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["fallback"], true);
    assert_eq!(body["data"]["allergens"], json!({}));
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn provider_failure_is_500_with_details() {
    let server = TestServer::start(
        FakePdf::new(1),
        FakeModel::err(ModelError::Failed("401 invalid api key".into())),
        FakeModel::ok("{}"),
    )
    .await;

    let (status, body) = server.upload(label_form(DIGITAL_LABEL)).await;

    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Failed to process PDF");
    assert!(body["details"].as_str().unwrap().contains("401 invalid api key"));
}

#[tokio::test]
async fn malformed_model_json_is_500() {
    let server = TestServer::start(
        FakePdf::new(1),
        FakeModel::ok("{\"allergens\": {\"gluten\": tru"),
        FakeModel::ok("{}"),
    )
    .await;

    let (status, body) = server.upload(label_form(DIGITAL_LABEL)).await;
    assert_eq!(status, 500);
    assert!(body["details"].as_str().unwrap().contains("malformed JSON"));
}

#[tokio::test]
async fn render_failure_is_500() {
    let vision = FakeModel::ok(LABEL_REPLY);
    let server = TestServer::start(FakePdf::failing_render(), FakeModel::ok("{}"), vision.clone()).await;

    let (status, body) = server.upload(label_form("")).await;

    assert_eq!(status, 500);
    assert!(body["details"].as_str().unwrap().contains("page 2"));
    assert_eq!(vision.calls(), 0);
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_is_removed_after_success_and_failure() {
    let pdf = FakePdf::new(1);
    let ok_server = TestServer::start(pdf.clone(), FakeModel::ok(LABEL_REPLY), FakeModel::ok("{}")).await;
    let (status, _) = ok_server.upload(label_form(DIGITAL_LABEL)).await;
    assert_eq!(status, 200);
    assert!(pdf.file_present_during_processing.load(Ordering::SeqCst));
    assert!(ok_server.stored_files().is_empty());

    let failing = TestServer::start(
        FakePdf::failing_render(),
        FakeModel::ok("{}"),
        FakeModel::ok("{}"),
    )
    .await;
    let (status, _) = failing.upload(label_form("")).await;
    assert_eq!(status, 500);
    assert!(failing.stored_files().is_empty());
}

#[tokio::test]
async fn cleanup_failure_does_not_change_response() {
    let pdf = FakePdf::deleting_upload();
    let text = FakeModel::ok(LABEL_REPLY);
    let server = TestServer::start(pdf.clone(), text.clone(), FakeModel::ok("{}")).await;

    let (status, body) = server.upload(label_form(DIGITAL_LABEL)).await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "label.pdf");
    assert_eq!(body["data"]["allergens"]["gluten"], true);
    assert!(body.get("details").is_none());
    assert_eq!(text.calls(), 1);
    assert!(server.stored_files().is_empty());
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let pdf = FakePdf::new(1);
    let server = Arc::new(
        TestServer::start(pdf.clone(), FakeModel::ok(LABEL_REPLY), FakeModel::ok(LABEL_REPLY)).await,
    );

    let mut tasks = Vec::new();
    for i in 0..8 {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            let text = if i % 2 == 0 { DIGITAL_LABEL } else { "" };
            server.upload(label_form(text)).await
        }));
    }
    for t in tasks {
        let (status, body) = t.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body["filename"], "label.pdf");
    }
    assert_eq!(pdf.text_calls.load(Ordering::SeqCst), 8);
    assert!(server.stored_files().is_empty());
}
