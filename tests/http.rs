//! HTTP surface tests: drive the axum router in-process with a fake pandoc.

#![cfg(all(unix, feature = "server"))]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use md2pdf::server::{router, AppState};
use md2pdf::{ConverterConfig, JobKey, ServiceSettings};
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tower::ServiceExt;

// ── Fixture ──────────────────────────────────────────────────────────────────

struct TestApp {
    dir: TempDir,
    state: AppState,
}

impl TestApp {
    /// Service whose converter is a shell script; `{dir}` expands to the
    /// fixture's scratch directory.
    fn with_script(body: &str) -> Self {
        Self::build(body, |_| {})
    }

    fn build(body: &str, tweak: impl FnOnce(&mut ServiceSettings)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let program = dir.path().join("fake-pandoc");
        let script = format!(
            "#!/bin/sh\n{}\n",
            body.replace("{dir}", &dir.path().display().to_string())
        );
        std::fs::write(&program, script).expect("write script");
        let mut perms = std::fs::metadata(&program).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&program, perms).expect("set perms");

        let mut settings = ServiceSettings {
            upload_dir: dir.path().join("uploads"),
            output_dir: dir.path().join("outputs"),
            converter: ConverterConfig::builder()
                .pandoc_path(&program)
                .timeout(Duration::from_secs(10))
                .grace_period(Duration::from_millis(300))
                .build()
                .expect("config"),
            ..ServiceSettings::default()
        };
        tweak(&mut settings);
        Self {
            dir,
            state: AppState::new(settings),
        }
    }

    fn pdf_writer() -> Self {
        Self::with_script(
            r#"cp "$1" "{dir}/captured.md"
for a in "$@"; do echo "$a"; done > "{dir}/args.log"
printf '%%PDF-1.4 fake\n' > "$3""#,
        )
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, bytes)
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(request).await;
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("non-JSON body ({e}): {}", String::from_utf8_lossy(&bytes)));
        (status, value)
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "md2pdf-test-boundary";

/// Build a multipart/form-data request. `file` is `(filename, contents)`.
fn post_multipart(file: Option<(&str, &str)>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((filename, contents)) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/markdown\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

// ── Metadata routes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn presets_are_listed_in_order() {
    let app = TestApp::pdf_writer();
    let (status, bytes) = app.send(get("/api/config-presets")).await;
    assert_eq!(status, StatusCode::OK);

    let raw = String::from_utf8(bytes).unwrap();
    let positions: Vec<usize> = ["academic", "simple", "book", "chinese", "japanese", "korean"]
        .iter()
        .map(|name| raw.find(&format!("\"{name}\"")).unwrap_or_else(|| panic!("{name} missing")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{raw}");

    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["chinese"]["document_class"], "ctexart");
    assert_eq!(value["chinese"]["language"], "zh");
    assert_eq!(value["book"]["toc"], true);
}

#[tokio::test]
async fn health_reports_version_and_jobs() {
    let app = TestApp::pdf_writer();
    let (status, body) = app.send_json(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["active_jobs"], 0);
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = TestApp::pdf_writer();
    let (status, body) = app.send_json(get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

// ── /convert-text ────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_text_requires_text() {
    let app = TestApp::pdf_writer();
    let (status, body) = app
        .send_json(post_json("/convert-text", &json!({"language": "en"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No text provided");

    let malformed = Request::builder()
        .method("POST")
        .uri("/convert-text")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send_json(malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No text provided");
}

#[tokio::test]
async fn convert_text_produces_downloadable_pdf() {
    let app = TestApp::pdf_writer();
    let (status, body) = app
        .send_json(post_json(
            "/convert-text",
            &json!({"text": "# 안녕하세요", "language": "ko", "toc": "true"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Conversion successful");

    let url = body["download_url"].as_str().unwrap();
    assert!(url.starts_with("/download/") && url.ends_with("_converted.pdf"), "{url}");

    let captured = std::fs::read(app.path("captured.md")).unwrap();
    assert!(captured.starts_with(b"\xEF\xBB\xBF"));
    let args = std::fs::read_to_string(app.path("args.log")).unwrap();
    assert!(args.lines().any(|l| l == "--toc"));
    assert!(args.lines().any(|l| l == "markdown+east_asian_line_breaks"));

    let response = app.app().oneshot(get(url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn converter_failure_is_500_with_message() {
    let app = TestApp::with_script(r#"echo '! LaTeX Error: File ctex.sty not found.' >&2; exit 43"#);
    let (status, body) = app
        .send_json(post_json("/convert-text", &json!({"text": "# x"})))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("43"), "{error}");
    assert!(error.contains("ctex.sty"), "{error}");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = TestApp::build("exit 0", |s| s.max_body_bytes = 1024);
    let text = "x".repeat(4096);
    let (status, body) = app
        .send_json(post_json("/convert-text", &json!({ "text": text })))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "File too large");
}

// ── /cancel ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_validates_request_id() {
    let app = TestApp::pdf_writer();

    let (status, body) = app.send_json(post_json("/cancel", &json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No request_id provided");

    let (status, body) = app
        .send_json(post_json("/cancel", &json!({"request_id": "ghost"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cancel_stops_in_flight_conversion() {
    let app = TestApp::with_script("exec sleep 30");
    let registry = app.state.converter.registry().clone();

    let pending = {
        let service = app.app();
        tokio::spawn(async move {
            service
                .oneshot(post_json(
                    "/convert-text",
                    &json!({"text": "# slow", "request_id": "req-7"}),
                ))
                .await
                .unwrap()
        })
    };

    let key = JobKey::from("req-7");
    let start = Instant::now();
    while !registry.contains(&key) {
        assert!(start.elapsed() < Duration::from_secs(5), "job never registered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (_, health) = app.send_json(get("/health")).await;
    assert_eq!(health["active_jobs"], 1);

    let (status, body) = app
        .send_json(post_json("/cancel", &json!({"request_id": "req-7"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let response = pending.await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("cancelled"));
    assert!(registry.is_empty());
}

// ── /upload ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_rejects_missing_and_unsupported_files() {
    let app = TestApp::pdf_writer();

    let (status, body) = app.send_json(post_multipart(None, &[("toc", "true")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file part");

    let (status, body) = app.send_json(post_multipart(Some(("", "# x")), &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No selected file");

    let (status, body) = app
        .send_json(post_multipart(Some(("report.docx", "PK")), &[]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not allowed"));
}

#[tokio::test]
async fn upload_converts_and_removes_staged_file() {
    let app = TestApp::pdf_writer();
    let (status, body) = app
        .send_json(post_multipart(
            Some(("../My Notes.md", "# Notes\n")),
            &[("number_sections", "true"), ("request_id", "up-1")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let url = body["download_url"].as_str().unwrap();
    let filename = url.strip_prefix("/download/").unwrap();
    assert!(filename.ends_with("_My_Notes.pdf"), "{filename}");
    assert!(app.path("outputs").join(filename).exists());

    assert_eq!(std::fs::read_to_string(app.path("captured.md")).unwrap(), "# Notes\n");
    let args = std::fs::read_to_string(app.path("args.log")).unwrap();
    assert!(args.lines().any(|l| l == "-N"));
    assert!(!args.lines().any(|l| l == "-f"), "upload path must not force east-asian breaks");

    assert!(dir_is_empty(&app.path("uploads")), "upload left behind");
    assert!(app.state.converter.registry().is_empty());
}

#[tokio::test]
async fn failed_upload_conversion_still_removes_upload() {
    let app = TestApp::with_script("exit 1");
    let (status, _) = app
        .send_json(post_multipart(Some(("notes.txt", "hello")), &[]))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(dir_is_empty(&app.path("uploads")));
}

// ── /download ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_rejects_traversal_and_missing_files() {
    let app = TestApp::pdf_writer();
    std::fs::create_dir_all(app.path("outputs")).unwrap();
    std::fs::write(app.path("secret.pdf"), "%PDF secret").unwrap();

    let (status, _) = app.send(get("/download/..%2Fsecret.pdf")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send_json(get("/download/missing.pdf")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "File not found");
}
