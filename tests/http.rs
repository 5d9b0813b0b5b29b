//! HTTP tests against the real router with fake analyzer and advisor.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use facereport::{
    router, AppState, Pipeline, ReportStore, ServiceConfig, TokenVerifier, UploadResponse,
    UserIdentity,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "facereport-test-boundary";

struct Harness {
    app: Router,
    analyzer: Arc<FixtureAnalyzer>,
    dir: tempfile::TempDir,
}

async fn harness(analyzer: Arc<FixtureAnalyzer>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig::builder()
        .jwt_secret(SECRET)
        .storage_dir(dir.path())
        .build()
        .unwrap();
    let store = ReportStore::new(dir.path()).await.unwrap();
    let pipeline = Pipeline::new(analyzer.clone(), ScriptedAdvisor::ok(), store);
    Harness {
        app: router(AppState::new(config, pipeline)),
        analyzer,
        dir,
    }
}

fn token(gender: Option<&str>) -> String {
    TokenVerifier::new(SECRET)
        .issue(&identity(gender), chrono::Duration::minutes(10))
        .unwrap()
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"photo.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(auth_cookie: Option<&str>, field: &str, bytes: &[u8]) -> Request<Body> {
    upload_request_with_cookies(auth_cookie.map(|t| format!("token={t}")), field, bytes)
}

fn upload_request_with_cookies(cookies: Option<String>, field: &str, bytes: &[u8]) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(c) = cookies {
        req = req.header(header::COOKIE, c);
    }
    req.body(Body::from(multipart_body(field, bytes))).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().uri(uri);
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    req.body(Body::empty()).unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn json_body(resp: axum::response::Response) -> UploadResponse {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

/// `name=value` of the `report_id` cookie set by a response, if any.
fn report_cookie(resp: &axum::response::Response) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|kv| kv.starts_with("report_id="))
        .map(str::to_string)
}

fn dir_is_empty(path: std::path::PathBuf) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

// ── Uploads ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_then_download_once() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let t = token(Some("Male"));

    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&t), "image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = report_cookie(&resp).expect("report cookie");
    let body = json_body(resp).await;
    assert_eq!(body, UploadResponse::ok());
    assert!(dir_is_empty(h.dir.path().join("uploads")));

    let resp = h
        .app
        .clone()
        .oneshot(get("/download", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Face_Detection_Result.pdf\""
    );
    let pdf = body_bytes(resp).await;
    assert!(pdf.starts_with(b"%PDF-"));
    assert!(contains(&pdf, "(ada)"));
    assert!(contains(&pdf, "BEST BEARD"));
    assert!(dir_is_empty(h.dir.path().join("reports")));

    let resp = h
        .app
        .clone()
        .oneshot(get("/download", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_upload_replaces_the_first_report() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let t = token(Some("Male"));

    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&t), "image", &png_bytes()))
        .await
        .unwrap();
    let first = report_cookie(&resp).unwrap();

    let resp = h
        .app
        .clone()
        .oneshot(upload_request_with_cookies(
            Some(format!("token={t}; {first}")),
            "image",
            &png_bytes(),
        ))
        .await
        .unwrap();
    let second = report_cookie(&resp).unwrap();
    assert_ne!(first, second);

    let first_id = first.trim_start_matches("report_id=").to_string();
    let resp = h
        .app
        .clone()
        .oneshot(get(&format!("/download/{first_id}"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .app
        .clone()
        .oneshot(get("/download", Some(&second)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(dir_is_empty(h.dir.path().join("reports")));
}

#[tokio::test]
async fn non_male_report_has_no_beard_block() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&token(Some("Female"))), "image", &png_bytes()))
        .await
        .unwrap();
    let cookie = report_cookie(&resp).unwrap();
    let id = cookie.trim_start_matches("report_id=").to_string();

    let resp = h
        .app
        .clone()
        .oneshot(get(&format!("/download/{id}"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let pdf = body_bytes(resp).await;
    assert!(!contains(&pdf, "BEST BEARD"));
    assert!(contains(&pdf, "BEST HAIRSTYLES"));
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token(None)))
        .body(Body::from(multipart_body("image", &png_bytes())))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(json_body(resp).await.success);
}

#[tokio::test]
async fn analyzer_without_output() {
    let h = harness(FixtureAnalyzer::stdout("")).await;
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&token(None)), "image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(report_cookie(&resp).is_none());
    let body = json_body(resp).await;
    assert_eq!(
        body,
        UploadResponse::failure("No data received from analyzer.")
    );
    assert!(dir_is_empty(h.dir.path().join("uploads")));
    assert!(dir_is_empty(h.dir.path().join("reports")));
}

#[tokio::test]
async fn analyzer_with_unterminated_json() {
    let h = harness(FixtureAnalyzer::stdout("{\"AcnePrediction\": 0.2,")).await;
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&token(None)), "image", &png_bytes()))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert!(!body.success);
    // An unterminated object is not even a span.
    assert_eq!(
        body.message.as_deref(),
        Some("Invalid JSON format from analyzer output.")
    );
}

#[tokio::test]
async fn analyzer_with_malformed_json() {
    let h = harness(FixtureAnalyzer::stdout(r#"{"FaceShape": Oval}"#)).await;
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&token(None)), "image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(report_cookie(&resp).is_none());
    assert_eq!(
        json_body(resp).await,
        UploadResponse::failure("Failed to parse JSON from analyzer output.")
    );
    assert!(dir_is_empty(h.dir.path().join("uploads")));
}

#[tokio::test]
async fn missing_image_field_is_bad_request() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&token(None)), "avatar", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await.message.as_deref(), Some("No image uploaded."));
    assert_eq!(h.analyzer.calls(), 0);
}

// ── Identity ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_without_identity_is_unauthorized() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(None, "image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(!json_body(resp).await.success);
    assert_eq!(h.analyzer.calls(), 0);
    assert!(dir_is_empty(h.dir.path().join("uploads")));
}

#[tokio::test]
async fn token_signed_with_another_secret_is_unauthorized() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let forged = TokenVerifier::new("other")
        .issue(&UserIdentity::default(), chrono::Duration::minutes(5))
        .unwrap();
    let resp = h
        .app
        .clone()
        .oneshot(upload_request(Some(&forged), "image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ── Downloads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_without_report_is_not_found() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let resp = h.app.clone().oneshot(get("/download", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .app
        .clone()
        .oneshot(get("/download", Some("report_id=not-a-uuid")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .app
        .clone()
        .oneshot(get(&format!("/download/{}", uuid::Uuid::new_v4()), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health() {
    let h = harness(FixtureAnalyzer::stdout(GOOD_OUTPUT)).await;
    let resp = h.app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(v["status"], "ok");
}
