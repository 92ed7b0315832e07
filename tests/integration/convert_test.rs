//! Integration tests for the conversion endpoints.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use helpers::{FAKE_STL, KernelBehavior, PNG_BYTES, STEP_FILE, TestApp};

const BINARY: &str = "/convert/step-to-stl";
const BASE64: &str = "/convert/step-to-stl-base64";

#[tokio::test]
async fn test_step_to_stl_binary() {
    let app = TestApp::new().await;

    let response = app.upload(BINARY, "bracket.step", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header("content-type"),
        Some("application/octet-stream")
    );
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"bracket.stl\"")
    );
    assert_eq!(response.header("x-original-filename"), Some("bracket.step"));
    assert_eq!(response.header("x-conversion-engine"), Some("FakeKernel"));
    assert_eq!(
        response.header("x-file-size"),
        Some(FAKE_STL.len().to_string().as_str())
    );
    assert_eq!(
        response.header("x-mesh-quality"),
        Some("linear=0.1,angular=0.5")
    );
    assert!(!response.body.is_empty());
    assert_eq!(&response.body[..], FAKE_STL);

    assert_eq!(app.kernel.calls(), 1);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_iges_upload_converts() {
    let app = TestApp::new().await;

    let response = app
        .upload(BINARY, "housing.igs", &helpers::iges_file())
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"housing.stl\"")
    );
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_base64_matches_binary_output() {
    let app = TestApp::new().await;

    let binary = app.upload(BINARY, "bracket.stp", STEP_FILE).await;
    let encoded = app.upload(BASE64, "bracket.stp", STEP_FILE).await;

    assert_eq!(binary.status, StatusCode::OK);
    assert_eq!(encoded.status, StatusCode::OK);

    let body = encoded.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["original_filename"], "bracket.stp");
    assert_eq!(body["stl_filename"], "bracket.stl");
    assert_eq!(body["stl_size"], binary.body.len() as u64);
    assert_eq!(body["mesh_quality"]["linear_deflection"], 0.1);
    assert_eq!(body["mesh_quality"]["angular_deflection"], 0.5);

    let decoded = STANDARD
        .decode(body["stl_base64"].as_str().expect("stl_base64"))
        .expect("valid base64");
    assert_eq!(decoded, binary.body.to_vec());

    assert_eq!(app.kernel.calls(), 2);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_non_cad_bytes_named_step_rejected() {
    let app = TestApp::new().await;

    let response = app
        .upload(BINARY, "model.step", b"just some notes, not geometry")
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["kind"], "content_type_mismatch");
    assert_eq!(app.kernel.calls(), 0);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_png_renamed_to_step_rejected() {
    let app = TestApp::new().await;

    let response = app.upload(BASE64, "model.step", PNG_BYTES).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["details"]["kind"], "content_type_mismatch");
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .contains("PNG image")
    );
    assert_eq!(app.kernel.calls(), 0);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_unsupported_extension_rejected() {
    let app = TestApp::new().await;

    let response = app.upload(BINARY, "setup.exe", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["details"]["kind"], "unsupported_extension");
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .contains("step, stp, p21, iges, igs")
    );
    assert_eq!(app.kernel.calls(), 0);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_oversized_upload_rejected_without_kernel_call() {
    let app = TestApp::with(KernelBehavior::Succeed, |c| {
        c.limits.max_upload_bytes = 64;
    })
    .await;

    let response = app.upload(BINARY, "big.step", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["kind"], "size_exceeded");
    assert_eq!(app.kernel.calls(), 0);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let app = TestApp::new().await;

    let response = app.upload(BINARY, "empty.step", b"").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["details"]["kind"], "empty_file");
    assert_eq!(app.kernel.calls(), 0);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_kernel_failure_is_422_and_cleans_up() {
    let app = TestApp::with(KernelBehavior::Reject, |_| {}).await;

    let response = app.upload(BINARY, "bracket.step", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json();
    assert_eq!(body["error"], "CONVERSION_ERROR");
    assert_eq!(
        body["message"],
        "Conversion failed: malformed geometry: open shell"
    );
    assert_eq!(app.kernel.calls(), 1);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_kernel_crash_is_422() {
    let app = TestApp::with(KernelBehavior::Crash, |_| {}).await;

    let response = app.upload(BASE64, "bracket.step", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_missing_kernel_is_internal_error() {
    let app = TestApp::with(KernelBehavior::Unavailable, |_| {}).await;

    let response = app.upload(BINARY, "bracket.step", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["error"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "Internal server error during conversion");
    assert!(body.get("details").is_none());
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_kernel_panic_is_internal_error() {
    let app = TestApp::with(KernelBehavior::Panic, |_| {}).await;

    let response = app.upload(BINARY, "bracket.step", STEP_FILE).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["error"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "Internal server error during conversion");
    assert!(body.get("details").is_none());
    assert_eq!(app.kernel.calls(), 1);
    assert_eq!(app.temp_entries(), 0);

    let after = app.upload(BINARY, "bracket.step", STEP_FILE).await;
    assert_eq!(after.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.state.pipeline.available_slots(), app.state.pipeline.max_slots());
}

#[tokio::test]
async fn test_missing_file_field_rejected() {
    let app = TestApp::new().await;

    let req = Request::builder()
        .method("POST")
        .uri(BINARY)
        .header(header::CONTENT_TYPE, helpers::multipart_content_type())
        .body(Body::from(helpers::multipart_body(
            "comment",
            None,
            b"no file here",
        )))
        .expect("request");
    let response = app.send(req).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["details"]["kind"], "missing_file");
    assert_eq!(app.temp_entries(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_rejected() {
    let app = TestApp::new().await;

    let req = Request::builder()
        .method("POST")
        .uri(BINARY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .expect("request");
    let response = app.send(req).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["details"]["kind"], "malformed_upload");
    assert_eq!(app.kernel.calls(), 0);
}

#[tokio::test]
async fn test_directory_in_filename_is_stripped() {
    let app = TestApp::new().await;

    let response = app
        .upload(BASE64, "exports/parts/flange.STEP", STEP_FILE)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["original_filename"], "flange.STEP");
    assert_eq!(body["stl_filename"], "flange.stl");
}

#[tokio::test]
async fn test_metrics_track_outcomes() {
    let app = TestApp::new().await;

    app.upload(BINARY, "ok.step", STEP_FILE).await;
    app.upload(BINARY, "bad.step", PNG_BYTES).await;

    let snapshot = app.state.pipeline.metrics().snapshot();
    assert_eq!(snapshot.started, 2);
    assert_eq!(snapshot.succeeded, 1);
    assert_eq!(snapshot.validation_rejected, 1);
    assert_eq!(snapshot.output_bytes, FAKE_STL.len() as u64);
}
