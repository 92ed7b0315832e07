//! Integration tests for the status endpoints.

mod helpers;

use axum::http::StatusCode;

use helpers::{KernelBehavior, STEP_FILE, TestApp};

#[tokio::test]
async fn test_root_reports_running() {
    let app = TestApp::new().await;

    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["service"], "CAD Engine");
    assert_eq!(body["status"], "running");
    assert_eq!(body["engine"], "FakeKernel");
    assert_eq!(body["environment"], "test");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_limits_and_settings() {
    let app = TestApp::with(KernelBehavior::Succeed, |c| {
        c.limits.max_upload_bytes = 10 * 1024 * 1024;
        c.limits.rate_limit_per_minute = 5;
        c.mesh.linear_deflection = 0.05;
        c.mesh.ascii = true;
    })
    .await;

    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["engine"]["name"], "FakeKernel");
    assert_eq!(body["engine"]["available"], true);
    assert_eq!(
        body["capabilities"],
        serde_json::json!(["STEP", "IGES", "STL"])
    );
    assert_eq!(body["limits"]["max_file_size_bytes"], 10 * 1024 * 1024);
    assert_eq!(body["limits"]["max_file_size_mb"], 10.0);
    assert_eq!(body["limits"]["rate_limit_per_minute"], 5);
    assert_eq!(body["conversion_settings"]["linear_deflection"], 0.05);
    assert_eq!(body["conversion_settings"]["angular_deflection"], 0.5);
    assert_eq!(body["conversion_settings"]["output_format"], "ascii");
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_health_reports_unavailable_kernel() {
    let app = TestApp::with(KernelBehavior::Unavailable, |_| {}).await;

    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["engine"]["available"], false);
}

#[tokio::test]
async fn test_health_includes_conversion_counters() {
    let app = TestApp::new().await;
    app.upload("/convert/step-to-stl", "part.step", STEP_FILE)
        .await;

    let body = app.get("/health").await.json();

    assert_eq!(body["conversions"]["started"], 1);
    assert_eq!(body["conversions"]["succeeded"], 1);
    assert_eq!(body["conversions"]["sample_count"], 1);
}

#[tokio::test]
async fn test_status_routes_are_not_rate_limited() {
    let app = TestApp::with(KernelBehavior::Succeed, |c| {
        c.limits.rate_limit_per_minute = 1;
    })
    .await;

    for _ in 0..5 {
        assert_eq!(app.get("/health").await.status, StatusCode::OK);
    }
}
