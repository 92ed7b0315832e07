//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use cadengine_api::{AppState, build_app};
use cadengine_converter::{
    ConversionJob, ConversionKernel, ConversionPipeline, KernelError, TempStorage,
};
use cadengine_core::config::AppConfig;

/// STL the fake kernel writes on success.
pub const FAKE_STL: &[u8] = b"solid part\n  facet normal 0 0 1\n  endfacet\nendsolid part\n";

/// Minimal STEP Part 21 file.
pub const STEP_FILE: &[u8] = b"ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION(('bracket'),'2;1');\nFILE_NAME('bracket.step','2024-01-01T00:00:00',(''),(''),'','','');\nFILE_SCHEMA(('AUTOMOTIVE_DESIGN'));\nENDSEC;\nDATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\nENDSEC;\nEND-ISO-10303-21;\n";

/// PNG signature followed by an IHDR chunk header.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x10\0\0\0\x10\x08\x06\0\0\0";

const BOUNDARY: &str = "cadengine-test-boundary";

/// Default peer address for requests without an explicit client.
pub const DEFAULT_CLIENT: ([u8; 4], u16) = ([127, 0, 0, 1], 50000);

/// IGES start and global records.
pub fn iges_file() -> Vec<u8> {
    let mut text = format!("{:<72}S{:>7}\n", "Housing exported for conversion", 1);
    text.push_str(&format!("{:<72}G{:>7}\n", "1H,,1H;,7Hhousing", 1));
    text.into_bytes()
}

/// What the fake kernel does when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelBehavior {
    /// Write [`FAKE_STL`].
    Succeed,
    /// Reject the geometry.
    Reject,
    /// Behave like a crashed child process.
    Crash,
    /// Behave like a missing kernel binary.
    Unavailable,
    /// Panic inside the adapter.
    Panic,
}

/// Kernel double that records how often it was called.
#[derive(Debug)]
pub struct FakeKernel {
    behavior: KernelBehavior,
    calls: AtomicUsize,
}

impl FakeKernel {
    pub fn new(behavior: KernelBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionKernel for FakeKernel {
    fn name(&self) -> &str {
        "FakeKernel"
    }

    async fn is_available(&self) -> bool {
        self.behavior != KernelBehavior::Unavailable
    }

    async fn convert(&self, job: &ConversionJob) -> Result<(), KernelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(job.input_path.exists(), "kernel invoked without input file");

        match self.behavior {
            KernelBehavior::Succeed => {
                tokio::fs::write(&job.output_path, FAKE_STL).await?;
                Ok(())
            }
            KernelBehavior::Reject => Err(KernelError::Rejected {
                reason: "malformed geometry: open shell".to_string(),
            }),
            KernelBehavior::Crash => Err(KernelError::Rejected {
                reason: "kernel process crashed".to_string(),
            }),
            KernelBehavior::Unavailable => Err(KernelError::Unavailable {
                reason: "cannot start 'occt-step2stl'".to_string(),
            }),
            KernelBehavior::Panic => panic!("tessellator state corrupted"),
        }
    }
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state behind the router
    pub state: AppState,
    /// Kernel double wired into the pipeline
    pub kernel: Arc<FakeKernel>,
    /// Temp root used by the pipeline
    pub temp_root: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    /// App with default config and a succeeding kernel.
    pub async fn new() -> Self {
        Self::with(KernelBehavior::Succeed, |_| {}).await
    }

    /// App with a given kernel behavior and config tweaks.
    pub async fn with(behavior: KernelBehavior, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = AppConfig {
            environment: "test".to_string(),
            ..AppConfig::default()
        };
        config.storage.temp_dir = dir.path().join("tmp");
        configure(&mut config);

        let storage = TempStorage::open(&config.storage.temp_dir)
            .await
            .expect("Failed to open temp storage");
        let temp_root = storage.root().to_path_buf();

        let kernel = Arc::new(FakeKernel::new(behavior));
        let pipeline = ConversionPipeline::new(storage, kernel.clone(), &config);
        let state = AppState::new(config, pipeline);

        let router = build_app(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(DEFAULT_CLIENT)));

        Self {
            router,
            state,
            kernel,
            temp_root,
            _dir: dir,
        }
    }

    /// Number of entries in the temp root.
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(&self.temp_root)
            .expect("Failed to read temp dir")
            .count()
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(req).await
    }

    /// POST a multipart upload with a single `file` field.
    pub async fn upload(&self, path: &str, filename: &str, data: &[u8]) -> TestResponse {
        self.upload_from(None, path, filename, data).await
    }

    /// POST a multipart upload as a specific client.
    pub async fn upload_from(
        &self,
        client: Option<SocketAddr>,
        path: &str,
        filename: &str,
        data: &[u8],
    ) -> TestResponse {
        let mut req = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("file", Some(filename), data)))
            .expect("Failed to build request");
        if let Some(addr) = client {
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        self.send(req).await
    }

    /// Send a prepared request through the router.
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
            .await
            .expect("Failed to read body");

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Build a multipart body with one field.
pub fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    match filename {
        Some(name) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
        ),
    }
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Content type matching [`multipart_body`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
}

impl TestResponse {
    /// Body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Body is not JSON")
    }

    /// Header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
