#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use pau_core::config::PipelineConfig;
use pau_pipeline::submission::SubmissionPipeline;
use pau_pipeline::testing::RecordingRunner;
use tempfile::TempDir;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use pau_api::config::ServerConfig;
use pau_api::router::build_app_router;
use pau_api::state::AppState;

/// Build a test `ServerConfig` with every pipeline directory under `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        pipeline: PipelineConfig::rooted_at(root),
    }
}

/// A router wired to a recording runner, plus the handles tests inspect.
pub struct TestApp {
    pub router: Router,
    pub runner: Arc<RecordingRunner>,
    pub config: ServerConfig,
    _root: TempDir,
}

pub fn build_test_app(runner: RecordingRunner) -> TestApp {
    build_test_app_with(runner, |_| {})
}

/// Like [`build_test_app`], letting the test adjust the configuration first.
pub fn build_test_app_with(
    runner: RecordingRunner,
    adjust: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let root = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(root.path());
    adjust(&mut config);

    let runner = Arc::new(runner);
    let pipeline = SubmissionPipeline::new(Arc::new(config.pipeline.clone()), runner.clone());
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        submissions: TaskTracker::new(),
    };

    TestApp {
        router: build_app_router(state, &config),
        runner,
        config,
        _root: root,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    app.router.clone().oneshot(request).await.expect("response")
}

pub async fn post_multipart(app: &TestApp, uri: &str, form: MultipartForm) -> Response<Body> {
    let (content_type, body) = form.finish();
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .expect("request");
    app.router.clone().oneshot(request).await.expect("response")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf8 body")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

const BOUNDARY: &str = "----pau-test-boundary";

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, contents: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// The body so far, without the closing boundary, as a client that
    /// stalled mid-upload would have sent it.
    pub fn unfinished(self) -> (String, Vec<u8>) {
        (format!("multipart/form-data; boundary={BOUNDARY}"), self.body)
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), self.body)
    }
}

/// The three fields every theme requires.
pub fn basic_form() -> MultipartForm {
    MultipartForm::new()
        .text("tester", "alice")
        .text("testname", "boot-test")
        .text("passfail", "PASS")
}
