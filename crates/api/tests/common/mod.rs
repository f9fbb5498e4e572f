#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use advex_api::config::ServerConfig;
use advex_api::router::build_app_router;
use advex_api::session::SessionConfig;
use advex_api::state::AppState;
use advex_core::admission::{AdmissionController, StaticWorkerRegistry};
use advex_core::artifacts::DirArtifactStore;
use advex_core::labels::LabelTable;
use advex_core::orchestrator::JobOrchestrator;
use advex_core::progress_log::FileProgressLogStore;
use advex_core::queue::InMemoryJobQueue;
use advex_core::session::InMemorySessionStore;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const UPLOAD_PATH: &str = "results-7f3a";
const BOUNDARY: &str = "advex-test-boundary";

const SYNSETS: &str = "\
n01440764 tench, Tinca tinca
n01443537 goldfish, Carassius auratus
n01484850 great white shark, white shark
n01491361 tiger shark, Galeocerdo cuvieri
";

/// Build a test `ServerConfig` rooted in `dir`.
pub fn test_config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8080".to_string()],
        request_timeout_secs: 30,
        static_dir: dir.join("static"),
        log_dir: dir.join("log"),
        labels_path: dir.join("synset_words.txt"),
        upload_path: UPLOAD_PATH.to_string(),
        session: SessionConfig {
            secret: "test-secret".to_string(),
            ttl_days: 1,
        },
        max_upload_bytes: 64 * 1024,
        random_image_url: "http://127.0.0.1:1/random".to_string(),
        database_url: None,
        local_workers: 1,
        worker_liveness_secs: 90,
        public_base_url: "http://localhost:8080".to_string(),
    }
}

/// Router plus handles on the in-memory collaborators behind it.
pub struct TestApp {
    pub router: Router,
    pub queue: Arc<InMemoryJobQueue>,
    pub logs: Arc<FileProgressLogStore>,
    pub static_dir: PathBuf,
    _dir: tempfile::TempDir,
}

/// Build the full application router in local mode with `workers` live
/// worker slots and no worker tasks actually running.
pub fn build_test_app(workers: u64) -> TestApp {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.static_dir).unwrap();
    std::fs::create_dir_all(&config.log_dir).unwrap();

    let queue = Arc::new(InMemoryJobQueue::new());
    let logs = Arc::new(FileProgressLogStore::new(config.log_dir.clone()));
    let artifacts = Arc::new(DirArtifactStore::new(config.static_dir.clone()));

    let orchestrator = JobOrchestrator::new(
        AdmissionController::new(queue.clone(), Arc::new(StaticWorkerRegistry(workers))),
        queue.clone(),
        logs.clone(),
        artifacts.clone(),
        Arc::new(InMemorySessionStore::new(config.session.ttl())),
        Arc::new(LabelTable::from_synset_str(SYNSETS).unwrap()),
    );

    let static_dir = config.static_dir.clone();
    let state = AppState::new(config.clone(), orchestrator, logs.clone(), artifacts, None).unwrap();

    TestApp {
        router: build_app_router(state, &config),
        queue,
        logs,
        static_dir,
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One part of a multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(
    app: &Router,
    uri: &str,
    parts: &[Part<'_>],
    cookie: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let request = builder.body(Body::from(multipart_body(parts))).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

/// Collect a response body into a `serde_json::Value`.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` pair from the response's session cookie, ready for a
/// `Cookie` header.
pub fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(SET_COOKIE)
        .expect("session cookie issued")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 30]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Submit a noise task for networks 1 and 3, target label 2.
pub async fn submit_noise(app: &Router, cookie: Option<&str>) -> Response<Body> {
    post_multipart(
        app,
        "/api/v1/tasks",
        &[
            Part::Text("source", "noise"),
            Part::Text("networks", "1,3"),
            Part::Text("label", "2"),
        ],
        cookie,
    )
    .await
}
