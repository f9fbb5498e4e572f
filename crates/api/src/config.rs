use std::path::PathBuf;

use crate::session::SessionConfig;

/// Default cap on uploaded and fetched image size (2 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields except the upload path and the session secret have defaults
/// suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory served at `/static`; holds input and output images.
    pub static_dir: PathBuf,
    /// Directory of per-task progress logs.
    pub log_dir: PathBuf,
    /// Synset file with the class labels.
    pub labels_path: PathBuf,
    /// Path segment of the result receiver, without slashes.
    pub upload_path: String,
    pub session: SessionConfig,
    pub max_upload_bytes: usize,
    /// Source for the `random` image intake.
    pub random_image_url: String,
    /// `None` runs in local mode: in-memory queue and in-process workers.
    pub database_url: Option<String>,
    /// Slots of the in-process worker pool in local mode.
    pub local_workers: u32,
    /// Heartbeat age after which a worker no longer counts as live.
    pub worker_liveness_secs: u64,
    /// Externally reachable base URL of this server, used by local workers.
    pub public_base_url: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                         |
    /// |------------------------|---------------------------------|
    /// | `HOST`                 | `0.0.0.0`                       |
    /// | `PORT`                 | `8080`                          |
    /// | `CORS_ORIGINS`         | `http://localhost:8080`         |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                            |
    /// | `STATIC_DIR`           | `static`                        |
    /// | `LOG_DIR`              | `backend/log`                   |
    /// | `LABELS_PATH`          | `backend/synset_words.txt`      |
    /// | `UPLOAD_PATH`          | required                        |
    /// | `MAX_UPLOAD_BYTES`     | `2097152`                       |
    /// | `RANDOM_IMAGE_URL`     | `https://picsum.photos/227/227` |
    /// | `DATABASE_URL`         | unset (local mode)              |
    /// | `LOCAL_WORKERS`        | `1`                             |
    /// | `WORKER_LIVENESS_SECS` | `90`                            |
    /// | `PUBLIC_BASE_URL`      | `http://localhost:{PORT}`       |
    ///
    /// Session settings are read by [`SessionConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let upload_path = std::env::var("UPLOAD_PATH")
            .expect("UPLOAD_PATH must be set")
            .trim_matches('/')
            .to_string();
        assert!(!upload_path.is_empty(), "UPLOAD_PATH must not be empty");
        assert!(
            !upload_path.contains('/') && upload_path != "static" && upload_path != "api",
            "UPLOAD_PATH must be a single path segment that does not shadow other routes"
        );

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .map(|v| v.parse().expect("MAX_UPLOAD_BYTES must be a valid usize"))
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let local_workers: u32 = std::env::var("LOCAL_WORKERS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("LOCAL_WORKERS must be a valid u32");

        let worker_liveness_secs: u64 = std::env::var("WORKER_LIVENESS_SECS")
            .unwrap_or_else(|_| "90".into())
            .parse()
            .expect("WORKER_LIVENESS_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            static_dir: env_path("STATIC_DIR", "static"),
            log_dir: env_path("LOG_DIR", "backend/log"),
            labels_path: env_path("LABELS_PATH", "backend/synset_words.txt"),
            upload_path,
            session: SessionConfig::from_env(),
            max_upload_bytes,
            random_image_url: std::env::var("RANDOM_IMAGE_URL")
                .unwrap_or_else(|_| "https://picsum.photos/227/227".into()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            local_workers,
            worker_liveness_secs,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
        }
    }
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(name).unwrap_or_else(|_| default.into()))
}
