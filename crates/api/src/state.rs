use std::sync::Arc;
use std::time::Duration;

use advex_core::artifacts::ArtifactStore;
use advex_core::orchestrator::JobOrchestrator;
use advex_core::progress_log::ProgressLogStore;

use crate::config::ServerConfig;

/// Timeout for fetching a submitted image URL.
const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub orchestrator: JobOrchestrator,
    /// Written by the result receiver.
    pub logs: Arc<dyn ProgressLogStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Client for `url` and `random` image intake.
    pub http: reqwest::Client,
    /// Present when running against PostgreSQL.
    pub pool: Option<advex_db::DbPool>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        orchestrator: JobOrchestrator,
        logs: Arc<dyn ProgressLogStore>,
        artifacts: Arc<dyn ArtifactStore>,
        pool: Option<advex_db::DbPool>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(IMAGE_FETCH_TIMEOUT)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            logs,
            artifacts,
            http,
            pool,
        })
    }
}
