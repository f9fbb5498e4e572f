//! In-process workers for local mode.
//!
//! Without `DATABASE_URL` the front door owns an [`InMemoryJobQueue`] and
//! runs a [`WorkerPool`] against it. The workers still talk to the front
//! door over HTTP, through `PUBLIC_BASE_URL`, exactly as remote workers do.

use std::sync::Arc;

use advex_core::classifier::ExternalClassifier;
use advex_core::queue::InMemoryJobQueue;
use advex_worker::config::WorkerConfig;
use advex_worker::delivery::DeliveryError;
use advex_worker::{ResultCallbackClient, TaskExecutor, WorkerPool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Worker settings for local mode: the worker environment, pointed back at
/// this server and sized by `LOCAL_WORKERS`.
pub fn worker_config(server: &ServerConfig) -> WorkerConfig {
    let mut config = WorkerConfig::from_env();
    config.front_door_url = server.public_base_url.trim_end_matches('/').to_string();
    config.upload_path = server.upload_path.clone();
    config.slots = server.local_workers;
    config
}

/// Start the pool; it stops once `cancel` fires and in-flight tasks finish.
pub fn spawn_workers(
    config: WorkerConfig,
    queue: Arc<InMemoryJobQueue>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, DeliveryError> {
    let front_door = Arc::new(ResultCallbackClient::new(
        &config.front_door_url,
        &config.upload_path,
        config.http_timeout,
    )?);
    let executor = Arc::new(TaskExecutor::new(
        Arc::new(ExternalClassifier::new(config.classifier.clone())),
        front_door,
        config.work_dir.clone(),
    ));

    tracing::info!(
        slots = config.slots,
        front_door = %config.front_door_url,
        program = %config.classifier.program,
        "Starting local workers",
    );

    let pool = WorkerPool::new(config.worker_name, config.slots, queue, executor);
    Ok(tokio::spawn(pool.run(cancel)))
}
