use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use advex_core::admission::{AdmissionController, QueueDepth, StaticWorkerRegistry, WorkerRegistry};
use advex_core::artifacts::DirArtifactStore;
use advex_core::labels::LabelTable;
use advex_core::orchestrator::JobOrchestrator;
use advex_core::progress_log::FileProgressLogStore;
use advex_core::queue::{InMemoryJobQueue, JobQueue};
use advex_core::session::InMemorySessionStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advex_api::config::ServerConfig;
use advex_api::local;
use advex_api::router::build_app_router;
use advex_api::state::AppState;

/// The front door only enqueues and counts; these never drive a claim loop.
const FRONT_DOOR_POLL_INTERVAL: Duration = Duration::from_secs(1);
const FRONT_DOOR_LEASE: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "advex_api=debug,advex_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let labels = LabelTable::load(&config.labels_path).expect("Failed to load label table");
    tracing::info!(labels = labels.len(), "Label table loaded");

    // --- Storage ---
    tokio::fs::create_dir_all(&config.static_dir)
        .await
        .expect("Failed to create static directory");
    tokio::fs::create_dir_all(&config.log_dir)
        .await
        .expect("Failed to create log directory");

    let logs = Arc::new(FileProgressLogStore::new(config.log_dir.clone()));
    let artifacts = Arc::new(DirArtifactStore::new(config.static_dir.clone()));

    // --- Queue and worker registry ---
    let cancel = CancellationToken::new();
    let mut local_pool = None;

    let (queue, depth, registry, pool): (
        Arc<dyn JobQueue>,
        Arc<dyn QueueDepth>,
        Arc<dyn WorkerRegistry>,
        _,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = advex_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            advex_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            advex_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database ready, using shared queue");

            let queue = Arc::new(advex_db::PgJobQueue::new(
                pool.clone(),
                FRONT_DOOR_POLL_INTERVAL,
                FRONT_DOOR_LEASE,
            ));
            let registry: Arc<dyn WorkerRegistry> = Arc::new(advex_db::PgWorkerRegistry::new(
                pool.clone(),
                Duration::from_secs(config.worker_liveness_secs),
            ));
            (
                queue.clone() as Arc<dyn JobQueue>,
                queue as Arc<dyn QueueDepth>,
                registry,
                Some(pool),
            )
        }
        None => {
            let queue = Arc::new(InMemoryJobQueue::new());
            if config.local_workers == 0 {
                tracing::warn!("LOCAL_WORKERS is 0; every submission will be refused");
            } else {
                let handle = local::spawn_workers(
                    local::worker_config(&config),
                    Arc::clone(&queue),
                    cancel.clone(),
                )
                .expect("Failed to start local workers");
                local_pool = Some(handle);
            }

            let registry: Arc<dyn WorkerRegistry> =
                Arc::new(StaticWorkerRegistry(u64::from(config.local_workers)));
            (
                queue.clone() as Arc<dyn JobQueue>,
                queue as Arc<dyn QueueDepth>,
                registry,
                None,
            )
        }
    };

    // --- App state ---
    let orchestrator = JobOrchestrator::new(
        AdmissionController::new(depth, registry),
        queue,
        logs.clone(),
        artifacts.clone(),
        Arc::new(InMemorySessionStore::new(config.session.ttl())),
        Arc::new(labels),
    );
    let state = AppState::new(config.clone(), orchestrator, logs, artifacts, pool)
        .expect("Failed to build HTTP client");

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    if let Some(handle) = local_pool {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Local worker pool failed");
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
