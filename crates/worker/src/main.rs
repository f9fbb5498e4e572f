use std::sync::Arc;
use std::time::Duration;

use advex_core::classifier::ExternalClassifier;
use advex_worker::config::WorkerConfig;
use advex_worker::{heartbeat, ResultCallbackClient, TaskExecutor, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "advex_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        worker = %config.worker_name,
        slots = config.slots,
        front_door = %config.front_door_url,
        program = %config.classifier.program,
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = advex_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    advex_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // --- Collaborators ---
    let queue = Arc::new(advex_db::PgJobQueue::new(
        pool.clone(),
        config.queue_poll_interval,
        config.queue_lease,
    ));
    let front_door = Arc::new(
        ResultCallbackClient::new(
            &config.front_door_url,
            &config.upload_path,
            config.http_timeout,
        )
        .expect("Failed to build HTTP client"),
    );
    let executor = Arc::new(TaskExecutor::new(
        Arc::new(ExternalClassifier::new(config.classifier.clone())),
        front_door,
        config.work_dir.clone(),
    ));

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let heartbeat_handle = tokio::spawn(heartbeat::run(
        pool.clone(),
        config.worker_name.clone(),
        config.slots,
        config.heartbeat_interval,
        cancel.clone(),
    ));

    let worker_pool = WorkerPool::new(config.worker_name.clone(), config.slots, queue, executor);
    let pool_handle = tokio::spawn(worker_pool.run(cancel.clone()));

    shutdown_signal().await;
    tracing::info!("Waiting for in-flight tasks to finish");
    cancel.cancel();

    if let Err(e) = pool_handle.await {
        tracing::error!(error = %e, "Worker pool task failed");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
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
