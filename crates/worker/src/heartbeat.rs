//! Registry membership for a worker process.
//!
//! Registers on start, bumps `heartbeat_at` every interval and deregisters
//! on shutdown. The front door counts only slots whose heartbeat is recent,
//! so a crashed worker drops out of the admission estimate on its own.

use std::time::Duration;

use advex_db::repositories::WorkerRepo;
use advex_db::DbPool;
use tokio_util::sync::CancellationToken;

pub async fn run(
    pool: DbPool,
    name: String,
    slots: u32,
    interval: Duration,
    cancel: CancellationToken,
) {
    let slots = i32::try_from(slots).unwrap_or(i32::MAX);
    match WorkerRepo::register(&pool, &name, slots).await {
        Ok(_) => tracing::info!(worker = %name, slots, "Worker registered"),
        Err(e) => tracing::error!(worker = %name, error = %e, "Worker registration failed"),
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match WorkerRepo::heartbeat(&pool, &name).await {
                    Ok(true) => tracing::trace!(worker = %name, "Heartbeat"),
                    // Row vanished (manual cleanup); put it back.
                    Ok(false) => {
                        if let Err(e) = WorkerRepo::register(&pool, &name, slots).await {
                            tracing::warn!(worker = %name, error = %e, "Re-registration failed");
                        }
                    }
                    Err(e) => tracing::warn!(worker = %name, error = %e, "Heartbeat failed"),
                }
            }
        }
    }

    match WorkerRepo::deregister(&pool, &name).await {
        Ok(_) => tracing::info!(worker = %name, "Worker deregistered"),
        Err(e) => tracing::warn!(worker = %name, error = %e, "Worker deregistration failed"),
    }
}
