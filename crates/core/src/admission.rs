//! Backlog-based admission control.
//!
//! Load is the percentage of worker capacity already spoken for by waiting
//! entries: `100 * queue_depth / worker_count`. A submission is admitted
//! while load stays under 100.
//!
//! The check is not atomic with the enqueue that follows it. Two concurrent
//! submissions can both be admitted at 99% load; the queue simply grows by
//! two. Callers must not try to turn this into a reservation.

use std::sync::Arc;

use async_trait::async_trait;

/// Error type returned by admission collaborators.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Load reported when the estimate cannot be computed.
pub const FULL_LOAD: f64 = 100.0;

/// Number of entries waiting to be claimed by a worker.
#[async_trait]
pub trait QueueDepth: Send + Sync {
    async fn queue_depth(&self) -> Result<u64, CollaboratorError>;
}

/// Number of worker slots currently able to take work.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn worker_count(&self) -> Result<u64, CollaboratorError>;
}

/// Fixed worker count, for local mode and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticWorkerRegistry(pub u64);

#[async_trait]
impl WorkerRegistry for StaticWorkerRegistry {
    async fn worker_count(&self) -> Result<u64, CollaboratorError> {
        Ok(self.0)
    }
}

#[derive(Clone)]
pub struct AdmissionController {
    queue_depth: Arc<dyn QueueDepth>,
    workers: Arc<dyn WorkerRegistry>,
}

impl AdmissionController {
    pub fn new(queue_depth: Arc<dyn QueueDepth>, workers: Arc<dyn WorkerRegistry>) -> Self {
        Self {
            queue_depth,
            workers,
        }
    }

    /// Current load in percent. Fails closed to [`FULL_LOAD`].
    pub async fn current_load(&self) -> f64 {
        let depth = match self.queue_depth.queue_depth().await {
            Ok(depth) => depth,
            Err(e) => {
                tracing::warn!(error = %e, "Queue depth unavailable, reporting full load");
                return FULL_LOAD;
            }
        };

        let workers = match self.workers.worker_count().await {
            Ok(0) => {
                tracing::warn!("No live workers, reporting full load");
                return FULL_LOAD;
            }
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Worker count unavailable, reporting full load");
                return FULL_LOAD;
            }
        };

        100.0 * depth as f64 / workers as f64
    }

    pub async fn admit(&self) -> bool {
        let load = self.current_load().await;
        let admitted = load < FULL_LOAD;
        tracing::debug!(load, admitted, "Admission check");
        admitted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
