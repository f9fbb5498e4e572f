//! [`WorkerRegistry`] backed by worker heartbeats in the `workers` table.

use std::time::Duration;

use advex_core::admission::{CollaboratorError, WorkerRegistry};
use async_trait::async_trait;

use crate::repositories::WorkerRepo;
use crate::DbPool;

/// Counts slots of workers that heartbeated within `liveness`.
#[derive(Debug, Clone)]
pub struct PgWorkerRegistry {
    pool: DbPool,
    liveness: Duration,
}

impl PgWorkerRegistry {
    pub fn new(pool: DbPool, liveness: Duration) -> Self {
        Self { pool, liveness }
    }
}

#[async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn worker_count(&self) -> Result<u64, CollaboratorError> {
        let slots = WorkerRepo::live_slot_count(&self.pool, self.liveness.as_secs_f64()).await?;
        Ok(slots.max(0) as u64)
    }
}
