//! Durable [`JobQueue`] backed by the `queue_entries` table.
//!
//! Dequeue is a polling loop: release expired leases, try to claim, sleep.
//! A claim whose slot never acknowledges it (crashed worker) returns to the
//! pending state once the lease runs out, so delivery is at-least-once.

use std::time::Duration;

use advex_core::admission::{CollaboratorError, QueueDepth};
use advex_core::queue::{Delivery, JobQueue, QueueEntry, QueueError, WorkerSlot};
use async_trait::async_trait;

use crate::models::queue_entry::QueueEntryRow;
use crate::repositories::QueueRepo;
use crate::DbPool;

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: DbPool,
    poll_interval: Duration,
    lease: Duration,
}

impl PgJobQueue {
    /// `lease` must comfortably exceed the classifier's hard deadline plus
    /// delivery time, or live tasks will be redelivered.
    pub fn new(pool: DbPool, poll_interval: Duration, lease: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            lease,
        }
    }
}

fn backend(err: impl Into<CollaboratorError>) -> QueueError {
    QueueError::Backend(err.into())
}

fn to_delivery(row: QueueEntryRow) -> Result<Delivery, QueueError> {
    let entry = row.to_entry().map_err(backend)?;
    Ok(Delivery { tag: row.id, entry })
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let row = QueueRepo::insert(
            &self.pool,
            entry.task_id.as_str(),
            i16::from(entry.parameters.networks.bits()),
            i32::try_from(entry.parameters.target_label).map_err(backend)?,
        )
        .await
        .map_err(backend)?;

        tracing::debug!(task_id = %entry.task_id, queue_id = row.id, "Entry enqueued");
        Ok(())
    }

    async fn dequeue(&self, slot: &WorkerSlot) -> Result<Delivery, QueueError> {
        let claimant = slot.to_string();

        if QueueRepo::find_claimed_by(&self.pool, &claimant)
            .await
            .map_err(backend)?
            .is_some()
        {
            return Err(QueueError::PrefetchExceeded(slot.clone()));
        }

        loop {
            let released = QueueRepo::release_expired(&self.pool, self.lease.as_secs_f64())
                .await
                .map_err(backend)?;
            if released > 0 {
                tracing::warn!(released, "Released expired queue claims");
            }

            if let Some(row) = QueueRepo::claim_next(&self.pool, &claimant)
                .await
                .map_err(backend)?
            {
                return to_delivery(row);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        if QueueRepo::delete(&self.pool, delivery.tag)
            .await
            .map_err(backend)?
        {
            Ok(())
        } else {
            Err(QueueError::UnknownDelivery(delivery.tag))
        }
    }

    async fn requeue_abandoned(&self, slot: &WorkerSlot) -> Result<usize, QueueError> {
        let released = QueueRepo::release_claimed_by(&self.pool, &slot.to_string())
            .await
            .map_err(backend)?;
        if released > 0 {
            tracing::warn!(slot = %slot, released, "Released claims abandoned by a previous run");
        }
        usize::try_from(released).map_err(backend)
    }
}

#[async_trait]
impl QueueDepth for PgJobQueue {
    async fn queue_depth(&self) -> Result<u64, CollaboratorError> {
        let count = QueueRepo::count_pending(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}
