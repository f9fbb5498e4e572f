//! Fixed-size pool of queue consumers.
//!
//! Each slot is a tokio task running `dequeue -> execute -> ack` with at
//! most one unacknowledged entry. Cancellation is only observed while a
//! slot is waiting for work; a running task is always finished and
//! acknowledged first.
//!
//! Slot names survive restarts, so a slot first hands back anything its
//! name still holds in the queue before asking for new work.

use std::sync::Arc;
use std::time::Duration;

use advex_core::queue::{JobQueue, QueueError, WorkerSlot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::executor::TaskExecutor;

/// Pause after a queue error before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct WorkerPool {
    name: String,
    slots: u32,
    queue: Arc<dyn JobQueue>,
    executor: Arc<TaskExecutor>,
}

impl WorkerPool {
    pub fn new(
        name: impl Into<String>,
        slots: u32,
        queue: Arc<dyn JobQueue>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            slots,
            queue,
            executor,
        }
    }

    /// Run every slot until `cancel` fires and all in-flight tasks finish.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(worker = %self.name, slots = self.slots, "Worker pool started");

        let mut set = JoinSet::new();
        for slot in 0..self.slots {
            let slot = WorkerSlot::new(self.name.clone(), slot);
            set.spawn(run_slot(
                slot,
                Arc::clone(&self.queue),
                Arc::clone(&self.executor),
                cancel.clone(),
            ));
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(worker = %self.name, error = %e, "Worker slot panicked");
            }
        }

        tracing::info!(worker = %self.name, "Worker pool stopped");
    }
}

async fn run_slot(
    slot: WorkerSlot,
    queue: Arc<dyn JobQueue>,
    executor: Arc<TaskExecutor>,
    cancel: CancellationToken,
) {
    recover(&slot, queue.as_ref()).await;
    tracing::debug!(slot = %slot, "Slot waiting for work");

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            result = queue.dequeue(&slot) => result,
        };

        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(QueueError::PrefetchExceeded(_)) => {
                tracing::warn!(slot = %slot, "Slot still holds an entry it never acknowledged");
                if recover(&slot, queue.as_ref()).await > 0 {
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                }
            }
            Err(e) => {
                tracing::error!(slot = %slot, error = %e, "Dequeue failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                }
            }
        };

        tracing::info!(slot = %slot, task_id = %delivery.entry.task_id, "Task claimed");
        executor.execute(&delivery.entry).await;

        if let Err(e) = queue.ack(&delivery).await {
            tracing::error!(
                slot = %slot,
                task_id = %delivery.entry.task_id,
                error = %e,
                "Ack failed, entry may be redelivered",
            );
        }
    }

    tracing::debug!(slot = %slot, "Slot stopped");
}

/// Return entries held under this slot's name to the queue.
async fn recover(slot: &WorkerSlot, queue: &dyn JobQueue) -> usize {
    match queue.requeue_abandoned(slot).await {
        Ok(released) => released,
        Err(e) => {
            tracing::error!(slot = %slot, error = %e, "Failed to requeue abandoned entries");
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use advex_core::artifacts::ArtifactKind;
    use advex_core::queue::InMemoryJobQueue;

    use super::*;
    use crate::executor::tests::{bash_classifier, entry, write_temp_script, FakeFrontDoor};

    #[tokio::test]
    async fn drains_queue_and_stops_on_cancel() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("printf '1\\n2\\n1\\nDONE\\n'\n");
        let front = Arc::new(FakeFrontDoor::default());
        let queue = Arc::new(InMemoryJobQueue::new());

        for _ in 0..3 {
            queue.enqueue(entry()).await.unwrap();
        }

        let executor = Arc::new(TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        ));
        let pool = WorkerPool::new("test", 2, queue.clone(), executor);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let logs = front
                    .kinds()
                    .await
                    .into_iter()
                    .filter(|k| *k == ArtifactKind::Log)
                    .count();
                if logs == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("all tasks delivered");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pool stops")
            .unwrap();

        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.in_flight_len().await, 0);
    }

    #[tokio::test]
    async fn restarted_slot_reclaims_its_stale_entry() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("printf '1\\n2\\n1\\nDONE\\n'\n");
        let front = Arc::new(FakeFrontDoor::default());
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.enqueue(entry()).await.unwrap();

        // A previous run of "restarted" claimed the entry and died.
        let stale = queue.dequeue(&WorkerSlot::new("restarted", 0)).await.unwrap();
        assert_eq!(queue.in_flight_len().await, 1);

        let executor = Arc::new(TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        ));
        let pool = WorkerPool::new("restarted", 1, queue.clone(), executor);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(10), async {
            while !front.kinds().await.contains(&ArtifactKind::Log) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("stale entry delivered");

        assert!(!handle.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pool stops")
            .unwrap();

        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.in_flight_len().await, 0);
        assert!(queue.ack(&stale).await.is_err());
    }

    #[tokio::test]
    async fn idle_pool_stops_promptly() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("true\n");
        let executor = Arc::new(TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(1)),
            Arc::new(FakeFrontDoor::default()),
            dir.path(),
        ));
        let pool = WorkerPool::new("idle", 3, Arc::new(InMemoryJobQueue::new()), executor);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool.run(cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("idle pool stops")
            .unwrap();
    }
}
