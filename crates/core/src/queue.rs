//! Work queue between the front door and worker slots.
//!
//! Delivery is at-least-once: an entry stays claimed by one [`WorkerSlot`]
//! until acknowledged, and goes back to the pending set if that slot is
//! lost. Each slot holds at most one unacknowledged entry.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::admission::{CollaboratorError, QueueDepth};
use crate::params::TaskParameters;
use crate::task_id::TaskId;

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task_id: TaskId,
    pub parameters: TaskParameters,
}

/// Identity of a single consumer loop inside a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerSlot {
    pub worker: String,
    pub slot: u32,
}

impl WorkerSlot {
    pub fn new(worker: impl Into<String>, slot: u32) -> Self {
        Self {
            worker: worker.into(),
            slot,
        }
    }
}

impl fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.worker, self.slot)
    }
}

/// A claimed entry. `tag` is what [`JobQueue::ack`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: i64,
    pub entry: QueueEntry,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The slot asked for a second entry before acknowledging its first.
    #[error("Worker slot {0} already holds an unacknowledged entry")]
    PrefetchExceeded(WorkerSlot),

    #[error("No in-flight delivery with tag {0}")]
    UnknownDelivery(i64),

    #[error("Queue backend error: {0}")]
    Backend(CollaboratorError),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an entry. FIFO by enqueue order.
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError>;

    /// Wait for an entry and claim it for `slot`.
    async fn dequeue(&self, slot: &WorkerSlot) -> Result<Delivery, QueueError>;

    /// Remove a claimed entry for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return every entry still claimed by `slot` to the pending set.
    ///
    /// Slot names are stable across worker restarts, so a slot calls this
    /// before its first dequeue to give back work its previous incarnation
    /// never acknowledged.
    async fn requeue_abandoned(&self, slot: &WorkerSlot) -> Result<usize, QueueError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<(i64, QueueEntry)>,
    in_flight: HashMap<i64, (WorkerSlot, QueueEntry)>,
    next_tag: i64,
}

/// Process-local queue. Not durable across restarts.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.next_tag += 1;
        let tag = state.next_tag;
        state.pending.push_back((tag, entry));
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, slot: &WorkerSlot) -> Result<Delivery, QueueError> {
        loop {
            // Register interest before checking so an enqueue between the
            // check and the await is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.in_flight.values().any(|(owner, _)| owner == slot) {
                    return Err(QueueError::PrefetchExceeded(slot.clone()));
                }
                if let Some((tag, entry)) = state.pending.pop_front() {
                    state.in_flight.insert(tag, (slot.clone(), entry.clone()));
                    return Ok(Delivery { tag, entry });
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state
            .lock()
            .await
            .in_flight
            .remove(&delivery.tag)
            .map(|_| ())
            .ok_or(QueueError::UnknownDelivery(delivery.tag))
    }

    /// Abandoned entries go back to the head of the queue.
    async fn requeue_abandoned(&self, slot: &WorkerSlot) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;

        let mut abandoned: Vec<i64> = state
            .in_flight
            .iter()
            .filter(|(_, (owner, _))| owner == slot)
            .map(|(tag, _)| *tag)
            .collect();
        abandoned.sort_unstable();

        for tag in abandoned.iter().rev() {
            if let Some((_, entry)) = state.in_flight.remove(tag) {
                state.pending.push_front((*tag, entry));
                self.available.notify_one();
            }
        }

        if !abandoned.is_empty() {
            tracing::info!(slot = %slot, count = abandoned.len(), "Requeued abandoned entries");
        }
        Ok(abandoned.len())
    }
}

#[async_trait]
impl QueueDepth for InMemoryJobQueue {
    async fn queue_depth(&self) -> Result<u64, CollaboratorError> {
        Ok(self.pending_len().await as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
