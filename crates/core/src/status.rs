//! Client-facing task status derived from the progress log.

use std::sync::Arc;

use serde::Serialize;

use crate::progress_log::{Outcome, ProgressLogStore, ProgressRecord};
use crate::task_id::TaskId;

/// Lifecycle state visible to a polling client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    InProgress,
    Succeeded { original: Vec<u32>, new: Vec<u32> },
    Partial { original: Vec<u32>, new: Vec<u32> },
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Derive the state from a parsed record. Pure; no I/O.
    pub fn from_record(record: &ProgressRecord) -> Self {
        let Some(trailer) = record.trailer() else {
            return Self::InProgress;
        };

        match trailer.outcome {
            Outcome::Success => Self::Succeeded {
                original: trailer.original,
                new: trailer.new,
            },
            Outcome::Partial => Self::Partial {
                original: trailer.original,
                new: trailer.new,
            },
            Outcome::Failure => Self::Failed,
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    /// First log line, if a record exists.
    pub header: Option<String>,
    #[serde(flatten)]
    pub state: TaskState,
}

/// Reads progress logs and turns them into [`TaskStatus`] values.
#[derive(Clone)]
pub struct StatusPoller {
    logs: Arc<dyn ProgressLogStore>,
}

impl StatusPoller {
    pub fn new(logs: Arc<dyn ProgressLogStore>) -> Self {
        Self { logs }
    }

    /// Never fails: a missing record or a read error both yield
    /// [`TaskState::InProgress`].
    pub async fn poll(&self, task_id: &TaskId) -> TaskStatus {
        let record = match self.logs.record(task_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Failed to read progress log");
                None
            }
        };

        match record {
            Some(record) => TaskStatus {
                task_id: task_id.clone(),
                state: TaskState::from_record(&record),
                header: record.header,
            },
            None => TaskStatus {
                task_id: task_id.clone(),
                header: None,
                state: TaskState::InProgress,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::progress_log::InMemoryProgressLogStore;

    async fn poller_with(text: Option<&str>) -> (StatusPoller, TaskId) {
        let store = Arc::new(InMemoryProgressLogStore::new());
        let id = TaskId::generate();
        if let Some(text) = text {
            store.append(&id, text).await.unwrap();
        }
        (StatusPoller::new(store), id)
    }

    #[tokio::test]
    async fn missing_record_is_in_progress_without_header() {
        let (poller, id) = poller_with(None).await;
        let status = poller.poll(&id).await;
        assert_eq!(status.state, TaskState::InProgress);
        assert!(status.header.is_none());
    }

    #[tokio::test]
    async fn header_only_is_in_progress() {
        let (poller, id) = poller_with(Some("Algorithm [2] and Class (0003) x\n")).await;
        let status = poller.poll(&id).await;
        assert_eq!(status.state, TaskState::InProgress);
        assert_eq!(
            status.header.as_deref(),
            Some("Algorithm [2] and Class (0003) x")
        );
    }

    #[tokio::test]
    async fn success_trailer() {
        let (poller, id) = poller_with(Some("h\ntrace\n3 7\n3\n1\nDONE\n")).await;
        let status = poller.poll(&id).await;
        assert_eq!(
            status.state,
            TaskState::Succeeded {
                original: vec![3, 7],
                new: vec![3],
            }
        );
    }

    #[tokio::test]
    async fn partial_trailer_keeps_lists() {
        let (poller, id) = poller_with(Some("h\n3 7\n3\n0\nDONE\n")).await;
        assert_matches!(
            poller.poll(&id).await.state,
            TaskState::Partial { original, new } if original == vec![3, 7] && new == vec![3]
        );
    }

    #[tokio::test]
    async fn failure_trailer_drops_lists() {
        let (poller, id) = poller_with(Some("h\n3 7\n3\n-1\nDONE\n")).await;
        assert_eq!(poller.poll(&id).await.state, TaskState::Failed);
    }

    #[tokio::test]
    async fn incomplete_trailer_is_in_progress() {
        let (poller, id) = poller_with(Some("h\n3 7\n3\n1\n")).await;
        let status = poller.poll(&id).await;
        assert!(!status.state.is_terminal());
    }

    #[tokio::test]
    async fn repeated_polls_are_identical() {
        let (poller, id) = poller_with(Some("h\n5\n5\n1\nDONE\n")).await;
        let first = poller.poll(&id).await;
        for _ in 0..5 {
            assert_eq!(poller.poll(&id).await, first);
        }
    }

    #[test]
    fn status_serializes_flat() {
        let status = TaskStatus {
            task_id: TaskId::parse("example1").unwrap(),
            header: Some("h".into()),
            state: TaskState::Partial {
                original: vec![1],
                new: vec![2],
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["task_id"], "example1");
        assert_eq!(json["state"], "partial");
        assert_eq!(json["new"][0], 2);
    }
}
