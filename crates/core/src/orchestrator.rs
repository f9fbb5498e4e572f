//! Submission and polling entry points.
//!
//! [`JobOrchestrator::submit`] is the only place that creates tasks. The
//! ordering matters:
//!
//! 1. validate parameters
//! 2. normalise the input image
//! 3. admission check
//! 4. issue a task id and write the log header (create-new)
//! 5. store `{id}.png`
//! 6. enqueue
//! 7. bind the session
//!
//! A failure at any step leaves the session untouched, so a session is
//! never bound to a task with no queue entry.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::artifacts::{self, ArtifactKind, ArtifactStore};
use crate::error::CoreError;
use crate::imaging::{self, ImagingError, SourceImage};
use crate::labels::LabelTable;
use crate::params::{NetworkSelection, TaskParameters};
use crate::progress_log::ProgressLogStore;
use crate::queue::{JobQueue, QueueEntry};
use crate::session::{SessionId, SessionStore};
use crate::status::{StatusPoller, TaskStatus};
use crate::task_id::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// Admission rejected the submission. Retryable.
    #[error("Server is busy, please try again later")]
    Capacity,

    #[error("Could not load image: {0}")]
    ImageLoad(String),

    #[error("Could not process image: {0}")]
    ImageProcess(String),

    /// Header write, input persist or enqueue failed.
    #[error("Could not schedule task: {0}")]
    Scheduling(String),

    #[error("Invalid submission: {0}")]
    Validation(String),
}

impl From<ImagingError> for SubmissionError {
    fn from(err: ImagingError) -> Self {
        match err {
            ImagingError::Decode(_) => Self::ImageLoad(err.to_string()),
            ImagingError::Encode(_) => Self::ImageProcess(err.to_string()),
        }
    }
}

/// Raw submission as received from a client.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// 1-based catalog ids.
    pub network_ids: Vec<u8>,
    /// 1-based label index of the target class.
    pub target_label: u32,
    pub image: SourceImage,
}

#[derive(Clone)]
pub struct JobOrchestrator {
    admission: AdmissionController,
    queue: Arc<dyn JobQueue>,
    logs: Arc<dyn ProgressLogStore>,
    artifacts: Arc<dyn ArtifactStore>,
    sessions: Arc<dyn SessionStore>,
    labels: Arc<LabelTable>,
    poller: StatusPoller,
}

impl JobOrchestrator {
    pub fn new(
        admission: AdmissionController,
        queue: Arc<dyn JobQueue>,
        logs: Arc<dyn ProgressLogStore>,
        artifacts: Arc<dyn ArtifactStore>,
        sessions: Arc<dyn SessionStore>,
        labels: Arc<LabelTable>,
    ) -> Self {
        let poller = StatusPoller::new(Arc::clone(&logs));
        Self {
            admission,
            queue,
            logs,
            artifacts,
            sessions,
            labels,
            poller,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub async fn submit(
        &self,
        session: &SessionId,
        request: SubmitRequest,
    ) -> Result<TaskId, SubmissionError> {
        let networks = NetworkSelection::from_ids(&request.network_ids)
            .map_err(|e| SubmissionError::Validation(e.to_string()))?;
        let parameters = TaskParameters::new(networks, request.target_label, &self.labels)
            .map_err(|e| SubmissionError::Validation(e.to_string()))?;

        let image = request.image;
        let input_png = tokio::task::spawn_blocking(move || imaging::normalize(&image))
            .await
            .map_err(|e| SubmissionError::ImageProcess(e.to_string()))??;

        if !self.admission.admit().await {
            tracing::info!(session = %session, "Submission rejected: server busy");
            return Err(SubmissionError::Capacity);
        }

        let task_id = TaskId::generate();
        let header = parameters.header_line(&self.labels);

        self.logs
            .create(&task_id, &header)
            .await
            .map_err(|e| scheduling(&task_id, "write log header", e))?;

        self.artifacts
            .put(&artifacts::filename(&task_id, ArtifactKind::Input), &input_png)
            .await
            .map_err(|e| scheduling(&task_id, "store input image", e))?;

        self.queue
            .enqueue(QueueEntry {
                task_id: task_id.clone(),
                parameters,
            })
            .await
            .map_err(|e| scheduling(&task_id, "enqueue", e))?;

        if let Some(previous) = self.sessions.bind(session, task_id.clone()).await {
            tracing::debug!(session = %session, previous = %previous, "Session detached from previous task");
        }

        tracing::info!(task_id = %task_id, header = %header, "Task submitted");
        Ok(task_id)
    }

    /// Pure read; safe to call any number of times.
    pub async fn poll(&self, task_id: &TaskId) -> TaskStatus {
        self.poller.poll(task_id).await
    }

    pub async fn current_task(&self, session: &SessionId) -> Option<TaskId> {
        self.sessions.current(session).await
    }

    /// Bind the session to an externally supplied id after validating it.
    pub async fn adopt(&self, session: &SessionId, candidate: &str) -> Result<TaskId, CoreError> {
        let task_id = TaskId::parse(candidate)?;
        self.sessions.bind(session, task_id.clone()).await;
        Ok(task_id)
    }

    /// Forget the session's task. The task itself keeps running.
    pub async fn detach(&self, session: &SessionId) -> Option<TaskId> {
        self.sessions.clear(session).await
    }

    pub async fn current_load(&self) -> f64 {
        self.admission.current_load().await
    }
}

fn scheduling(task_id: &TaskId, step: &str, err: impl std::fmt::Display) -> SubmissionError {
    tracing::error!(task_id = %task_id, step, error = %err, "Failed to schedule task");
    SubmissionError::Scheduling(format!("{step}: {err}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
