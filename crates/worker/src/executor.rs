//! Per-task execution: fetch, classify, finalise the trace, deliver.
//!
//! All files for one task live flat in the work directory:
//!
//! ```text
//! {work_dir}/{id}.png        input, fetched from the front door
//! {work_dir}/{id}.txt        trace + trailer (stdout/stderr of the program)
//! {work_dir}/{id}-out.png    outputs written by the program
//! {work_dir}/{id}-sal.png
//! {work_dir}/{id}-dff.png
//! ```
//!
//! Whatever happens, the trace ends with a complete trailer before it is
//! delivered. Images go first and the trace last, so a poller never sees
//! `DONE` before the images are in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use advex_core::artifacts::{self, ArtifactKind, OUTPUT_KINDS};
use advex_core::classifier::{Classifier, Invocation};
use advex_core::progress_log::{Outcome, ProgressRecord, Trailer};
use advex_core::queue::QueueEntry;
use advex_core::task_id::TaskId;
use tokio::io::AsyncWriteExt;

use crate::delivery::FrontDoor;

/// What happened to one task, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub outcome: Outcome,
    /// `true` if the worker had to write the trailer itself.
    pub trailer_synthesized: bool,
    /// Artifacts the front door accepted, in delivery order.
    pub delivered: Vec<ArtifactKind>,
}

pub struct TaskExecutor {
    classifier: Arc<dyn Classifier>,
    front_door: Arc<dyn FrontDoor>,
    work_dir: PathBuf,
}

impl TaskExecutor {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        front_door: Arc<dyn FrontDoor>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            classifier,
            front_door,
            work_dir: work_dir.into(),
        }
    }

    fn path(&self, task_id: &TaskId, kind: ArtifactKind) -> PathBuf {
        self.work_dir.join(artifacts::filename(task_id, kind))
    }

    /// Run one task to a terminal state. Never fails: every error ends up
    /// in the trace as a failure trailer, or in the log as a warning.
    pub async fn execute(&self, entry: &QueueEntry) -> TaskReport {
        let task_id = &entry.task_id;
        let trace_path = self.path(task_id, ArtifactKind::Log);
        tracing::info!(task_id = %task_id, "Task running");

        if let Err(reason) = self.run_program(entry, &trace_path).await {
            tracing::warn!(task_id = %task_id, reason = %reason, "Task failed before producing a result");
            append_line(&trace_path, &reason).await;
        }

        let (trailer, synthesized) = self.finalize_trace(task_id, &trace_path).await;
        let delivered = self.deliver_all(task_id, &trace_path).await;
        self.cleanup(task_id).await;

        tracing::info!(
            task_id = %task_id,
            outcome = ?trailer.outcome,
            synthesized,
            delivered = delivered.len(),
            "Task finished",
        );

        TaskReport {
            task_id: task_id.clone(),
            outcome: trailer.outcome,
            trailer_synthesized: synthesized,
            delivered,
        }
    }

    /// Fetch the input and run the classifier. `Err` carries a one-line
    /// reason for the trace.
    async fn run_program(&self, entry: &QueueEntry, trace_path: &Path) -> Result<(), String> {
        let task_id = &entry.task_id;
        let image_path = self.path(task_id, ArtifactKind::Input);

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| format!("work directory unavailable: {e}"))?;

        let input = self
            .front_door
            .fetch_input(task_id)
            .await
            .map_err(|e| format!("input fetch failed: {e}"))?;
        tokio::fs::write(&image_path, input)
            .await
            .map_err(|e| format!("input write failed: {e}"))?;

        let invocation = Invocation {
            task_id: task_id.clone(),
            parameters: entry.parameters,
            image_path,
            output_dir: self.work_dir.clone(),
            trace_path: trace_path.to_path_buf(),
        };

        let exit = self
            .classifier
            .classify(&invocation)
            .await
            .map_err(|e| format!("classifier error: {e}"))?;

        tracing::debug!(
            task_id = %task_id,
            exit_code = exit.exit_code,
            duration_ms = exit.duration_ms,
            "Classifier exited",
        );
        Ok(())
    }

    /// Make sure the trace ends in a complete trailer. A trailer written
    /// by the program is left untouched.
    async fn finalize_trace(&self, task_id: &TaskId, trace_path: &Path) -> (Trailer, bool) {
        let text = tokio::fs::read_to_string(trace_path)
            .await
            .unwrap_or_default();

        if let Some(trailer) = ProgressRecord::from_text(&text).trailer() {
            return (trailer, false);
        }

        let failure = Trailer::failure();
        let mut suffix = String::new();
        if !text.is_empty() && !text.ends_with('\n') {
            suffix.push('\n');
        }
        suffix.push_str(&failure.render());

        if let Err(e) = append(trace_path, &suffix).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to write failure trailer");
        }
        (failure, true)
    }

    async fn deliver_all(&self, task_id: &TaskId, trace_path: &Path) -> Vec<ArtifactKind> {
        let mut delivered = Vec::new();

        for kind in OUTPUT_KINDS {
            let Ok(bytes) = tokio::fs::read(self.path(task_id, kind)).await else {
                continue;
            };
            if self.deliver_one(task_id, kind, bytes).await {
                delivered.push(kind);
            }
        }

        match tokio::fs::read(trace_path).await {
            Ok(bytes) => {
                if self.deliver_one(task_id, ArtifactKind::Log, bytes).await {
                    delivered.push(ArtifactKind::Log);
                }
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Trace unreadable, log not delivered");
            }
        }

        delivered
    }

    async fn deliver_one(&self, task_id: &TaskId, kind: ArtifactKind, bytes: Vec<u8>) -> bool {
        match self.front_door.deliver(kind, task_id, bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    task_id = %task_id,
                    artifact = %artifacts::filename(task_id, kind),
                    error = %e,
                    "Delivery failed, not retrying",
                );
                false
            }
        }
    }

    async fn cleanup(&self, task_id: &TaskId) {
        for kind in [ArtifactKind::Input, ArtifactKind::Log]
            .into_iter()
            .chain(OUTPUT_KINDS)
        {
            let path = self.path(task_id, kind);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Could not remove task file");
                }
            }
        }
    }
}

async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

async fn append_line(path: &Path, line: &str) {
    if let Err(e) = append(path, &format!("{line}\n")).await {
        tracing::error!(path = %path.display(), error = %e, "Failed to append to trace");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use advex_core::classifier::{ClassifierProgram, ExternalClassifier};
    use advex_core::params::{NetworkSelection, TaskParameters};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::delivery::DeliveryError;

    /// Records deliveries in order; optionally refuses the input fetch.
    #[derive(Default)]
    pub(crate) struct FakeFrontDoor {
        pub fetch_fails: bool,
        pub reject: Vec<ArtifactKind>,
        pub received: Mutex<Vec<(ArtifactKind, Vec<u8>)>>,
    }

    impl FakeFrontDoor {
        pub async fn kinds(&self) -> Vec<ArtifactKind> {
            self.received.lock().await.iter().map(|(k, _)| *k).collect()
        }

        pub async fn log_text(&self) -> Option<String> {
            self.received
                .lock()
                .await
                .iter()
                .find(|(k, _)| *k == ArtifactKind::Log)
                .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
        }
    }

    #[async_trait]
    impl FrontDoor for FakeFrontDoor {
        async fn fetch_input(&self, _task_id: &TaskId) -> Result<Vec<u8>, DeliveryError> {
            if self.fetch_fails {
                return Err(DeliveryError::HttpStatus(404));
            }
            Ok(b"png bytes".to_vec())
        }

        async fn deliver(
            &self,
            kind: ArtifactKind,
            _task_id: &TaskId,
            bytes: Vec<u8>,
        ) -> Result<(), DeliveryError> {
            if self.reject.contains(&kind) {
                return Err(DeliveryError::HttpStatus(503));
            }
            self.received.lock().await.push((kind, bytes));
            Ok(())
        }
    }

    pub(crate) fn write_temp_script(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/bash").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f
    }

    pub(crate) fn bash_classifier(script: &Path, grace: Duration) -> Arc<dyn Classifier> {
        Arc::new(ExternalClassifier::new(ClassifierProgram {
            program: "bash".into(),
            leading_args: vec![script.to_string_lossy().into_owned()],
            time_budget: Duration::ZERO,
            grace,
        }))
    }

    pub(crate) fn entry() -> QueueEntry {
        QueueEntry {
            task_id: TaskId::generate(),
            parameters: TaskParameters {
                networks: NetworkSelection::from_ids(&[2]).unwrap(),
                target_label: 5,
            },
        }
    }

    const SUCCESS_SCRIPT: &str = r#"
echo "iteration 1"
printf 'out' > "$ADVEX_OUTPUT_DIR/$ADVEX_TASK_ID-out.png"
printf 'sal' > "$ADVEX_OUTPUT_DIR/$ADVEX_TASK_ID-sal.png"
printf 'dff' > "$ADVEX_OUTPUT_DIR/$ADVEX_TASK_ID-dff.png"
printf '5\n5\n1\nDONE\n'
"#;

    #[tokio::test]
    async fn complete_trailer_forwarded_untouched_and_images_first() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script(SUCCESS_SCRIPT);
        let front = Arc::new(FakeFrontDoor::default());
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        );

        let report = executor.execute(&entry()).await;

        assert_eq!(report.outcome, Outcome::Success);
        assert!(!report.trailer_synthesized);
        assert_eq!(
            front.kinds().await,
            vec![
                ArtifactKind::Result,
                ArtifactKind::Saliency,
                ArtifactKind::Difference,
                ArtifactKind::Log,
            ]
        );
        assert_eq!(
            front.log_text().await.unwrap(),
            "iteration 1\n5\n5\n1\nDONE\n"
        );
    }

    #[tokio::test]
    async fn partial_trailer_from_program_is_kept() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("printf '3 7\\n3\\n0\\nDONE\\n'\nexit 1\n");
        let front = Arc::new(FakeFrontDoor::default());
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        );

        let report = executor.execute(&entry()).await;
        assert_eq!(report.outcome, Outcome::Partial);
        assert!(!report.trailer_synthesized);
        assert_eq!(front.kinds().await, vec![ArtifactKind::Log]);
    }

    #[tokio::test]
    async fn missing_trailer_gets_failure_trailer() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("printf 'crashed halfway'\nexit 2\n");
        let front = Arc::new(FakeFrontDoor::default());
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        );

        let report = executor.execute(&entry()).await;
        assert_eq!(report.outcome, Outcome::Failure);
        assert!(report.trailer_synthesized);

        let log = front.log_text().await.unwrap();
        assert_eq!(log, "crashed halfway\n\n\n-1\nDONE\n");
    }

    #[tokio::test]
    async fn program_past_hard_deadline_fails() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("echo started\nsleep 60\n");
        let front = Arc::new(FakeFrontDoor::default());
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_millis(300)),
            front.clone(),
            dir.path(),
        );

        let report = tokio::time::timeout(Duration::from_secs(10), executor.execute(&entry()))
            .await
            .expect("executor must not wait for the program");
        assert_eq!(report.outcome, Outcome::Failure);
        assert!(report.trailer_synthesized);

        let log = front.log_text().await.unwrap();
        assert!(log.contains("classifier error"));
        assert!(log.ends_with("\n\n-1\nDONE\n"));
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_as_failed_task() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script(SUCCESS_SCRIPT);
        let front = Arc::new(FakeFrontDoor {
            fetch_fails: true,
            ..Default::default()
        });
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        );

        let report = executor.execute(&entry()).await;
        assert_eq!(report.outcome, Outcome::Failure);
        assert_eq!(front.kinds().await, vec![ArtifactKind::Log]);
        assert!(front.log_text().await.unwrap().starts_with("input fetch failed"));
    }

    #[tokio::test]
    async fn rejected_image_does_not_stop_log_delivery() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script(SUCCESS_SCRIPT);
        let front = Arc::new(FakeFrontDoor {
            reject: vec![ArtifactKind::Saliency],
            ..Default::default()
        });
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            front.clone(),
            dir.path(),
        );

        let report = executor.execute(&entry()).await;
        assert_eq!(
            report.delivered,
            vec![
                ArtifactKind::Result,
                ArtifactKind::Difference,
                ArtifactKind::Log,
            ]
        );
    }

    #[tokio::test]
    async fn task_files_removed_after_delivery() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script(SUCCESS_SCRIPT);
        let executor = TaskExecutor::new(
            bash_classifier(script.path(), Duration::from_secs(10)),
            Arc::new(FakeFrontDoor::default()),
            dir.path(),
        );

        executor.execute(&entry()).await;
        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }
}
