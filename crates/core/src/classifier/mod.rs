//! Invocation of the external classification program.
//!
//! The program is opaque. It is called as
//!
//! ```text
//! PROGRAM [LEADING_ARGS...] <image_path> <network_mask> <label_index> <time_budget_secs>
//! ```
//!
//! with `ADVEX_TASK_ID` and `ADVEX_OUTPUT_DIR` set. It writes its output
//! images into the output directory and prints trace lines followed by the
//! 4-line trailer to stdout. The program owns the time budget; the runner
//! only enforces a hard deadline of budget plus grace.

pub mod subprocess;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::params::TaskParameters;
use crate::task_id::TaskId;

pub const ENV_TASK_ID: &str = "ADVEX_TASK_ID";
pub const ENV_OUTPUT_DIR: &str = "ADVEX_OUTPUT_DIR";

/// How to launch the program.
#[derive(Debug, Clone)]
pub struct ClassifierProgram {
    pub program: String,
    /// Arguments placed before the per-task arguments.
    pub leading_args: Vec<String>,
    /// Budget passed to the program.
    pub time_budget: Duration,
    /// Extra time allowed past the budget before the program is killed.
    pub grace: Duration,
}

impl ClassifierProgram {
    pub fn hard_deadline(&self) -> Duration {
        self.time_budget + self.grace
    }
}

/// One run of the program for one task.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub task_id: TaskId,
    pub parameters: TaskParameters,
    pub image_path: PathBuf,
    pub output_dir: PathBuf,
    /// File that receives the program's stdout and stderr (appended).
    pub trace_path: PathBuf,
}

/// Program exited on its own, with whatever status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramExit {
    /// Exit code, `-1` if killed by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum ProgramError {
    /// The program could not be started.
    Spawn(std::io::Error),
    /// The program outlived its hard deadline and was killed.
    Timeout { elapsed_ms: u64 },
    /// Trace file or wait failure.
    Io(std::io::Error),
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "Failed to start classifier: {err}"),
            Self::Timeout { elapsed_ms } => {
                write!(f, "Classifier killed after {elapsed_ms}ms")
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for ProgramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) | Self::Io(err) => Some(err),
            Self::Timeout { .. } => None,
        }
    }
}

/// Runs the classification for one task.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, invocation: &Invocation) -> Result<ProgramExit, ProgramError>;
}

/// [`Classifier`] backed by an external executable.
#[derive(Debug, Clone)]
pub struct ExternalClassifier {
    program: ClassifierProgram,
}

impl ExternalClassifier {
    pub fn new(program: ClassifierProgram) -> Self {
        Self { program }
    }

    pub fn program(&self) -> &ClassifierProgram {
        &self.program
    }
}

#[async_trait]
impl Classifier for ExternalClassifier {
    async fn classify(&self, invocation: &Invocation) -> Result<ProgramExit, ProgramError> {
        let mut cmd = tokio::process::Command::new(&self.program.program);
        cmd.args(&self.program.leading_args)
            .arg(&invocation.image_path)
            .arg(invocation.parameters.networks.bits().to_string())
            .arg(invocation.parameters.target_label.to_string())
            .arg(self.program.time_budget.as_secs().to_string())
            .env(ENV_TASK_ID, invocation.task_id.as_str())
            .env(ENV_OUTPUT_DIR, &invocation.output_dir);

        tracing::debug!(
            task_id = %invocation.task_id,
            program = %self.program.program,
            "Starting classifier",
        );

        subprocess::run_logged(
            &mut cmd,
            &invocation.trace_path,
            self.program.hard_deadline(),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;

    use super::*;
    use crate::params::NetworkSelection;

    fn write_temp_script(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/bash").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f
    }

    fn classifier(script: &Path, budget: Duration, grace: Duration) -> ExternalClassifier {
        ExternalClassifier::new(ClassifierProgram {
            program: "bash".into(),
            leading_args: vec![script.to_string_lossy().into_owned()],
            time_budget: budget,
            grace,
        })
    }

    fn invocation(dir: &Path) -> Invocation {
        Invocation {
            task_id: TaskId::generate(),
            parameters: TaskParameters {
                networks: NetworkSelection::from_ids(&[1, 3]).unwrap(),
                target_label: 11,
            },
            image_path: dir.join("input.png"),
            output_dir: dir.to_path_buf(),
            trace_path: dir.join("trace.txt"),
        }
    }

    #[tokio::test]
    async fn passes_arguments_and_env() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("echo \"$1|$2|$3|$4\"\necho \"$ADVEX_TASK_ID $ADVEX_OUTPUT_DIR\"\n");
        let inv = invocation(dir.path());

        let exit = classifier(script.path(), Duration::from_secs(50), Duration::from_secs(5))
            .classify(&inv)
            .await
            .expect("classify");
        assert_eq!(exit.exit_code, 0);

        let trace = std::fs::read_to_string(&inv.trace_path).unwrap();
        let mut lines = trace.lines();
        assert_eq!(
            lines.next().unwrap(),
            format!("{}|5|11|50", inv.image_path.display())
        );
        assert_eq!(
            lines.next().unwrap(),
            format!("{} {}", inv.task_id, dir.path().display())
        );
    }

    #[tokio::test]
    async fn trace_is_appended_not_truncated() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("echo out\necho err >&2\n");
        let inv = invocation(dir.path());
        std::fs::write(&inv.trace_path, "existing\n").unwrap();

        classifier(script.path(), Duration::from_secs(5), Duration::from_secs(5))
            .classify(&inv)
            .await
            .expect("classify");

        let trace = std::fs::read_to_string(&inv.trace_path).unwrap();
        assert!(trace.starts_with("existing\n"));
        assert!(trace.contains("out\n"));
        assert!(trace.contains("err\n"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("exit 3\n");

        let exit = classifier(script.path(), Duration::from_secs(5), Duration::from_secs(5))
            .classify(&invocation(dir.path()))
            .await
            .expect("classify");
        assert_eq!(exit.exit_code, 3);
    }

    #[tokio::test]
    async fn killed_after_hard_deadline() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("sleep 60\n");

        let result = classifier(script.path(), Duration::ZERO, Duration::from_millis(200))
            .classify(&invocation(dir.path()))
            .await;
        assert_matches!(result, Err(ProgramError::Timeout { elapsed_ms }) if elapsed_ms < 10_000);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_spawned_descendants() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script =
            write_temp_script("sh -c 'sleep 2; echo late > \"$ADVEX_OUTPUT_DIR/late.txt\"'\n");

        let result = classifier(script.path(), Duration::ZERO, Duration::from_millis(300))
            .classify(&invocation(dir.path()))
            .await;
        assert_matches!(result, Err(ProgramError::Timeout { .. }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let classifier = ExternalClassifier::new(ClassifierProgram {
            program: "/nonexistent/classifier".into(),
            leading_args: vec![],
            time_budget: Duration::from_secs(1),
            grace: Duration::from_secs(1),
        });

        let result = classifier.classify(&invocation(dir.path())).await;
        assert_matches!(result, Err(ProgramError::Spawn(_)));
    }
}
