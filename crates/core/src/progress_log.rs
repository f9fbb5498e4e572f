//! Append-only per-task progress log.
//!
//! The log is the only channel between the front door, the worker and the
//! poller. Line 1 is the header written at submission; the worker path
//! appends free-form trace lines and finally a 4-line [`Trailer`]:
//!
//! ```text
//! Algorithm [1] and Class (0011) goldfinch     <- header
//! iter 1 ...                                   <- trace (0..n lines)
//! 3 7                                          <- original classes
//! 11                                           <- new classes
//! 1                                            <- outcome code
//! DONE                                         <- terminator
//! ```
//!
//! Parsing is split from storage: [`ProgressRecord::from_text`] and
//! [`Trailer::from_tail`] work on plain lines, and [`ProgressLogStore`]
//! hides whether the bytes live in a file or in memory.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::task_id::TaskId;

/// Literal last line of a completed record.
pub const TERMINATOR: &str = "DONE";

/// Number of lines in a trailer, terminator included.
pub const TRAILER_LINES: usize = 4;

// ---------------------------------------------------------------------------
// Outcome / Trailer
// ---------------------------------------------------------------------------

/// Outcome code carried by `trailer[2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// `1` -- the program reached the target class.
    Success,
    /// `0` -- the time limit was hit; best-effort result.
    Partial,
    /// `-1` or anything unrecognised.
    Failure,
}

impl Outcome {
    /// Exact match; surrounding whitespace makes the code unrecognised.
    pub fn from_code(code: &str) -> Self {
        match code {
            "1" => Self::Success,
            "0" => Self::Partial,
            _ => Self::Failure,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Success => "1",
            Self::Partial => "0",
            Self::Failure => "-1",
        }
    }
}

/// A complete, terminated trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    /// 1-based label indices of the source image's classification.
    pub original: Vec<u32>,
    /// 1-based label indices of the adversarial image's classification.
    pub new: Vec<u32>,
    pub outcome: Outcome,
}

impl Trailer {
    /// Parse the tail of a log.
    ///
    /// Returns `None` unless there are at least [`TRAILER_LINES`] lines and
    /// the last one is [`TERMINATOR`]. Only the last four lines are looked
    /// at, so earlier trace content never matters.
    pub fn from_tail<S: AsRef<str>>(lines: &[S]) -> Option<Self> {
        if lines.len() < TRAILER_LINES {
            return None;
        }
        let tail = &lines[lines.len() - TRAILER_LINES..];
        if tail[3].as_ref() != TERMINATOR {
            return None;
        }

        Some(Self {
            original: parse_indices(tail[0].as_ref()),
            new: parse_indices(tail[1].as_ref()),
            outcome: Outcome::from_code(tail[2].as_ref()),
        })
    }

    /// Trailer the worker appends when the program could not produce one.
    pub fn failure() -> Self {
        Self {
            original: Vec::new(),
            new: Vec::new(),
            outcome: Outcome::Failure,
        }
    }

    /// Render as the four newline-terminated lines appended to a log.
    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{TERMINATOR}\n",
            join_indices(&self.original),
            join_indices(&self.new),
            self.outcome.code()
        )
    }
}

fn parse_indices(line: &str) -> Vec<u32> {
    line.split_whitespace()
        .filter_map(|token| match token.parse() {
            Ok(index) => Some(index),
            Err(_) => {
                tracing::warn!(token, "Skipping non-numeric label index in trailer");
                None
            }
        })
        .collect()
}

fn join_indices(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// ProgressRecord
// ---------------------------------------------------------------------------

/// The parts of a log a poller cares about: first line and last lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub header: Option<String>,
    /// Up to [`TRAILER_LINES`] final lines, oldest first.
    pub tail: Vec<String>,
}

impl ProgressRecord {
    /// Split raw log text into header and tail.
    ///
    /// One trailing newline is treated as the end of the last line rather
    /// than an extra empty line; `\r\n` endings are accepted.
    pub fn from_text(text: &str) -> Self {
        let body = text.strip_suffix('\n').unwrap_or(text);
        if body.is_empty() && text.is_empty() {
            return Self {
                header: None,
                tail: Vec::new(),
            };
        }

        let lines: Vec<&str> = body
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();

        let header = lines.first().map(|l| l.to_string());
        let start = lines.len().saturating_sub(TRAILER_LINES);
        let tail = lines[start..].iter().map(|l| l.to_string()).collect();

        Self { header, tail }
    }

    pub fn trailer(&self) -> Option<Trailer> {
        Trailer::from_tail(&self.tail)
    }

    pub fn is_complete(&self) -> bool {
        self.trailer().is_some()
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Errors from a [`ProgressLogStore`].
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// `create` was called for a task that already has a log.
    #[error("Progress log for task {0} already exists")]
    AlreadyExists(TaskId),

    #[error("Progress log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backend holding one append-only text record per task.
#[async_trait]
pub trait ProgressLogStore: Send + Sync {
    /// Create the record with its header line. Fails if it already exists;
    /// an existing log is never truncated.
    async fn create(&self, task_id: &TaskId, header: &str) -> Result<(), LogError>;

    /// Append raw text, creating the record if it is missing.
    async fn append(&self, task_id: &TaskId, text: &str) -> Result<(), LogError>;

    /// Full record text, or `None` if no record exists.
    async fn read(&self, task_id: &TaskId) -> Result<Option<String>, LogError>;

    /// Convenience: read and split into a [`ProgressRecord`].
    async fn record(&self, task_id: &TaskId) -> Result<Option<ProgressRecord>, LogError> {
        Ok(self
            .read(task_id)
            .await?
            .map(|text| ProgressRecord::from_text(&text)))
    }
}

/// File-per-task store: `{dir}/{task_id}.txt`.
#[derive(Debug, Clone)]
pub struct FileProgressLogStore {
    dir: PathBuf,
}

impl FileProgressLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `task_id`.
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.dir.join(format!("{task_id}.txt"))
    }
}

#[async_trait]
impl ProgressLogStore for FileProgressLogStore {
    async fn create(&self, task_id: &TaskId, header: &str) -> Result<(), LogError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(task_id))
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LogError::AlreadyExists(task_id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(format!("{header}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn append(&self, task_id: &TaskId, text: &str) -> Result<(), LogError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.path_for(task_id))
            .await?;

        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read(&self, task_id: &TaskId) -> Result<Option<String>, LogError> {
        match tokio::fs::read(self.path_for(task_id)).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store, for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryProgressLogStore {
    records: RwLock<HashMap<TaskId, String>>,
}

impl InMemoryProgressLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ProgressLogStore for InMemoryProgressLogStore {
    async fn create(&self, task_id: &TaskId, header: &str) -> Result<(), LogError> {
        let mut records = self.records.write().await;
        if records.contains_key(task_id) {
            return Err(LogError::AlreadyExists(task_id.clone()));
        }
        records.insert(task_id.clone(), format!("{header}\n"));
        Ok(())
    }

    async fn append(&self, task_id: &TaskId, text: &str) -> Result<(), LogError> {
        self.records
            .write()
            .await
            .entry(task_id.clone())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn read(&self, task_id: &TaskId) -> Result<Option<String>, LogError> {
        Ok(self.records.read().await.get(task_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
