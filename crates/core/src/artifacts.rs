//! Task artifact naming and storage.
//!
//! Every artifact is keyed by a filename that embeds its task id:
//!
//! | Kind         | Filename             |
//! |--------------|----------------------|
//! | `Input`      | `{id}.png`           |
//! | `Result`     | `{id}-out.png`       |
//! | `Saliency`   | `{id}-sal.png`       |
//! | `Difference` | `{id}-dff.png`       |
//! | `Log`        | `{id}.txt`           |

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::task_id::TaskId;

/// Accepted upload filenames. Only generated (hex) ids are writable.
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-f]{32})(-out|-sal|-dff)?\.(png|txt)$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Input,
    Result,
    Saliency,
    Difference,
    Log,
}

/// Images the classifier program produces, in delivery order.
pub const OUTPUT_KINDS: [ArtifactKind; 3] = [
    ArtifactKind::Result,
    ArtifactKind::Saliency,
    ArtifactKind::Difference,
];

impl ArtifactKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Input | Self::Log => "",
            Self::Result => "-out",
            Self::Saliency => "-sal",
            Self::Difference => "-dff",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Log => "txt",
            _ => "png",
        }
    }

    pub fn is_image(self) -> bool {
        self != Self::Log
    }

    pub fn content_type(self) -> &'static str {
        if self.is_image() {
            "image/png"
        } else {
            "text/plain"
        }
    }
}

pub fn filename(task_id: &TaskId, kind: ArtifactKind) -> String {
    format!("{task_id}{}.{}", kind.suffix(), kind.extension())
}

/// Parse an uploaded filename into its task id and kind.
///
/// Returns `None` for anything not produced by [`filename`] for a
/// generated task id: path separators, unknown suffixes, a suffix on a
/// `.txt` file, or an id that fails validation.
pub fn parse_filename(name: &str) -> Option<(TaskId, ArtifactKind)> {
    let caps = FILENAME_RE.captures(name)?;
    let task_id = TaskId::parse(&caps[1]).ok()?;

    let suffix = caps.get(2).map(|m| m.as_str());
    let kind = match (suffix, &caps[3]) {
        (None, "png") => ArtifactKind::Input,
        (Some("-out"), "png") => ArtifactKind::Result,
        (Some("-sal"), "png") => ArtifactKind::Saliency,
        (Some("-dff"), "png") => ArtifactKind::Difference,
        (None, "txt") => ArtifactKind::Log,
        _ => return None,
    };

    Some((task_id, kind))
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Filename-keyed image store served to clients.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `bytes` under `filename`, replacing any existing artifact.
    async fn put(&self, filename: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Stores artifacts as plain files in one directory.
#[derive(Debug, Clone)]
pub struct DirArtifactStore {
    root: PathBuf,
}

impl DirArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for DirArtifactStore {
    async fn put(&self, filename: &str, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(filename), bytes).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
