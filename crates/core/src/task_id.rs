//! Opaque task identifiers.
//!
//! A [`TaskId`] names one classification job, its progress log
//! (`{id}.txt`) and its image artifacts (`{id}.png`, `{id}-out.png`, ...).
//! Because the id ends up in file paths, anything supplied from outside
//! (query strings, upload filenames) must pass [`TaskId::validate`] first.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant};

use crate::error::CoreError;

/// Ids starting with this literal are demo tasks: they skip the UUID
/// round-trip check and are never produced by [`TaskId::generate`].
pub const EXAMPLE_PREFIX: &str = "example";

/// Upper bound on the length of an example id.
const MAX_EXAMPLE_LEN: usize = 64;

/// A validated task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Produce a fresh identifier: a random v4 UUID rendered as 32 lowercase
    /// hex characters without hyphens.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Return `true` if `candidate` is safe to use as a task id.
    ///
    /// Accepts either the canonical hex form of a version-4 UUID (the
    /// candidate must equal its own re-rendered form exactly, so uppercase,
    /// hyphenated or braced spellings are rejected) or an id carrying the
    /// [`EXAMPLE_PREFIX`] whose remaining characters are path-safe.
    pub fn validate(candidate: &str) -> bool {
        if candidate.starts_with(EXAMPLE_PREFIX) {
            return is_path_safe(candidate);
        }

        let Ok(parsed) = Uuid::parse_str(candidate) else {
            return false;
        };

        parsed.get_version_num() == 4
            && parsed.get_variant() == Variant::RFC4122
            && parsed.simple().to_string() == candidate
    }

    /// Validated constructor for externally supplied ids.
    pub fn parse(candidate: &str) -> Result<Self, CoreError> {
        if Self::validate(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(CoreError::Validation(format!(
                "'{candidate}' is not a valid task id"
            )))
        }
    }

    /// Whether this id names a read-only demo task.
    pub fn is_example(&self) -> bool {
        self.0.starts_with(EXAMPLE_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_path_safe(candidate: &str) -> bool {
    candidate.len() <= MAX_EXAMPLE_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
