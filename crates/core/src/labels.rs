//! Class label vocabulary.
//!
//! Loaded from a synset file with one class per line:
//!
//! ```text
//! n01440764 tench, Tinca tinca
//! n01443537 goldfish, Carassius auratus
//! ```
//!
//! Indices are 1-based, matching the label indices written into progress
//! log trailers by the classifier program.

use std::path::Path;

use serde::Serialize;

use crate::error::CoreError;

/// A single class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    /// 1-based class index.
    pub index: u32,
    /// WordNet id (first token of the synset line).
    pub wnid: String,
    /// Name up to the first comma, e.g. `"goldfinch"`.
    pub short_name: String,
}

impl Label {
    /// Display form used in log headers: `(0011) goldfinch`.
    pub fn full_name(&self) -> String {
        format!("({:04}) {}", self.index, self.short_name)
    }
}

/// In-memory lookup table from 1-based index to [`Label`].
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
}

impl LabelTable {
    /// Parse synset file contents. Blank lines are skipped.
    pub fn from_synset_str(contents: &str) -> Result<Self, CoreError> {
        let mut labels = Vec::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (wnid, rest) = line.split_once(' ').ok_or_else(|| {
                CoreError::Validation(format!(
                    "Synset line {} has no class name: '{line}'",
                    line_no + 1
                ))
            })?;

            let short_name = rest.split(',').next().unwrap_or(rest).trim().to_string();
            labels.push(Label {
                index: labels.len() as u32 + 1,
                wnid: wnid.to_string(),
                short_name,
            });
        }

        if labels.is_empty() {
            return Err(CoreError::Validation("Label table is empty".into()));
        }

        Ok(Self { labels })
    }

    /// Read and parse a synset file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Internal(format!(
                "Failed to read label table {}: {e}",
                path.display()
            ))
        })?;
        Self::from_synset_str(&contents)
    }

    /// Look up a label by 1-based index.
    pub fn label(&self, index: u32) -> Option<&Label> {
        index
            .checked_sub(1)
            .and_then(|i| self.labels.get(i as usize))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "n01440764 tench, Tinca tinca\n\
                          n01443537 goldfish, Carassius auratus\n\
                          \n\
                          n01530575 brambling, Fringilla montifringilla\n";

    #[test]
    fn parses_short_names_and_indices() {
        let table = LabelTable::from_synset_str(SAMPLE).unwrap();
        assert_eq!(table.len(), 3);

        let goldfish = table.label(2).unwrap();
        assert_eq!(goldfish.wnid, "n01443537");
        assert_eq!(goldfish.short_name, "goldfish");
        assert_eq!(goldfish.full_name(), "(0002) goldfish");
    }

    #[test]
    fn index_zero_and_past_end_are_absent() {
        let table = LabelTable::from_synset_str(SAMPLE).unwrap();
        assert!(table.label(0).is_none());
        assert!(table.label(4).is_none());
    }

    #[test]
    fn line_without_name_is_rejected() {
        let err = LabelTable::from_synset_str("n01440764\n").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(LabelTable::from_synset_str("\n\n").is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("synset_words.txt");
        std::fs::write(&path, SAMPLE).expect("write synset file");

        let table = LabelTable::load(&path).unwrap();
        assert_eq!(table.label(3).unwrap().short_name, "brambling");
    }
}
