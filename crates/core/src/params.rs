//! Task parameters: which networks to attack and which class to target.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::labels::LabelTable;

// ---------------------------------------------------------------------------
// Network catalog
// ---------------------------------------------------------------------------

/// A network the classifier program can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Network {
    /// 1-based catalog id; bit `id - 1` in a [`NetworkSelection`].
    pub id: u8,
    pub name: &'static str,
}

/// Fixed catalog of supported networks, in bit order.
pub const NETWORKS: [Network; 3] = [
    Network {
        id: 1,
        name: "Berkeley CaffeNet",
    },
    Network {
        id: 2,
        name: "Oxford CNN-S",
    },
    Network {
        id: 3,
        name: "Oxford VeryDeep-19",
    },
];

/// Bitmask over [`NETWORKS`]. Never empty once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NetworkSelection(u8);

impl NetworkSelection {
    const ALL_BITS: u8 = (1u8 << NETWORKS.len()) - 1;

    /// Build a selection from a raw bitmask.
    pub fn from_bits(bits: u8) -> Result<Self, CoreError> {
        if bits == 0 {
            return Err(CoreError::Validation(
                "At least one network must be selected".into(),
            ));
        }
        if bits & !Self::ALL_BITS != 0 {
            return Err(CoreError::Validation(format!(
                "Network bitmask {bits:#b} selects networks outside the catalog"
            )));
        }
        Ok(Self(bits))
    }

    /// Build a selection from 1-based catalog ids. Duplicates are harmless.
    pub fn from_ids(ids: &[u8]) -> Result<Self, CoreError> {
        let mut bits = 0u8;
        for &id in ids {
            if id == 0 || id as usize > NETWORKS.len() {
                return Err(CoreError::Validation(format!("Unknown network id {id}")));
            }
            bits |= 1 << (id - 1);
        }
        Self::from_bits(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, id: u8) -> bool {
        id >= 1 && id as usize <= NETWORKS.len() && self.0 & (1 << (id - 1)) != 0
    }

    /// Selected catalog ids in ascending order.
    pub fn ids(self) -> Vec<u8> {
        NETWORKS
            .iter()
            .map(|n| n.id)
            .filter(|&id| self.contains(id))
            .collect()
    }
}

impl TryFrom<u8> for NetworkSelection {
    type Error = CoreError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<NetworkSelection> for u8 {
    fn from(selection: NetworkSelection) -> Self {
        selection.0
    }
}

// ---------------------------------------------------------------------------
// TaskParameters
// ---------------------------------------------------------------------------

/// Immutable parameters of one submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParameters {
    pub networks: NetworkSelection,
    /// 1-based label index of the class the adversarial image should reach.
    pub target_label: u32,
}

impl TaskParameters {
    /// Validate the target label against the label table.
    pub fn new(
        networks: NetworkSelection,
        target_label: u32,
        labels: &LabelTable,
    ) -> Result<Self, CoreError> {
        if labels.label(target_label).is_none() {
            return Err(CoreError::Validation(format!(
                "Label index {target_label} is outside 1..={}",
                labels.len()
            )));
        }
        Ok(Self {
            networks,
            target_label,
        })
    }

    /// Human-readable header written as line 1 of the progress log, e.g.
    /// `Algorithm [1, 3] and Class (0011) goldfinch`.
    pub fn header_line(&self, labels: &LabelTable) -> String {
        let class = labels
            .label(self.target_label)
            .map(|l| l.full_name())
            .unwrap_or_else(|| format!("({:04})", self.target_label));
        format!("Algorithm {} and Class {class}", self.networks)
    }
}

impl fmt::Display for NetworkSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.ids().iter().map(u8::to_string).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelTable {
        let lines: Vec<String> = (1..=12).map(|i| format!("n{i:08} class{i}, alias")).collect();
        LabelTable::from_synset_str(&lines.join("\n")).unwrap()
    }

    #[test]
    fn from_ids_sets_matching_bits() {
        let sel = NetworkSelection::from_ids(&[1, 3]).unwrap();
        assert_eq!(sel.bits(), 0b101);
        assert!(sel.contains(1));
        assert!(!sel.contains(2));
        assert!(sel.contains(3));
        assert_eq!(sel.ids(), vec![1, 3]);
    }

    #[test]
    fn empty_selection_rejected() {
        assert!(NetworkSelection::from_ids(&[]).is_err());
        assert!(NetworkSelection::from_bits(0).is_err());
    }

    #[test]
    fn out_of_catalog_rejected() {
        assert!(NetworkSelection::from_ids(&[4]).is_err());
        assert!(NetworkSelection::from_ids(&[0]).is_err());
        assert!(NetworkSelection::from_bits(0b1000).is_err());
    }

    #[test]
    fn label_must_exist() {
        let sel = NetworkSelection::from_ids(&[1]).unwrap();
        assert!(TaskParameters::new(sel, 0, &labels()).is_err());
        assert!(TaskParameters::new(sel, 13, &labels()).is_err());
        assert!(TaskParameters::new(sel, 12, &labels()).is_ok());
    }

    #[test]
    fn header_line_format() {
        let sel = NetworkSelection::from_ids(&[3, 1]).unwrap();
        let params = TaskParameters::new(sel, 11, &labels()).unwrap();
        assert_eq!(
            params.header_line(&labels()),
            "Algorithm [1, 3] and Class (0011) class11"
        );
    }
}
