//! Row model for the `queue_entries` table.

use advex_core::params::{NetworkSelection, TaskParameters};
use advex_core::queue::QueueEntry;
use advex_core::task_id::TaskId;
use sqlx::FromRow;

use crate::{DbId, Timestamp};

/// A row from the `queue_entries` table.
#[derive(Debug, Clone, FromRow)]
pub struct QueueEntryRow {
    pub id: DbId,
    pub task_id: String,
    pub networks: i16,
    pub target_label: i32,
    pub enqueued_at: Timestamp,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
}

impl QueueEntryRow {
    /// Rebuild the domain entry, re-validating what came out of the table.
    pub fn to_entry(&self) -> Result<QueueEntry, String> {
        let task_id = TaskId::parse(&self.task_id).map_err(|e| e.to_string())?;
        let bits = u8::try_from(self.networks)
            .map_err(|_| format!("Network bitmask {} out of range", self.networks))?;
        let networks = NetworkSelection::from_bits(bits).map_err(|e| e.to_string())?;
        let target_label = u32::try_from(self.target_label)
            .map_err(|_| format!("Label index {} out of range", self.target_label))?;

        Ok(QueueEntry {
            task_id,
            parameters: TaskParameters {
                networks,
                target_label,
            },
        })
    }
}
