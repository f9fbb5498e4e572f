//! Row model for the `workers` table.

use sqlx::FromRow;

use crate::Timestamp;

#[derive(Debug, Clone, FromRow)]
pub struct Worker {
    pub name: String,
    pub slots: i32,
    pub registered_at: Timestamp,
    pub heartbeat_at: Timestamp,
}
