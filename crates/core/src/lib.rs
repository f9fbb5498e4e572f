//! Domain logic for the asynchronous classification job service.
//!
//! Everything in this crate is storage- and transport-agnostic: the file
//! system, the queue backend and the collaborator lookups are reached
//! through the traits defined here so the lifecycle can be exercised
//! without a database, an HTTP server or a worker process.

pub mod admission;
pub mod artifacts;
pub mod classifier;
pub mod error;
pub mod imaging;
pub mod labels;
pub mod orchestrator;
pub mod params;
pub mod progress_log;
pub mod queue;
pub mod session;
pub mod status;
pub mod task_id;
