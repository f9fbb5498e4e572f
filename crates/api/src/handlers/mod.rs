//! Request handlers.
//!
//! Handlers delegate to the [`JobOrchestrator`](advex_core::orchestrator::JobOrchestrator)
//! or the stores in [`AppState`](crate::state::AppState) and map errors via
//! [`AppError`](crate::error::AppError).

pub mod intake;
pub mod load;
pub mod results;
pub mod tasks;
