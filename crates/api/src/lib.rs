//! Front door of the adversarial-classification service.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! session middleware) so integration tests and the binary entrypoint can
//! both access them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod local;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod session;
pub mod state;
