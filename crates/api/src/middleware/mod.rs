//! Request middleware and extractors.
//!
//! - [`session::ensure_session`] -- Attaches a session to every request,
//!   issuing a cookie when the client has none.
//! - [`session::Session`] -- Extracts the attached session in handlers.

pub mod session;
