//! Domain-level building blocks shared by the HTTP API, the storage adapters
//! and the external collaborator clients.
//!
//! Nothing in this crate performs network or database I/O directly; every
//! side effect goes through the traits in [`storage`] and [`external`] so the
//! payment protocol and the session gate can be exercised against fakes.

pub mod config;
pub mod external;
pub mod model;
pub mod services;
pub mod signature;
pub mod storage;

pub use model::*;
pub use storage::*;

/// Returns the readiness banner served on `/`.
pub fn service_ready_message() -> &'static str {
    "clipgate backend running"
}
