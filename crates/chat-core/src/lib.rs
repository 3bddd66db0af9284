//! Chat Core - Shared domain types for the chat server
//!
//! This crate provides the identifiers and the session lifecycle model
//! shared between the line protocol and the daemon.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use session::{DisplayName, SessionId, SessionState};
