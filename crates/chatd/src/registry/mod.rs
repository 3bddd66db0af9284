//! Name and recipient registry using the Actor pattern.
//!
//! The registry is the only shared mutable state in the daemon. It owns the
//! set of taken display names and the set of live broadcast recipients, and
//! is reachable only through the atomic operations on `RegistryHandle`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Session      │────▶│  RegistryActor  │────▶│  Sink per       │
//! └─────────────────┘     └─────────────────┘     │  recipient      │
//!         │                       │               └─────────────────┘
//!         │   RegistryCommand     │   try_send           │
//!         │   (mpsc channel)      │   (never waits)      │
//!         ▼                       ▼                       ▼
//!   claim/join/leave        names + recipients     writer task per
//!   broadcast                                      client socket
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod sink;
mod state;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use sink::{DeliveryFailure, OutboundLine, Sink};
pub use state::{BroadcastReport, Registry};

/// Command channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use chatd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///
///     let names = handle.names().await;
///     assert!(names.is_empty());
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
