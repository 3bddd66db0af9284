//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//!
//! All types are designed for async message passing and follow the panic-free policy.

use chat_core::{DisplayName, SessionId};
use thiserror::Error;
use tokio::sync::oneshot;

use super::sink::{OutboundLine, Sink};
use super::state::BroadcastReport;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response. The actor
/// handles one command at a time, so each command is one critical section.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Atomically check that `name` is free and record it as taken.
    TryClaim {
        /// Session asking for the name
        session_id: SessionId,
        /// Proposed display name
        name: DisplayName,
        /// `true` if the claim succeeded
        respond_to: oneshot::Sender<bool>,
    },

    /// Free a name held by the session. No-op if it does not hold it.
    Release {
        /// Session giving the name up
        session_id: SessionId,
        /// Name to free
        name: DisplayName,
        /// `true` if the name was removed
        respond_to: oneshot::Sender<bool>,
    },

    /// Add a session's sink to the recipient set.
    Join {
        /// Session becoming a recipient
        session_id: SessionId,
        /// Where broadcasts for this session are queued
        sink: Sink,
        /// Line queued on the sink before it becomes visible to broadcasts
        admission: Option<OutboundLine>,
        /// `true` if the session was not already a recipient
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove a session's sink. No-op if absent.
    Leave {
        /// Session leaving the recipient set
        session_id: SessionId,
        /// `true` if the sink was removed
        respond_to: oneshot::Sender<bool>,
    },

    /// Offer a line to every current recipient.
    Broadcast {
        /// Encoded line, shared by all recipients
        line: OutboundLine,
        /// Per-call delivery report
        respond_to: oneshot::Sender<BroadcastReport>,
    },

    /// List all taken names.
    GetNames {
        /// Channel to send the sorted names
        respond_to: oneshot::Sender<Vec<DisplayName>>,
    },

    /// Count live recipients.
    GetRecipientCount {
        /// Channel to send the count
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Name collisions and double releases are not errors; they are reported
/// through the boolean results of the commands above.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The command or response channel was closed.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}
