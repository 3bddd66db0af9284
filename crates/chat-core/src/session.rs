//! Session identity and lifecycle.

use std::fmt;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for one client connection.
///
/// Assigned by the listener from a monotonically increasing counter, so two
/// live sessions never share an id even if they pick the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a SessionId from a connection number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw connection number.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Display name a client negotiated for itself.
///
/// Names are taken verbatim from the client's line (minus the line
/// terminator). Uniqueness is enforced by the registry, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayName(String);

impl DisplayName {
    /// Creates a DisplayName from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DisplayName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DisplayName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Where a session is in its lifecycle.
///
/// ```text
/// Connecting ──▶ NegotiatingName ──▶ Active ──▶ Closed
///      │               │  ▲                       ▲
///      │               └──┘ (name taken)          │
///      └───────────────┴──────────────────────────┘
/// ```
///
/// States only move forward. Re-prompting for a name keeps the session in
/// `NegotiatingName` and is not a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Connection accepted, nothing sent yet.
    #[default]
    Connecting,

    /// Waiting for the client to propose a name nobody else holds.
    NegotiatingName,

    /// Name accepted; the session receives and relays broadcasts.
    Active,

    /// Torn down. Terminal.
    Closed,
}

impl SessionState {
    /// Returns the lowercase label used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::NegotiatingName => "negotiating_name",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if a session in this state is a broadcast recipient.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if `next` is reachable in one step from this state.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::NegotiatingName)
                | (Self::Connecting, Self::Closed)
                | (Self::NegotiatingName, Self::Active)
                | (Self::NegotiatingName, Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }

    /// Returns the next state, or an error if the move is not allowed.
    pub fn transition(self, session_id: SessionId, next: SessionState) -> DomainResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                session_id,
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
