//! Registry state - taken names and live recipients.
//!
//! Plain data with a mutation contract and no I/O. The actor owns the only
//! instance and applies one operation at a time, which is what makes every
//! method here atomic with respect to the others.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chat_core::{DisplayName, SessionId};

use super::sink::{OutboundLine, Sink};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients that accepted the line.
    pub delivered: usize,

    /// Recipients whose sink refused the line and were flagged by this call.
    pub flagged: Vec<SessionId>,

    /// Recipients skipped because an earlier call already flagged them.
    pub skipped: usize,
}

/// Shared authority for name uniqueness and the live-recipient set.
///
/// # Ownership
///
/// - `names`: display name → the session holding it. Keeping the holder
///   means a release from a session that no longer owns the name is a no-op.
/// - `recipients`: session → sink, present only while that session is Active.
#[derive(Debug, Default)]
pub struct Registry {
    names: HashMap<DisplayName, SessionId>,
    recipients: HashMap<SessionId, Sink>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` as held by `session_id` if nobody holds it yet.
    ///
    /// Returns false when the name is taken, including by the same session.
    pub fn try_claim(&mut self, session_id: SessionId, name: DisplayName) -> bool {
        match self.names.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(session_id);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Frees `name` if `session_id` holds it. Returns true if it was removed.
    pub fn release(&mut self, session_id: SessionId, name: &DisplayName) -> bool {
        match self.names.get(name) {
            Some(holder) if *holder == session_id => {
                self.names.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Adds `sink` to the recipient set.
    ///
    /// If `admission` is given it is offered to the sink first, so it reaches
    /// the client ahead of any broadcast the sink receives as a recipient.
    /// Returns false if the session was already a recipient (its sink is
    /// replaced).
    pub fn join(
        &mut self,
        session_id: SessionId,
        sink: Sink,
        admission: Option<&OutboundLine>,
    ) -> bool {
        if let Some(line) = admission {
            if sink.offer(line).is_err() {
                sink.flag();
            }
        }
        self.recipients.insert(session_id, sink).is_none()
    }

    /// Removes the session's sink. Returns true if it was present.
    pub fn leave(&mut self, session_id: SessionId) -> bool {
        self.recipients.remove(&session_id).is_some()
    }

    /// Offers `line` to every current recipient.
    ///
    /// Never fails as a whole. A sink that refuses the line is flagged and
    /// stays in the set until its own session leaves.
    pub fn broadcast(&self, line: &OutboundLine) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (session_id, sink) in &self.recipients {
            if sink.is_flagged() {
                report.skipped += 1;
                continue;
            }

            match sink.offer(line) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    sink.flag();
                    report.flagged.push(*session_id);
                }
            }
        }

        report
    }

    /// Returns the session holding `name`, if any (for testing).
    #[cfg(test)]
    pub fn holder(&self, name: &DisplayName) -> Option<SessionId> {
        self.names.get(name).copied()
    }

    /// Returns true if the session is in the recipient set (for testing).
    #[cfg(test)]
    pub fn is_recipient(&self, session_id: SessionId) -> bool {
        self.recipients.contains_key(&session_id)
    }

    /// Returns all taken names, sorted.
    pub fn names(&self) -> Vec<DisplayName> {
        let mut names: Vec<DisplayName> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of taken names.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Number of live recipients.
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }
}
