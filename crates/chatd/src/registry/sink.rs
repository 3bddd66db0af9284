//! Recipient sinks - the registry's non-owning handle on a session's output.
//!
//! A sink is the sending half of a session's bounded outbound queue plus an
//! eviction flag. The registry only ever offers lines to it without waiting;
//! the owning session's writer task drains the queue onto the socket.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A line ready for the wire, shared across every recipient of a broadcast.
pub type OutboundLine = Arc<str>;

/// Why a sink refused a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is full; the client is not keeping up.
    QueueFull,

    /// The writer side is gone; the session is already shutting down.
    Closed,
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::Closed => write!(f, "outbound queue closed"),
        }
    }
}

/// Destination a session's outgoing lines are written to.
#[derive(Debug, Clone)]
pub struct Sink {
    sender: mpsc::Sender<OutboundLine>,
    evicted: CancellationToken,
}

impl Sink {
    /// Wraps an existing queue sender and eviction token.
    pub fn new(sender: mpsc::Sender<OutboundLine>, evicted: CancellationToken) -> Self {
        Self { sender, evicted }
    }

    /// Creates a sink with a fresh bounded queue.
    ///
    /// A capacity of zero is raised to one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundLine>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, CancellationToken::new()), rx)
    }

    /// Queues a line without waiting.
    pub fn offer(&self, line: &OutboundLine) -> Result<(), DeliveryFailure> {
        self.sender
            .try_send(Arc::clone(line))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryFailure::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
            })
    }

    /// Queues a line, waiting for space. Used by the owning session only.
    pub async fn send(&self, line: OutboundLine) -> Result<(), DeliveryFailure> {
        self.sender
            .send(line)
            .await
            .map_err(|_| DeliveryFailure::Closed)
    }

    /// Marks the sink for teardown by its own session.
    pub fn flag(&self) {
        self.evicted.cancel();
    }

    /// Returns true once the sink has been flagged.
    pub fn is_flagged(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Returns the token the owning session watches for eviction.
    pub fn eviction_token(&self) -> CancellationToken {
        self.evicted.clone()
    }
}
