//! Per-connection session state machine.
//!
//! Each accepted connection gets its own `Session` that:
//! - Prompts for a display name until the registry accepts one
//! - Joins the recipient set and relays every line it reads
//! - Tears down exactly once: leaves the set, releases its name, closes
//!
//! Outgoing lines never go straight to the socket. They are queued on the
//! session's bounded outbound queue (its `Sink`) and written by a dedicated
//! writer task, so a client that stops reading only ever stalls itself.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - I/O faults end the affected session only and are logged, never retried

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chat_core::{DisplayName, DomainError, SessionId, SessionState};
use chat_protocol::{strip_line_terminator, ProtocolError, ServerLine};

use crate::config::ServerConfig;
use crate::registry::{OutboundLine, RegistryError, RegistryHandle, Sink};

/// Per-session limits, taken from the server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Longest accepted client line, terminator included
    pub max_line_length: usize,

    /// Outbound queue capacity in lines
    pub outbound_queue: usize,

    /// Bound on a single socket write
    pub write_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_line_length: config.max_line_length,
            outbound_queue: config.outbound_queue,
            write_timeout: config.write_timeout(),
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The client closed its side of the connection.
    Disconnected,

    /// The outbound side failed: a write errored or timed out, or the
    /// queue overflowed during a broadcast.
    Evicted,

    /// Reading or the registry failed.
    Failed(SessionError),
}

/// Summary returned when a session has fully torn down.
#[derive(Debug)]
pub struct SessionReport {
    /// Connection identifier
    pub session_id: SessionId,

    /// Name the session held, if negotiation completed
    pub name: Option<DisplayName>,

    /// Chat lines this session handed to the registry for broadcast
    pub lines_relayed: u64,

    /// What ended the session
    pub reason: CloseReason,
}

/// Result of waiting for the next client line.
enum Incoming {
    Line(String),
    Eof,
    Evicted,
}

/// Connection state machine for a single client.
///
/// Generic over the two halves of the connection so it can run over a TCP
/// stream in production and an in-memory duplex in tests.
pub struct Session<R, W> {
    /// Connection identifier assigned by the listener
    id: SessionId,

    /// Buffered reader for incoming lines
    reader: BufReader<R>,

    /// Write half, handed to the writer task when the session starts
    writer: Option<W>,

    /// Handle to the shared registry
    registry: RegistryHandle,

    limits: SessionLimits,

    state: SessionState,

    /// Negotiated name (set only after a successful claim)
    name: Option<DisplayName>,

    lines_relayed: u64,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a session for a freshly accepted connection.
    pub fn new(
        id: SessionId,
        reader: R,
        writer: W,
        registry: RegistryHandle,
        limits: SessionLimits,
    ) -> Self {
        Self {
            id,
            reader: BufReader::new(reader),
            writer: Some(writer),
            registry,
            limits,
            state: SessionState::Connecting,
            name: None,
            lines_relayed: 0,
        }
    }

    /// Returns the session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion.
    ///
    /// Returns once teardown has finished: the sink is out of the recipient
    /// set, the name (if any) is released and the connection is closed.
    pub async fn run(mut self) -> SessionReport {
        debug!(session_id = %self.id, "New client connected");

        let (sink, outbound) = Sink::channel(self.limits.outbound_queue);
        let evicted = sink.eviction_token();
        let writer = self.writer.take().map(|w| {
            tokio::spawn(write_outbound(
                self.id,
                w,
                outbound,
                evicted.clone(),
                self.limits.write_timeout,
            ))
        });

        let reason = match self.drive(&sink, &evicted).await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(session_id = %self.id, name = ?self.name, error = %e, "Session failed");
                CloseReason::Failed(e)
            }
        };

        self.teardown(sink, writer).await;

        info!(
            session_id = %self.id,
            name = ?self.name,
            lines = self.lines_relayed,
            "Client disconnected"
        );

        SessionReport {
            session_id: self.id,
            name: self.name,
            lines_relayed: self.lines_relayed,
            reason,
        }
    }

    /// Negotiates a name, then relays lines until the client goes away.
    async fn drive(
        &mut self,
        sink: &Sink,
        evicted: &CancellationToken,
    ) -> Result<CloseReason, SessionError> {
        self.transition(SessionState::NegotiatingName)?;

        let prompt: OutboundLine = Arc::from(ServerLine::SubmitName.encode());
        let name = loop {
            if sink.send(Arc::clone(&prompt)).await.is_err() {
                return Ok(CloseReason::Evicted);
            }

            let proposed = match self.next_line(evicted).await? {
                Incoming::Line(line) => DisplayName::new(line),
                Incoming::Eof => {
                    debug!(session_id = %self.id, "Client closed before naming");
                    return Ok(CloseReason::Disconnected);
                }
                Incoming::Evicted => return Ok(CloseReason::Evicted),
            };

            if self.registry.try_claim(self.id, proposed.clone()).await? {
                break proposed;
            }
            debug!(session_id = %self.id, name = %proposed, "Name taken, prompting again");
        };

        self.name = Some(name.clone());
        self.transition(SessionState::Active)?;

        let accepted: OutboundLine = Arc::from(ServerLine::NameAccepted.encode());
        self.registry
            .join(self.id, sink.clone(), Some(accepted))
            .await?;
        info!(session_id = %self.id, name = %name, "Name accepted");

        loop {
            match self.next_line(evicted).await? {
                Incoming::Line(text) => {
                    let line: OutboundLine = Arc::from(ServerLine::message(&name, text).encode());
                    self.registry.broadcast(line).await?;
                    self.lines_relayed += 1;
                }
                Incoming::Eof => {
                    debug!(session_id = %self.id, "Client sent EOF");
                    return Ok(CloseReason::Disconnected);
                }
                Incoming::Evicted => return Ok(CloseReason::Evicted),
            }
        }
    }

    /// Waits for the next line, or for the outbound side to be flagged.
    async fn next_line(&mut self, evicted: &CancellationToken) -> Result<Incoming, SessionError> {
        let max = self.limits.max_line_length;

        tokio::select! {
            biased;

            _ = evicted.cancelled() => {
                warn!(session_id = %self.id, name = ?self.name, "Outbound stalled, closing session");
                Ok(Incoming::Evicted)
            }

            read = read_line_bounded(&mut self.reader, max) => {
                Ok(match read? {
                    Some(line) => Incoming::Line(line),
                    None => Incoming::Eof,
                })
            }
        }
    }

    /// Leaves the registry, releases the name and closes the connection.
    ///
    /// Consumes the session's own sink; runs at most once.
    async fn teardown(&mut self, sink: Sink, writer: Option<JoinHandle<()>>) {
        if self.state.is_terminal() {
            return;
        }

        // Only Active sessions were ever joined.
        if self.state.is_active() {
            if let Err(e) = self.registry.leave(self.id).await {
                warn!(session_id = %self.id, error = %e, "Failed to leave registry");
            }
        }

        if let Some(name) = self.name.clone() {
            if let Err(e) = self.registry.release(self.id, name).await {
                warn!(session_id = %self.id, error = %e, "Failed to release name");
            }
        }

        if let Err(e) = self.transition(SessionState::Closed) {
            warn!(session_id = %self.id, error = %e, "Unexpected state at teardown");
            self.state = SessionState::Closed;
        }

        // Last sender gone: the writer drains what is queued, then shuts down.
        drop(sink);
        if let Some(mut writer) = writer {
            if timeout(self.limits.write_timeout, &mut writer).await.is_err() {
                debug!(session_id = %self.id, "Writer did not drain in time, aborting");
                writer.abort();
            }
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        let next = self.state.transition(self.id, next)?;
        debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
        Ok(())
    }
}

/// Reads one line of at most `max` bytes, terminator stripped.
///
/// Returns `Ok(None)` on end-of-stream. A final line without a terminator
/// is still returned.
async fn read_line_bounded<R>(
    reader: &mut BufReader<R>,
    max: usize,
) -> Result<Option<String>, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let limit = u64::try_from(max).unwrap_or(u64::MAX);

    let bytes_read = reader
        .take(limit)
        .read_line(&mut line)
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Ok(None);
    }

    if bytes_read >= max && !line.ends_with('\n') {
        // At the cap: too long only if the stream has more to give.
        let more = reader
            .fill_buf()
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        if !more.is_empty() {
            return Err(SessionError::Protocol(ProtocolError::LineTooLong {
                size: bytes_read,
                max,
            }));
        }
    }

    Ok(Some(strip_line_terminator(&line).to_string()))
}

/// Drains the outbound queue onto the socket.
///
/// Each write is bounded by `write_timeout`. On a failed or timed-out write
/// the session is flagged and the queue is dropped, which makes further
/// broadcasts to it fail fast.
async fn write_outbound<W>(
    session_id: SessionId,
    writer: W,
    mut outbound: mpsc::Receiver<OutboundLine>,
    evicted: CancellationToken,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    while let Some(line) = outbound.recv().await {
        let result = timeout(write_timeout, async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(session_id = %session_id, error = %e, "Write to client failed");
                evicted.cancel();
                return;
            }
            Err(_) => {
                warn!(session_id = %session_id, "Write to client timed out");
                evicted.cancel();
                return;
            }
        }
    }

    if let Ok(Err(e)) = timeout(write_timeout, writer.shutdown()).await {
        debug!(session_id = %session_id, error = %e, "Failed to shut down connection");
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("State error: {0}")]
    State(#[from] DomainError),
}
