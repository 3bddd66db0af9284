//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor. Every session holds one.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use chat_core::{DisplayName, SessionId};

use super::commands::{RegistryCommand, RegistryError};
use super::sink::{OutboundLine, Sink};
use super::state::BroadcastReport;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// if handle.try_claim(session_id, name.clone()).await? {
///     handle.join(session_id, sink, Some(accepted_line)).await?;
/// }
///
/// handle.broadcast(line).await?;
///
/// handle.leave(session_id).await?;
/// handle.release(session_id, name).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Sends a command built around a fresh oneshot and awaits the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Claim `name` for `session_id` if nobody holds it.
    ///
    /// Returns `Ok(false)` when the name is taken; that is not an error.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_claim(
        &self,
        session_id: SessionId,
        name: DisplayName,
    ) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::TryClaim {
            session_id,
            name,
            respond_to,
        })
        .await
    }

    /// Release `name` if `session_id` holds it. Idempotent.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn release(
        &self,
        session_id: SessionId,
        name: DisplayName,
    ) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Release {
            session_id,
            name,
            respond_to,
        })
        .await
    }

    /// Add the session's sink to the recipient set.
    ///
    /// `admission` is queued on the sink inside the same critical section,
    /// ahead of any broadcast.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn join(
        &self,
        session_id: SessionId,
        sink: Sink,
        admission: Option<OutboundLine>,
    ) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Join {
            session_id,
            sink,
            admission,
            respond_to,
        })
        .await
    }

    /// Remove the session's sink. Idempotent.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn leave(&self, session_id: SessionId) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Leave {
            session_id,
            respond_to,
        })
        .await
    }

    /// Offer an encoded line to every current recipient.
    ///
    /// Slow or closed recipients are flagged, never reported as an error.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn broadcast(&self, line: OutboundLine) -> Result<BroadcastReport, RegistryError> {
        self.request(|respond_to| RegistryCommand::Broadcast { line, respond_to })
            .await
    }

    /// Get all taken names, sorted.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn names(&self) -> Vec<DisplayName> {
        self.request(|respond_to| RegistryCommand::GetNames { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Get the number of live recipients.
    ///
    /// Returns zero if communication with the actor fails.
    pub async fn recipient_count(&self) -> usize {
        self.request(|respond_to| RegistryCommand::GetRecipientCount { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (RegistryHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_try_claim_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::TryClaim {
                session_id,
                name,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(session_id, SessionId::new(9));
                assert_eq!(name.as_str(), "alice");
                let _ = respond_to.send(true);
                return true;
            }
            false
        });

        let result = handle
            .try_claim(SessionId::new(9), DisplayName::from("alice"))
            .await;
        assert_eq!(result, Ok(true));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_try_claim_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle
            .try_claim(SessionId::new(1), DisplayName::from("alice"))
            .await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_dropped_responder_is_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop the command without answering
            let _ = rx.recv().await;
        });

        let result = handle.leave(SessionId::new(1)).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_join_carries_admission_line() {
        let (handle, mut rx) = create_test_handle();
        let (sink, _sink_rx) = Sink::channel(1);

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Join {
                session_id,
                admission,
                respond_to,
                ..
            }) = rx.recv().await
            {
                assert_eq!(session_id, SessionId::new(3));
                assert_eq!(admission.as_deref(), Some("NAMEACCEPTED\n"));
                let _ = respond_to.send(true);
                return true;
            }
            false
        });

        let result = handle
            .join(SessionId::new(3), sink, Some(Arc::from("NAMEACCEPTED\n")))
            .await;
        assert_eq!(result, Ok(true));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_queries_default_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.names().await.is_empty());
        assert_eq!(handle.recipient_count().await, 0);
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx) = create_test_handle();
        assert!(handle.is_connected());

        drop(rx);
        // Need to send to detect closure
        let _ = handle.leave(SessionId::new(1)).await;

        assert!(!handle.is_connected());
    }
}
