//! Registry actor - owns the registry state and processes commands.
//!
//! The RegistryActor is the single owner of the taken names and the
//! recipient set. It receives commands via an mpsc channel and handles them
//! one at a time, so every command is its own critical section and no lock
//! is ever held across socket I/O.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::RegistryCommand;
use super::state::Registry;

/// The registry actor - owns all shared chat state.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// Two broadcasts, or a broadcast and a join/leave, are therefore fully
/// serialized: a recipient that joins gets a given line in full or not at all.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Names and recipients
    state: Registry,
}

impl RegistryActor {
    /// Creates a new registry actor with empty state.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            state: Registry::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            names = self.state.name_count(),
            recipients = self.state.recipient_count(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the registry state.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::TryClaim {
                session_id,
                name,
                respond_to,
            } => {
                let claimed = self.state.try_claim(session_id, name.clone());
                debug!(session_id = %session_id, name = %name, claimed, "Name claim");
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(claimed);
            }
            RegistryCommand::Release {
                session_id,
                name,
                respond_to,
            } => {
                let released = self.state.release(session_id, &name);
                debug!(session_id = %session_id, name = %name, released, "Name release");
                let _ = respond_to.send(released);
            }
            RegistryCommand::Join {
                session_id,
                sink,
                admission,
                respond_to,
            } => {
                let added = self.state.join(session_id, sink, admission.as_ref());
                debug!(
                    session_id = %session_id,
                    recipients = self.state.recipient_count(),
                    "Recipient joined"
                );
                let _ = respond_to.send(added);
            }
            RegistryCommand::Leave {
                session_id,
                respond_to,
            } => {
                let removed = self.state.leave(session_id);
                if removed {
                    debug!(
                        session_id = %session_id,
                        recipients = self.state.recipient_count(),
                        "Recipient left"
                    );
                }
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Broadcast { line, respond_to } => {
                let report = self.state.broadcast(&line);
                for session_id in &report.flagged {
                    warn!(
                        session_id = %session_id,
                        "Recipient not keeping up, flagged for teardown"
                    );
                }
                let _ = respond_to.send(report);
            }
            RegistryCommand::GetNames { respond_to } => {
                let _ = respond_to.send(self.state.names());
            }
            RegistryCommand::GetRecipientCount { respond_to } => {
                let _ = respond_to.send(self.state.recipient_count());
            }
        }
    }

    /// Returns the number of taken names (for testing).
    #[cfg(test)]
    pub fn name_count(&self) -> usize {
        self.state.name_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chat_core::{DisplayName, SessionId};
    use tokio::sync::oneshot;

    use super::*;
    use crate::registry::sink::Sink;

    fn create_actor() -> (mpsc::Sender<RegistryCommand>, RegistryActor) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (cmd_tx, RegistryActor::new(cmd_rx))
    }

    fn claim(actor: &mut RegistryActor, id: u64, name: &str) -> bool {
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::TryClaim {
            session_id: SessionId::new(id),
            name: DisplayName::from(name),
            respond_to: tx,
        });
        rx.try_recv().unwrap()
    }

    #[test]
    fn test_claim_and_release_through_commands() {
        let (_tx, mut actor) = create_actor();

        assert!(claim(&mut actor, 1, "alice"));
        assert!(!claim(&mut actor, 2, "alice"));
        assert_eq!(actor.name_count(), 1);

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Release {
            session_id: SessionId::new(1),
            name: DisplayName::from("alice"),
            respond_to: tx,
        });
        assert!(rx.try_recv().unwrap());
        assert_eq!(actor.name_count(), 0);
    }

    #[test]
    fn test_dropped_responder_does_not_panic() {
        let (_tx, mut actor) = create_actor();
        let (tx, rx) = oneshot::channel();
        drop(rx);

        actor.handle_command(RegistryCommand::TryClaim {
            session_id: SessionId::new(1),
            name: DisplayName::from("alice"),
            respond_to: tx,
        });

        assert_eq!(actor.name_count(), 1);
    }

    #[test]
    fn test_broadcast_report_counts_recipients() {
        let (_tx, mut actor) = create_actor();
        let (sink, mut sink_rx) = Sink::channel(4);

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Join {
            session_id: SessionId::new(1),
            sink,
            admission: Some(Arc::from("NAMEACCEPTED\n")),
            respond_to: tx,
        });
        assert!(rx.try_recv().unwrap());

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Broadcast {
            line: Arc::from("MESSAGE alice: hi\n"),
            respond_to: tx,
        });
        assert_eq!(rx.try_recv().unwrap().delivered, 1);

        assert_eq!(&*sink_rx.try_recv().unwrap(), "NAMEACCEPTED\n");
        assert_eq!(&*sink_rx.try_recv().unwrap(), "MESSAGE alice: hi\n");
    }

    #[tokio::test]
    async fn test_run_stops_when_senders_dropped() {
        let (tx, actor) = create_actor();
        let task = tokio::spawn(actor.run());

        let (resp_tx, resp_rx) = oneshot::channel();
        tx.send(RegistryCommand::GetRecipientCount { respond_to: resp_tx })
            .await
            .unwrap();
        assert_eq!(resp_rx.await.unwrap(), 0);

        drop(tx);
        task.await.unwrap();
    }
}
