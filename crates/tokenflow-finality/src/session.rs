//! In-process session messaging between parties.
//!
//! Each party registers an inbox on the [`MessageBus`]. Opening a session
//! creates both ends at once: the initiator keeps one [`Session`], the
//! other is delivered to the counterparty's inbox, where a responder picks
//! it up and waits for the first message.
//!
//! Parties share nothing but this bus. Every wait is bounded by an
//! explicit timeout.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokenflow_types::{
    LedgerError, NotarisedTransaction, PartyId, Result, SessionId, SignedTransaction,
    TransactionSignature,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages exchanged during finalization.
#[derive(Debug, Clone)]
pub enum FlowMessage {
    /// Initiator → responder: the candidate, signed by the initiator.
    Propose(Box<SignedTransaction>),
    /// Responder → initiator: the responder's signatures (possibly none).
    Endorse(Vec<TransactionSignature>),
    /// Responder → initiator: validation failed.
    Reject { reason: String },
    /// Initiator → responder: the notarised transaction.
    Finality(Box<NotarisedTransaction>),
    /// Initiator → responder: the attempt failed before notarisation.
    Abort { reason: String },
}

impl FlowMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Propose(_) => "PROPOSE",
            Self::Endorse(_) => "ENDORSE",
            Self::Reject { .. } => "REJECT",
            Self::Finality(_) => "FINALITY",
            Self::Abort { .. } => "ABORT",
        }
    }
}

type Route = (PartyId, SessionId);

#[derive(Default)]
struct Routes {
    inboxes: HashMap<PartyId, mpsc::UnboundedSender<Session>>,
    sessions: HashMap<Route, mpsc::UnboundedSender<FlowMessage>>,
}

/// Shared switchboard connecting every party in the process.
#[derive(Clone, Default)]
pub struct MessageBus {
    routes: Arc<Mutex<Routes>>,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `party` and return the stream of sessions opened to it.
    /// Registering again replaces the previous inbox.
    pub fn register(&self, party: PartyId) -> Result<mpsc::UnboundedReceiver<Session>> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Dropped outside the lock: queued sessions unregister themselves.
        let previous = self.routes()?.inboxes.insert(party, tx);
        drop(previous);
        debug!(party = %party, "Party registered on bus");
        Ok(rx)
    }

    pub fn unregister(&self, party: PartyId) -> Result<()> {
        let previous = self.routes()?.inboxes.remove(&party);
        drop(previous);
        Ok(())
    }

    pub fn is_registered(&self, party: PartyId) -> Result<bool> {
        Ok(self.routes()?.inboxes.contains_key(&party))
    }

    /// Open a session from `local` to `counterparty`.
    ///
    /// # Errors
    /// `UnknownParty` if the counterparty is not registered.
    pub fn open(&self, local: PartyId, counterparty: PartyId) -> Result<Session> {
        let id = SessionId::new();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let mut routes = self.routes()?;
        let inbox = routes
            .inboxes
            .get(&counterparty)
            .cloned()
            .ok_or(LedgerError::UnknownParty(counterparty))?;
        routes.sessions.insert((local, id), local_tx);
        routes.sessions.insert((counterparty, id), peer_tx);
        drop(routes);

        let remote = Session {
            id,
            local: counterparty,
            peer: local,
            bus: self.clone(),
            inbound: peer_rx,
        };
        if inbox.send(remote).is_err() {
            // The rejected end is dropped here, removing both routes.
            return Err(LedgerError::SessionClosed {
                reason: format!("{counterparty} is not accepting sessions"),
            });
        }
        debug!(session = %id, from = %local, to = %counterparty, "Session opened");
        Ok(Session {
            id,
            local,
            peer: counterparty,
            bus: self.clone(),
            inbound: local_rx,
        })
    }

    fn deliver(&self, to: Route, message: FlowMessage) -> Result<()> {
        let sender = self
            .routes()?
            .sessions
            .get(&to)
            .cloned()
            .ok_or_else(|| LedgerError::SessionClosed {
                reason: format!("{} left {}", to.0, to.1),
            })?;
        sender.send(message).map_err(|_| LedgerError::SessionClosed {
            reason: format!("{} left {}", to.0, to.1),
        })
    }

    fn close(&self, id: SessionId, local: PartyId, peer: PartyId) {
        if let Ok(mut routes) = self.routes() {
            routes.sessions.remove(&(local, id));
            routes.sessions.remove(&(peer, id));
        }
    }

    fn routes(&self) -> Result<MutexGuard<'_, Routes>> {
        self.routes
            .lock()
            .map_err(|_| LedgerError::Internal("message bus lock poisoned".to_string()))
    }
}

/// One end of a conversation between two parties.
///
/// Dropping either end closes the session: the other end's pending
/// `receive` resolves to `SessionClosed` once buffered messages are read.
pub struct Session {
    id: SessionId,
    local: PartyId,
    peer: PartyId,
    bus: MessageBus,
    inbound: mpsc::UnboundedReceiver<FlowMessage>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("local", &self.local)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn local(&self) -> PartyId {
        self.local
    }

    #[must_use]
    pub fn peer(&self) -> PartyId {
        self.peer
    }

    /// # Errors
    /// `SessionClosed` if the peer has dropped its end.
    pub fn send(&self, message: FlowMessage) -> Result<()> {
        debug!(session = %self.id, to = %self.peer, kind = message.kind(), "Sending");
        self.bus.deliver((self.peer, self.id), message)
    }

    /// Wait for the next message for at most `timeout`.
    ///
    /// # Errors
    /// `Timeout { stage }` on deadline, `SessionClosed` if the peer is gone.
    pub async fn receive(&mut self, timeout: Duration, stage: &str) -> Result<FlowMessage> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(LedgerError::SessionClosed {
                reason: format!("{} closed {} during {stage}", self.peer, self.id),
            }),
            Err(_) => Err(LedgerError::Timeout {
                stage: stage.to_string(),
            }),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.bus.close(self.id, self.local, self.peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let bus = MessageBus::new();
        let (alice, bob) = (PartyId([1; 32]), PartyId([2; 32]));
        bus.register(alice).unwrap();
        let mut bob_inbox = bus.register(bob).unwrap();

        let mut to_bob = bus.open(alice, bob).unwrap();
        let mut from_alice = bob_inbox.recv().await.unwrap();
        assert_eq!(from_alice.id(), to_bob.id());
        assert_eq!(from_alice.peer(), alice);

        to_bob.send(FlowMessage::Abort { reason: "hello".into() }).unwrap();
        assert!(matches!(
            from_alice.receive(WAIT, "test").await.unwrap(),
            FlowMessage::Abort { reason } if reason == "hello"
        ));

        from_alice.send(FlowMessage::Endorse(vec![])).unwrap();
        assert!(matches!(
            to_bob.receive(WAIT, "test").await.unwrap(),
            FlowMessage::Endorse(sigs) if sigs.is_empty()
        ));
    }

    #[tokio::test]
    async fn unknown_party_rejected() {
        let bus = MessageBus::new();
        let err = bus.open(PartyId([1; 32]), PartyId([2; 32])).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownParty(_)));
    }

    #[tokio::test]
    async fn receive_times_out() {
        let bus = MessageBus::new();
        let (alice, bob) = (PartyId([1; 32]), PartyId([2; 32]));
        let _bob_inbox = bus.register(bob).unwrap();
        let mut session = bus.open(alice, bob).unwrap();
        let err = session
            .receive(Duration::from_millis(20), "countersignature")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { stage } if stage == "countersignature"));
    }

    #[tokio::test]
    async fn dropped_peer_closes_session_after_buffered_messages() {
        let bus = MessageBus::new();
        let (alice, bob) = (PartyId([1; 32]), PartyId([2; 32]));
        let mut bob_inbox = bus.register(bob).unwrap();
        let to_bob = bus.open(alice, bob).unwrap();
        let mut from_alice = bob_inbox.recv().await.unwrap();

        to_bob.send(FlowMessage::Abort { reason: "bye".into() }).unwrap();
        drop(to_bob);

        assert!(matches!(
            from_alice.receive(WAIT, "finality").await.unwrap(),
            FlowMessage::Abort { .. }
        ));
        assert!(matches!(
            from_alice.receive(WAIT, "finality").await,
            Err(LedgerError::SessionClosed { .. })
        ));
        assert!(from_alice.send(FlowMessage::Endorse(vec![])).is_err());
    }
}
