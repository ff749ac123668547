//! Ordering authority (notary).
//!
//! The notary is the single linearization point of the ledger. It keeps
//! the set of consumed inputs and stamps a transaction final only if none
//! of its inputs is in that set.
//!
//! ## Checks, in order
//!
//! 1. Transaction id matches content
//! 2. Addressed to this notary
//! 3. Validity window not elapsed
//! 4. Every signatory signed, every signature verifies
//! 5. Contract validator accepts
//! 6. No input already consumed
//! 7. Supply totals stay representable
//!
//! Acceptance marks every input consumed, assigns the next sequence
//! number, signs, and records the supply effect, all in one step.
//!
//! Resubmitting a transaction that is already notarised returns the same
//! stamp. Any *other* transaction touching a consumed input is rejected
//! with `DoubleSpend`, every time, with no state change.
//!
//! [`NotaryService`] runs a [`NotaryState`] on its own task; callers talk
//! to it through a cloneable [`NotaryHandle`]. Requests are processed in
//! FIFO order, so a `lookup` sent after a timed-out `submit` observes that
//! submission's outcome.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use tokenflow_types::{
    LedgerError, LedgerKey, NotarisedTransaction, NotaryId, Result, SignedTransaction, StateRef,
    TransactionId,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{supply_conservation::SupplyConservation, validator::ValidatorRegistry};

/// Why the notary refused a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    DoubleSpend { conflicts: Vec<StateRef> },
    InvalidSignature(String),
    ExpiredWindow,
    WrongNotary(NotaryId),
    ContractViolation(String),
    Malformed(String),
}

impl RejectionReason {
    #[must_use]
    pub fn into_error(self) -> LedgerError {
        match self {
            Self::DoubleSpend { conflicts } => LedgerError::DoubleSpend { conflicts },
            Self::InvalidSignature(reason) => LedgerError::SignatureInvalid { reason },
            Self::ExpiredWindow => LedgerError::ExpiredWindow,
            Self::WrongNotary(expected) => LedgerError::NotaryRejected {
                reason: format!("transaction is addressed to {expected}"),
            },
            Self::ContractViolation(reason) => LedgerError::ValidationRejected {
                by: "notary".to_string(),
                reason,
            },
            Self::Malformed(reason) => LedgerError::NotaryRejected { reason },
        }
    }
}

#[derive(Debug, Clone)]
pub enum NotaryOutcome {
    Finalized(Box<NotarisedTransaction>),
    Rejected(RejectionReason),
}

impl NotaryOutcome {
    /// # Errors
    /// The rejection, converted to a [`LedgerError`].
    pub fn into_result(self) -> Result<NotarisedTransaction> {
        match self {
            Self::Finalized(notarised) => Ok(*notarised),
            Self::Rejected(reason) => Err(reason.into_error()),
        }
    }
}

// ---------------------------------------------------------------------------
// NotaryState
// ---------------------------------------------------------------------------

/// The notary's ledger: consumed inputs, stamped transactions, supply.
pub struct NotaryState {
    signing_key: SigningKey,
    id: NotaryId,
    validators: Arc<ValidatorRegistry>,
    /// Consumed input → the transaction that consumed it.
    consumed: HashMap<StateRef, TransactionId>,
    notarised: HashMap<TransactionId, NotarisedTransaction>,
    next_sequence: u64,
    supply: SupplyConservation,
}

impl NotaryState {
    #[must_use]
    pub fn new(signing_key: SigningKey, validators: Arc<ValidatorRegistry>) -> Self {
        let id = NotaryId::from(LedgerKey::from(&signing_key.verifying_key()));
        Self {
            signing_key,
            id,
            validators,
            consumed: HashMap::new(),
            notarised: HashMap::new(),
            next_sequence: 0,
            supply: SupplyConservation::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> NotaryId {
        self.id
    }

    pub fn submit(&mut self, signed: SignedTransaction) -> NotaryOutcome {
        self.submit_at(signed, Utc::now())
    }

    pub fn submit_at(&mut self, signed: SignedTransaction, now: DateTime<Utc>) -> NotaryOutcome {
        let tx_id = signed.id();
        match self.check(&signed, now) {
            Ok(Some(existing)) => {
                debug!(tx_id = %tx_id, "Transaction already notarised; returning existing stamp");
                NotaryOutcome::Finalized(Box::new(existing))
            }
            Ok(None) => match self.accept(signed) {
                Ok(notarised) => NotaryOutcome::Finalized(Box::new(notarised)),
                Err(reason) => {
                    warn!(tx_id = %tx_id, reason = ?reason, "Notary could not record transaction");
                    NotaryOutcome::Rejected(reason)
                }
            },
            Err(reason) => {
                warn!(tx_id = %tx_id, reason = ?reason, "Notary rejected transaction");
                NotaryOutcome::Rejected(reason)
            }
        }
    }

    /// `Ok(Some)` for a resubmission of a notarised transaction, `Ok(None)`
    /// for a fresh acceptable one.
    fn check(
        &self,
        signed: &SignedTransaction,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<NotarisedTransaction>, RejectionReason> {
        let tx = &signed.transaction;
        tx.verify_id()
            .map_err(|e| RejectionReason::Malformed(e.to_string()))?;
        if let Some(existing) = self.notarised.get(&tx.id) {
            return Ok(Some(existing.clone()));
        }
        if tx.notary != self.id {
            return Err(RejectionReason::WrongNotary(tx.notary));
        }
        if !tx.is_within_window(now) {
            return Err(RejectionReason::ExpiredWindow);
        }
        signed
            .verify_signatures()
            .map_err(|e| RejectionReason::InvalidSignature(e.to_string()))?;

        let mut seen = BTreeSet::new();
        if let Some(dup) = tx.inputs.iter().find(|i| !seen.insert(i.reference)) {
            return Err(RejectionReason::Malformed(format!(
                "input {} listed twice",
                dup.reference
            )));
        }
        self.validators
            .validate(tx)
            .map_err(RejectionReason::ContractViolation)?;

        let conflicts: Vec<StateRef> = tx
            .inputs
            .iter()
            .map(|i| i.reference)
            .filter(|r| self.consumed.contains_key(r))
            .collect();
        if !conflicts.is_empty() {
            return Err(RejectionReason::DoubleSpend { conflicts });
        }
        self.supply
            .check_transaction(tx)
            .map_err(|e| RejectionReason::Malformed(e.to_string()))?;
        Ok(None)
    }

    /// Supply is recorded first so that a failure leaves no trace.
    fn accept(
        &mut self,
        signed: SignedTransaction,
    ) -> std::result::Result<NotarisedTransaction, RejectionReason> {
        let tx_id = signed.id();
        let sequence = self.next_sequence;
        let notarised = NotarisedTransaction::stamp(signed, sequence, &self.signing_key);
        self.supply
            .record_transaction(&notarised)
            .map_err(|e| RejectionReason::Malformed(e.to_string()))?;
        for input in &notarised.transaction().inputs {
            self.consumed.insert(input.reference, tx_id);
        }
        self.next_sequence += 1;
        self.notarised.insert(tx_id, notarised.clone());
        info!(
            tx_id = %tx_id,
            sequence,
            command = %notarised.transaction().command,
            inputs = notarised.transaction().inputs.len(),
            "Transaction notarised"
        );
        Ok(notarised)
    }

    #[must_use]
    pub fn lookup(&self, tx_id: &TransactionId) -> Option<NotarisedTransaction> {
        self.notarised.get(tx_id).cloned()
    }

    /// The transaction that consumed `reference`, if any.
    #[must_use]
    pub fn consumed_by(&self, reference: &StateRef) -> Option<TransactionId> {
        self.consumed.get(reference).copied()
    }

    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    /// Number of notarised transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notarised.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notarised.is_empty()
    }
}

// ---------------------------------------------------------------------------
// NotaryService / NotaryHandle
// ---------------------------------------------------------------------------

/// Request sent to the notary task.
pub enum NotaryRequest {
    Submit {
        signed: Box<SignedTransaction>,
        reply: oneshot::Sender<NotaryOutcome>,
    },
    Lookup {
        tx_id: TransactionId,
        reply: oneshot::Sender<Option<NotarisedTransaction>>,
    },
    Supply {
        reply: oneshot::Sender<SupplyConservation>,
    },
}

pub struct NotaryService;

impl NotaryService {
    /// Spawn the notary task. It stops when every handle is dropped.
    pub fn spawn(state: NotaryState, queue_depth: usize) -> (NotaryHandle, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(queue_depth.max(1));
        let handle = NotaryHandle {
            id: state.id(),
            request_tx,
        };
        let task = tokio::spawn(notary_task(state, request_rx));
        (handle, task)
    }
}

async fn notary_task(mut state: NotaryState, mut request_rx: mpsc::Receiver<NotaryRequest>) {
    info!(notary = %state.id(), "Notary started");
    while let Some(request) = request_rx.recv().await {
        match request {
            NotaryRequest::Submit { signed, reply } => {
                let tx_id = signed.id();
                if reply.send(state.submit(*signed)).is_err() {
                    debug!(tx_id = %tx_id, "Submitter left before the outcome was sent");
                }
            }
            NotaryRequest::Lookup { tx_id, reply } => {
                if reply.send(state.lookup(&tx_id)).is_err() {
                    debug!(tx_id = %tx_id, "Lookup caller left");
                }
            }
            NotaryRequest::Supply { reply } => {
                if reply.send(state.supply().clone()).is_err() {
                    debug!("Supply caller left");
                }
            }
        }
    }
    info!(notary = %state.id(), notarised = state.len(), "Notary shutting down (channel closed)");
}

/// Cloneable client of the notary task.
#[derive(Debug, Clone)]
pub struct NotaryHandle {
    id: NotaryId,
    request_tx: mpsc::Sender<NotaryRequest>,
}

impl NotaryHandle {
    #[must_use]
    pub fn id(&self) -> NotaryId {
        self.id
    }

    /// Submit a fully signed transaction.
    ///
    /// # Errors
    /// - `Timeout` if no answer arrives within `timeout`; the submission may
    ///   still be processed
    /// - `Internal` if the notary task was gone before the submission could
    ///   be queued
    /// - `OutcomeUnknown` if the notary dropped the submission after taking
    ///   it, since it may have been stamped first
    pub async fn submit(&self, signed: SignedTransaction, timeout: Duration) -> Result<NotaryOutcome> {
        let tx_id = signed.id();
        self.request(
            timeout,
            "notary submission",
            |reply| NotaryRequest::Submit {
                signed: Box::new(signed),
                reply,
            },
            || LedgerError::OutcomeUnknown(tx_id),
        )
        .await
    }

    /// Fetch the stamp of a transaction, if it was notarised.
    pub async fn lookup(
        &self,
        tx_id: TransactionId,
        timeout: Duration,
    ) -> Result<Option<NotarisedTransaction>> {
        self.request(
            timeout,
            "notary lookup",
            |reply| NotaryRequest::Lookup { tx_id, reply },
            reply_lost,
        )
        .await
    }

    /// Snapshot of the issued/redeemed totals.
    pub async fn supply(&self, timeout: Duration) -> Result<SupplyConservation> {
        self.request(
            timeout,
            "notary supply query",
            |reply| NotaryRequest::Supply { reply },
            reply_lost,
        )
        .await
    }

    /// `dropped` builds the error for a request the notary accepted but
    /// never answered.
    async fn request<T>(
        &self,
        timeout: Duration,
        stage: &str,
        make: impl FnOnce(oneshot::Sender<T>) -> NotaryRequest,
        dropped: impl FnOnce() -> LedgerError,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async {
            self.request_tx
                .send(make(reply_tx))
                .await
                .map_err(|_| LedgerError::Internal("notary closed".to_string()))?;
            reply_rx.await.map_err(|_| dropped())
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                stage: stage.to_string(),
            }),
        }
    }
}

fn reply_lost() -> LedgerError {
    LedgerError::Internal("notary reply channel closed".to_string())
}

/// Requests parked by a notary that never answers.
#[cfg(any(test, feature = "test-helpers"))]
pub struct PendingRequests(pub mpsc::Receiver<NotaryRequest>);

#[cfg(any(test, feature = "test-helpers"))]
impl NotaryHandle {
    /// A handle whose requests are queued but never answered.
    #[must_use]
    pub fn unresponsive(id: NotaryId) -> (Self, PendingRequests) {
        let (request_tx, request_rx) = mpsc::channel(16);
        (Self { id, request_tx }, PendingRequests(request_rx))
    }
}
