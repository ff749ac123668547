//! Initiator side of the finalization protocol.
//!
//! ```text
//!   VALIDATING ──▶ COLLECTING ──▶ NOTARISING ──▶ FINALIZED
//!       │              │              │
//!       └──────────────┴──────────────┴──▶ ABORTED          (claim released, Abort sent)
//!                                     └──▶ OUTCOME_UNKNOWN  (claim kept until expiry)
//! ```
//!
//! Until the notary answers, every failure is a clean abort: nothing was
//! notarised, so counterparties are told to forget the attempt and the
//! claimed records go back to the pool. Once the notary has seen the
//! transaction the only safe reactions are "final" or "unknown".

use std::{collections::BTreeSet, fmt};

use tokenflow_types::{
    CandidateTransaction, ClaimId, LedgerError, NotarisedTransaction, PartyId, Result,
    SignedTransaction, TransactionId,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    party::PartyContext,
    responder::apply_finalized,
    session::{FlowMessage, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    Validating,
    Collecting,
    Notarising,
    Finalized,
    Aborted,
    OutcomeUnknown,
}

impl fmt::Display for InitiatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => write!(f, "VALIDATING"),
            Self::Collecting => write!(f, "COLLECTING"),
            Self::Notarising => write!(f, "NOTARISING"),
            Self::Finalized => write!(f, "FINALIZED"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::OutcomeUnknown => write!(f, "OUTCOME_UNKNOWN"),
        }
    }
}

/// One finalization attempt driven by this party.
struct Attempt<'a> {
    ctx: &'a PartyContext,
    tx_id: TransactionId,
    claim: Option<ClaimId>,
    sessions: Vec<Session>,
    state: InitiatorState,
}

impl Attempt<'_> {
    fn transition(&mut self, to: InitiatorState) {
        debug!(party = %self.ctx.id, tx_id = %self.tx_id, from = %self.state, to = %to, "Initiator transition");
        self.state = to;
    }

    /// Validate locally, sign, and gather every counterparty's signatures.
    async fn collect(
        &mut self,
        candidate: CandidateTransaction,
        counterparties: &BTreeSet<PartyId>,
    ) -> Result<SignedTransaction> {
        self.ctx
            .validators
            .validate(&candidate)
            .map_err(|reason| LedgerError::ValidationRejected {
                by: "local".to_string(),
                reason,
            })?;

        let mut signed = SignedTransaction::new(candidate);
        if signed.transaction.signatories.contains(&self.ctx.ledger_key()) {
            signed.sign_with(&self.ctx.signing_key)?;
        }

        self.transition(InitiatorState::Collecting);
        let local = self.ctx.id;
        for &counterparty in counterparties.iter().filter(|&&p| p != local) {
            let session = self.ctx.bus.open(local, counterparty)?;
            self.sessions.push(session);
        }
        for session in &self.sessions {
            session.send(FlowMessage::Propose(Box::new(signed.clone())))?;
        }

        let deadline = Instant::now() + self.ctx.config.counterparty_timeout;
        for session in &mut self.sessions {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match session.receive(remaining, "counterparty signature").await? {
                FlowMessage::Endorse(signatures) => {
                    for signature in signatures {
                        signed.add_signature(signature)?;
                    }
                }
                FlowMessage::Reject { reason } => {
                    return Err(LedgerError::ValidationRejected {
                        by: session.peer().to_string(),
                        reason,
                    });
                }
                other => {
                    return Err(LedgerError::ProtocolViolation {
                        reason: format!("expected ENDORSE from {}, got {}", session.peer(), other.kind()),
                    });
                }
            }
        }

        signed.verify_signatures()?;
        Ok(signed)
    }

    /// Submit to the notary. On a silent notary, ask again through the same
    /// ordered queue: an answer of "never seen" proves nothing was stamped.
    async fn notarise(&mut self, signed: SignedTransaction) -> Result<NotarisedTransaction> {
        self.transition(InitiatorState::Notarising);
        let notary = &self.ctx.notary;
        let timeout = self.ctx.config.notary_timeout;

        let notarised = match notary.submit(signed, timeout).await {
            Ok(outcome) => outcome.into_result()?,
            Err(LedgerError::Timeout { stage }) => {
                warn!(tx_id = %self.tx_id, "Notary silent; checking whether the transaction was stamped");
                match notary.lookup(self.tx_id, timeout).await {
                    Ok(Some(notarised)) => notarised,
                    Ok(None) => return Err(LedgerError::Timeout { stage }),
                    Err(e) => {
                        warn!(tx_id = %self.tx_id, error = %e, "Notary lookup failed");
                        return Err(LedgerError::OutcomeUnknown(self.tx_id));
                    }
                }
            }
            Err(e) => return Err(e),
        };
        notarised.verify_notary(notary.id())?;
        Ok(notarised)
    }

    /// Apply locally, then tell every counterparty.
    fn complete(&mut self, notarised: &NotarisedTransaction) -> Result<()> {
        self.transition(InitiatorState::Finalized);
        let applied = apply_finalized(self.ctx, notarised);
        for session in &self.sessions {
            if let Err(e) = session.send(FlowMessage::Finality(Box::new(notarised.clone()))) {
                // Final regardless; the peer can fetch it from the notary.
                warn!(tx_id = %self.tx_id, peer = %session.peer(), error = %e, "Could not deliver finality");
            }
        }
        info!(
            party = %self.ctx.id,
            tx_id = %self.tx_id,
            sequence = notarised.sequence,
            command = %notarised.transaction().command,
            "Transaction finalized"
        );
        applied
    }

    /// Clean up after a failure that happened before notarisation.
    fn abort(&mut self, err: LedgerError) -> LedgerError {
        self.transition(InitiatorState::Aborted);
        let reason = err.to_string();
        for session in &self.sessions {
            if let Err(e) = session.send(FlowMessage::Abort {
                reason: reason.clone(),
            }) {
                debug!(peer = %session.peer(), error = %e, "Abort not delivered");
            }
        }
        if let Some(claim) = self.claim.take() {
            if let Err(e) = self.ctx.claims.release(claim) {
                warn!(claim_id = %claim, error = %e, "Could not release claim; it will expire");
            }
        }
        warn!(party = %self.ctx.id, tx_id = %self.tx_id, error = %err, "Finalization aborted");
        err
    }
}

/// Drive `candidate` to finality with the parties in `counterparties`.
///
/// `claim` is released if the attempt fails before the notary has seen the
/// transaction, and kept (until it expires) when the outcome is unknown.
///
/// # Errors
/// Any validation, signature, session or notary failure. A
/// `OutcomeUnknown` error means the transaction may still be final.
pub(crate) async fn finalize(
    ctx: &PartyContext,
    candidate: CandidateTransaction,
    counterparties: &BTreeSet<PartyId>,
    claim: Option<ClaimId>,
) -> Result<NotarisedTransaction> {
    let mut attempt = Attempt {
        ctx,
        tx_id: candidate.id,
        claim,
        sessions: Vec::new(),
        state: InitiatorState::Validating,
    };
    debug!(
        party = %ctx.id,
        tx_id = %attempt.tx_id,
        command = %candidate.command,
        counterparties = counterparties.len(),
        "Starting finalization"
    );

    let signed = match attempt.collect(candidate, counterparties).await {
        Ok(signed) => signed,
        Err(e) => return Err(attempt.abort(e)),
    };
    let notarised = match attempt.notarise(signed).await {
        Ok(notarised) => notarised,
        Err(e @ LedgerError::OutcomeUnknown(_)) => {
            attempt.transition(InitiatorState::OutcomeUnknown);
            warn!(party = %ctx.id, tx_id = %attempt.tx_id, "Notary outcome unknown; claim held until expiry");
            return Err(e);
        }
        Err(e) => return Err(attempt.abort(e)),
    };
    attempt.complete(&notarised)?;
    Ok(notarised)
}
