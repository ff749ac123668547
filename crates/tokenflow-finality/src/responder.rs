//! Responder side of the finalization protocol.
//!
//! ```text
//!   WAIT_FOR_TX ──Propose──▶ SIGN_OR_REJECT ──Endorse──▶ WAIT_FOR_FINALITY ──Finality──▶ FINALIZED
//!                                  │                          │
//!                                  └──Reject──▶ REJECTED      ├──Abort──────────▶ ABORTED
//!                                                             └──silence/closed─▶ ABANDONED
//! ```
//!
//! A responder never infers an outcome from silence: if finality does not
//! arrive before the configured deadline the attempt is marked abandoned
//! and local state is left exactly as it was.

use std::fmt;

use tokenflow_types::{
    CandidateTransaction, LedgerError, NotarisedTransaction, Result, SignedTransaction,
    TransactionId, TransactionSignature,
};
use tracing::{debug, info, warn};

use crate::{
    party::PartyContext,
    session::{FlowMessage, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    WaitForTx,
    SignOrReject,
    WaitForFinality,
    Finalized,
    Rejected,
    Aborted,
    Abandoned,
}

impl fmt::Display for ResponderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitForTx => write!(f, "WAIT_FOR_TX"),
            Self::SignOrReject => write!(f, "SIGN_OR_REJECT"),
            Self::WaitForFinality => write!(f, "WAIT_FOR_FINALITY"),
            Self::Finalized => write!(f, "FINALIZED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::Abandoned => write!(f, "ABANDONED"),
        }
    }
}

/// Terminal result of one responder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    Finalized(TransactionId),
    Rejected {
        tx_id: Option<TransactionId>,
        reason: String,
    },
    Aborted {
        tx_id: TransactionId,
        reason: String,
    },
    Abandoned {
        tx_id: Option<TransactionId>,
        stage: ResponderState,
    },
}

impl ResponderOutcome {
    #[must_use]
    pub fn state(&self) -> ResponderState {
        match self {
            Self::Finalized(_) => ResponderState::Finalized,
            Self::Rejected { .. } => ResponderState::Rejected,
            Self::Aborted { .. } => ResponderState::Aborted,
            Self::Abandoned { .. } => ResponderState::Abandoned,
        }
    }

    #[must_use]
    pub fn tx_id(&self) -> Option<TransactionId> {
        match self {
            Self::Finalized(id) | Self::Aborted { tx_id: id, .. } => Some(*id),
            Self::Rejected { tx_id, .. } | Self::Abandoned { tx_id, .. } => *tx_id,
        }
    }
}

fn transition(ctx: &PartyContext, session: &Session, to: ResponderState) {
    debug!(party = %ctx.id, session = %session.id(), state = %to, "Responder transition");
}

/// Run the responder state machine over one incoming session.
pub async fn respond(ctx: &PartyContext, mut session: Session) -> ResponderOutcome {
    let timeout = ctx.config.finality_timeout;

    transition(ctx, &session, ResponderState::WaitForTx);
    let signed = match session.receive(timeout, "proposal").await {
        Ok(FlowMessage::Propose(signed)) => *signed,
        Ok(FlowMessage::Abort { reason }) => {
            debug!(session = %session.id(), %reason, "Aborted before proposal");
            return ResponderOutcome::Abandoned {
                tx_id: None,
                stage: ResponderState::WaitForTx,
            };
        }
        Ok(other) => {
            return reject(&session, None, format!("expected PROPOSE, got {}", other.kind()));
        }
        Err(e) => {
            warn!(session = %session.id(), error = %e, "No proposal received");
            return ResponderOutcome::Abandoned {
                tx_id: None,
                stage: ResponderState::WaitForTx,
            };
        }
    };
    let tx_id = signed.id();

    transition(ctx, &session, ResponderState::SignOrReject);
    let signatures = match endorse(ctx, &signed) {
        Ok(signatures) => signatures,
        Err(e) => {
            warn!(party = %ctx.id, tx_id = %tx_id, error = %e, "Rejecting proposal");
            return reject(&session, Some(tx_id), e.to_string());
        }
    };
    if let Err(e) = session.send(FlowMessage::Endorse(signatures)) {
        warn!(tx_id = %tx_id, error = %e, "Initiator left before endorsement");
        return ResponderOutcome::Abandoned {
            tx_id: Some(tx_id),
            stage: ResponderState::SignOrReject,
        };
    }

    transition(ctx, &session, ResponderState::WaitForFinality);
    match session.receive(timeout, "finality").await {
        Ok(FlowMessage::Finality(notarised)) => match accept_finality(ctx, &signed.transaction, &notarised) {
            Ok(()) => {
                info!(party = %ctx.id, tx_id = %tx_id, sequence = notarised.sequence, "Responder finalized");
                ResponderOutcome::Finalized(tx_id)
            }
            Err(e) => {
                warn!(party = %ctx.id, tx_id = %tx_id, error = %e, "Invalid finality message");
                ResponderOutcome::Abandoned {
                    tx_id: Some(tx_id),
                    stage: ResponderState::WaitForFinality,
                }
            }
        },
        Ok(FlowMessage::Abort { reason }) => {
            info!(party = %ctx.id, tx_id = %tx_id, %reason, "Initiator aborted");
            ResponderOutcome::Aborted { tx_id, reason }
        }
        Ok(other) => {
            warn!(tx_id = %tx_id, kind = other.kind(), "Unexpected message while waiting for finality");
            ResponderOutcome::Abandoned {
                tx_id: Some(tx_id),
                stage: ResponderState::WaitForFinality,
            }
        }
        Err(e) => {
            warn!(party = %ctx.id, tx_id = %tx_id, error = %e, "Finality never arrived; abandoning");
            ResponderOutcome::Abandoned {
                tx_id: Some(tx_id),
                stage: ResponderState::WaitForFinality,
            }
        }
    }
}

fn reject(session: &Session, tx_id: Option<TransactionId>, reason: String) -> ResponderOutcome {
    if let Err(e) = session.send(FlowMessage::Reject {
        reason: reason.clone(),
    }) {
        debug!(session = %session.id(), error = %e, "Reject not delivered");
    }
    ResponderOutcome::Rejected { tx_id, reason }
}

/// Validate a proposal and produce this party's signatures for it.
///
/// Non-signatories endorse with an empty signature list.
fn endorse(ctx: &PartyContext, signed: &SignedTransaction) -> Result<Vec<TransactionSignature>> {
    let tx = &signed.transaction;
    tx.verify_id()?;
    if tx.notary != ctx.notary.id() {
        return Err(LedgerError::PolicyViolation {
            reason: format!("transaction names notary {}, expected {}", tx.notary, ctx.notary.id()),
        });
    }
    for signature in &signed.signatures {
        if !tx.signatories.contains(&signature.by) {
            return Err(LedgerError::PolicyViolation {
                reason: format!("{} signed but is not a signatory", signature.by),
            });
        }
        signature.verify(&tx.id)?;
    }
    ctx.validators
        .validate(tx)
        .map_err(|reason| LedgerError::ValidationRejected {
            by: ctx.id.to_string(),
            reason,
        })?;
    check_issuer_keys(ctx, tx)?;
    if !involves_local_account(ctx, tx)? {
        return Err(LedgerError::PolicyViolation {
            reason: format!("{} hosts no account touched by {}", ctx.id, tx.id),
        });
    }

    let key = ctx.ledger_key();
    if tx.signatories.contains(&key) {
        Ok(vec![TransactionSignature::sign(&ctx.signing_key, &tx.id)])
    } else {
        Ok(Vec::new())
    }
}

/// Records whose issuer account is known here must carry that account's
/// key.
fn check_issuer_keys(ctx: &PartyContext, tx: &CandidateTransaction) -> Result<()> {
    let records = tx
        .inputs
        .iter()
        .map(|i| &i.record)
        .chain(tx.outputs.iter().filter_map(|o| o.as_token()));
    for record in records {
        match ctx.accounts.find_by_hash(&record.issuer) {
            Ok(issuer) if issuer.owning_key != record.issuer_key => {
                return Err(LedgerError::PolicyViolation {
                    reason: format!(
                        "{} names issuer {} but carries key {}",
                        record.group(),
                        issuer.identifier,
                        record.issuer_key
                    ),
                });
            }
            Ok(_) | Err(LedgerError::AccountNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// This party signs `tx`, holds one of its records, or is told of a new
/// account.
fn involves_local_account(ctx: &PartyContext, tx: &CandidateTransaction) -> Result<bool> {
    let key = ctx.ledger_key();
    if tx.signatories.contains(&key) || tx.account_outputs().next().is_some() {
        return Ok(true);
    }
    let holds_output = tx
        .outputs
        .iter()
        .filter_map(|o| o.as_token())
        .any(|t| t.owning_key == key);
    Ok(holds_output || tx.input_owning_keys().contains(&key))
}

/// Check a notarised transaction against the proposal and apply it.
fn accept_finality(
    ctx: &PartyContext,
    proposed: &CandidateTransaction,
    notarised: &NotarisedTransaction,
) -> Result<()> {
    if notarised.id() != proposed.id {
        return Err(LedgerError::ProtocolViolation {
            reason: format!("finality for {} does not match proposal {}", notarised.id(), proposed.id),
        });
    }
    notarised.verify_notary(ctx.notary.id())?;
    notarised.signed.verify_signatures()?;
    apply_finalized(ctx, notarised)
}

/// Make a notarised transaction visible locally: vault, accounts, log.
pub(crate) fn apply_finalized(ctx: &PartyContext, notarised: &NotarisedTransaction) -> Result<()> {
    let tx = notarised.transaction();
    ctx.vault.apply_transaction(tx, ctx.ledger_key())?;
    for account in tx.account_outputs() {
        ctx.accounts.record(account.clone())?;
    }
    ctx.log.record(notarised.clone())?;
    Ok(())
}
