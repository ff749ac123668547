//! Typed outcomes returned by the client entry points.
//!
//! Entry points never propagate errors. Every failure is folded into a
//! [`FlowResponse`] whose [`FlowStatus`] tells the caller whether funds
//! could have moved.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ErrorKind, LedgerError, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowStatus {
    /// The transaction was notarised (or the query answered).
    Succeeded,
    /// Not enough unreserved value. Normal outcome, not a retry signal.
    InsufficientBalance,
    /// Nothing happened on the ledger; the same request may be resubmitted.
    Retryable,
    /// Hard rejection; inputs must be re-derived before trying again.
    Rejected,
    /// The notary could not be reached to confirm either way. Check the
    /// transaction id before retrying.
    OutcomeUnknown,
}

impl FlowStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::InsufficientBalance => write!(f, "INSUFFICIENT_BALANCE"),
            Self::Retryable => write!(f, "RETRYABLE"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::OutcomeUnknown => write!(f, "OUTCOME_UNKNOWN"),
        }
    }
}

/// Human-readable result of one entry-point call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub status: FlowStatus,
    pub message: String,
    /// Set when a transaction was notarised.
    pub transaction_id: Option<TransactionId>,
    /// Set by account creation.
    pub account_id: Option<Uuid>,
}

impl FlowResponse {
    #[must_use]
    pub fn success(message: impl Into<String>, transaction_id: Option<TransactionId>) -> Self {
        Self {
            status: FlowStatus::Succeeded,
            message: message.into(),
            transaction_id,
            account_id: None,
        }
    }

    #[must_use]
    pub fn with_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn insufficient_balance() -> Self {
        Self {
            status: FlowStatus::InsufficientBalance,
            message: "Insufficient Token Amount".to_string(),
            transaction_id: None,
            account_id: None,
        }
    }

    /// Fold an error into a response, classifying it by retry safety.
    #[must_use]
    pub fn from_error(err: &LedgerError) -> Self {
        let status = match err.kind() {
            ErrorKind::InsufficientFunds => FlowStatus::InsufficientBalance,
            _ if err.is_retry_safe() => FlowStatus::Retryable,
            _ if matches!(err, LedgerError::OutcomeUnknown(_)) => FlowStatus::OutcomeUnknown,
            _ => FlowStatus::Rejected,
        };
        let transaction_id = match err {
            LedgerError::OutcomeUnknown(id) => Some(*id),
            _ => None,
        };
        Self {
            status,
            message: format!("Flow failed, message: {err}"),
            transaction_id,
            account_id: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Display for FlowResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}
