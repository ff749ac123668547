//! Error types for the tokenflow ledger.
//!
//! All errors use the `TF_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Account errors
//! - 2xx: Token / balance errors
//! - 4xx: Transaction construction errors
//! - 5xx: Finality protocol errors
//! - 6xx: Notary errors
//! - 7xx: Session / messaging errors
//! - 8xx: Invariant violations
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{LedgerKey, PartyId, StateRef, TransactionId};

/// Central error enum for all tokenflow operations.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    // =================================================================
    // Account Errors (1xx)
    // =================================================================
    /// No account with this identifier or hash is known locally.
    #[error("TF_ERR_100: Account not found: {0}")]
    AccountNotFound(String),

    /// The account's hash does not derive from its identifier.
    #[error("TF_ERR_101: Invalid account: {reason}")]
    InvalidAccount { reason: String },

    // =================================================================
    // Token / Balance Errors (2xx)
    // =================================================================
    /// Not enough unreserved value to cover the request.
    #[error("TF_ERR_200: Insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Amount is zero, negative, or otherwise unusable.
    #[error("TF_ERR_201: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // =================================================================
    // Transaction Construction Errors (4xx)
    // =================================================================
    /// A transaction must name at least one signatory.
    #[error("TF_ERR_400: Transaction has no signatories")]
    EmptySignatories,

    /// Inputs and outputs do not balance for the command.
    #[error("TF_ERR_401: Conservation violated: {reason}")]
    ConservationViolation { reason: String },

    /// The builder was not given everything a transaction needs.
    #[error("TF_ERR_402: Incomplete transaction: {reason}")]
    IncompleteTransaction { reason: String },

    /// The transaction id does not match its content.
    #[error("TF_ERR_403: Transaction id mismatch")]
    TransactionIdMismatch,

    // =================================================================
    // Finality Protocol Errors (5xx)
    // =================================================================
    /// The request breaks a hosting or counterparty rule. Raised before
    /// any network interaction.
    #[error("TF_ERR_500: Policy violation: {reason}")]
    PolicyViolation { reason: String },

    /// A counterparty or the notary rejected the transaction contents.
    #[error("TF_ERR_501: Validation rejected by {by}: {reason}")]
    ValidationRejected { by: String, reason: String },

    /// A signature failed to verify.
    #[error("TF_ERR_502: Invalid signature: {reason}")]
    SignatureInvalid { reason: String },

    /// A required signatory never signed.
    #[error("TF_ERR_503: Missing signature from {0}")]
    MissingSignature(LedgerKey),

    /// Unexpected message for the current protocol step.
    #[error("TF_ERR_504: Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    // =================================================================
    // Notary Errors (6xx)
    // =================================================================
    /// At least one input was consumed by a previously notarised transaction.
    #[error("TF_ERR_600: Double spend rejected: {} input(s) already consumed", .conflicts.len())]
    DoubleSpend { conflicts: Vec<StateRef> },

    /// The transaction's validity window has elapsed.
    #[error("TF_ERR_601: Validity window expired")]
    ExpiredWindow,

    /// The notary refused the transaction for a non-double-spend reason.
    #[error("TF_ERR_602: Notary rejected transaction: {reason}")]
    NotaryRejected { reason: String },

    /// Neither the submission nor the follow-up lookup answered in time.
    /// The transaction may or may not be final.
    #[error("TF_ERR_603: Notary outcome unknown for {0}")]
    OutcomeUnknown(TransactionId),

    // =================================================================
    // Session / Messaging Errors (7xx)
    // =================================================================
    /// A session or notary step exceeded its deadline.
    #[error("TF_ERR_700: Timed out during {stage}")]
    Timeout { stage: String },

    /// The other end of a session is gone.
    #[error("TF_ERR_701: Session closed: {reason}")]
    SessionClosed { reason: String },

    /// The party is not registered on the message bus.
    #[error("TF_ERR_702: Unknown party: {0}")]
    UnknownParty(PartyId),

    // =================================================================
    // Invariant Violations (8xx)
    // =================================================================
    /// Supply conservation invariant violated. Critical safety alert.
    #[error("TF_ERR_800: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("TF_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("TF_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("TF_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

/// Coarse failure taxonomy reported to callers. Every [`LedgerError`] maps onto exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    PolicyViolation,
    ValidationRejected,
    DoubleSpendRejected,
    Timeout,
    Internal,
}

impl LedgerError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound(_) => ErrorKind::NotFound,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientFunds,
            Self::PolicyViolation { .. }
            | Self::UnknownParty(_)
            | Self::InvalidAmount { .. }
            | Self::InvalidAccount { .. }
            | Self::EmptySignatories
            | Self::ConservationViolation { .. }
            | Self::IncompleteTransaction { .. } => ErrorKind::PolicyViolation,
            Self::ValidationRejected { .. }
            | Self::SignatureInvalid { .. }
            | Self::MissingSignature(_)
            | Self::TransactionIdMismatch
            | Self::ProtocolViolation { .. }
            | Self::ExpiredWindow
            | Self::NotaryRejected { .. } => ErrorKind::ValidationRejected,
            Self::DoubleSpend { .. } => ErrorKind::DoubleSpendRejected,
            Self::Timeout { .. } | Self::SessionClosed { .. } | Self::OutcomeUnknown(_) => {
                ErrorKind::Timeout
            }
            Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the failure guarantees nothing happened on the ledger and
    /// the identical request may simply be resubmitted.
    #[must_use]
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::SessionClosed { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
