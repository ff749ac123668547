//! System-wide constants and defaults for the tokenflow ledger.

/// Default validity horizon of a transaction (24 hours), in milliseconds.
pub const DEFAULT_VALIDITY_HORIZON_MS: u64 = 24 * 60 * 60 * 1000;

/// Default lifetime of a claim reservation (5 minutes), in milliseconds.
pub const DEFAULT_CLAIM_TTL_MS: u64 = 5 * 60 * 1000;

/// Default deadline for a counterparty to countersign or reject.
pub const DEFAULT_COUNTERPARTY_TIMEOUT_MS: u64 = 30_000;

/// Default deadline for one notary round-trip.
pub const DEFAULT_NOTARY_TIMEOUT_MS: u64 = 10_000;

/// Default time a responder waits for the notarised transaction before
/// marking the attempt abandoned.
pub const DEFAULT_FINALITY_TIMEOUT_MS: u64 = 60_000;

/// Default capacity of the notary's request queue.
pub const DEFAULT_NOTARY_QUEUE_DEPTH: usize = 1024;

/// Upper bound on every configured duration (one year), in milliseconds.
pub const MAX_DURATION_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Default number of finished responder outcomes kept per party.
pub const DEFAULT_RESPONDER_HISTORY: usize = 256;

/// Length of the per-transaction uniqueness salt.
pub const TRANSACTION_SALT_LEN: usize = 16;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ledger name.
pub const LEDGER_NAME: &str = "tokenflow";
