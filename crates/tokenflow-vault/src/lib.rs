//! # tokenflow-vault
//!
//! **Local state plane** of a party: the records it can spend, the
//! accounts it knows, and the coordination that keeps concurrent flows
//! from picking the same record.
//!
//! ## Architecture
//!
//! 1. **AccountRegistry**: accounts by identifier and by hash
//! 2. **TokenVault**: arena of unspent records, each slot with an optional reservation
//! 3. **ClaimCoordinator**: atomic oldest-first selection + reservation with expiry
//! 4. **BalanceQuery**: available balance (unspent minus live reservations)
//!
//! ## Claim Flow
//!
//! ```text
//! ClaimCoordinator.try_claim() → Claim ─┬─ finalized → TokenVault.apply_transaction() (records spent)
//!                                       └─ failed    → ClaimCoordinator.release()     (records free)
//! ```

pub mod account_registry;
pub mod balance_query;
pub mod claim_coordinator;
pub mod vault;

pub use account_registry::AccountRegistry;
pub use balance_query::BalanceQuery;
pub use claim_coordinator::{ClaimCoordinator, ClaimCriteria};
pub use vault::{AppliedChanges, RecordPool, Reservation, TokenVault};
