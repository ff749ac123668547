//! # Claim: a local, time-bounded reservation of unspent records
//!
//! A claim exists only between the moment selection succeeds and the
//! moment the owning transaction is finalized or abandoned. It is never
//! written to the ledger.
//!
//! ```text
//!   ┌──────────┐  finalized   ┌──────────┐
//!   │ RESERVED ├─────────────▶│ CONSUMED │
//!   └────┬─────┘              └──────────┘
//!        │ release / ttl elapsed
//!        ▼
//!   ┌──────────┐
//!   │ RELEASED │
//!   └──────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountHash, ClaimId, FungibilityGroup, StateAndRef, StateRef};

/// Exclusive reservation of `records` for one in-flight transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub group: FungibilityGroup,
    pub owner: AccountHash,
    /// Amount the caller asked for.
    pub requested: Decimal,
    /// Reserved records in selection order.
    pub records: Vec<StateAndRef>,
    /// Exact sum of `records`; callers derive change from this without
    /// re-querying the vault.
    pub reserved_amount: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    /// `reserved_amount - requested`. Never negative.
    #[must_use]
    pub fn change(&self) -> Decimal {
        self.reserved_amount - self.requested
    }

    #[must_use]
    pub fn references(&self) -> Vec<StateRef> {
        self.records.iter().map(|s| s.reference).collect()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
