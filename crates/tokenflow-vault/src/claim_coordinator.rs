//! Token Claim Coordinator.
//!
//! Reserves a set of unspent records covering a requested amount so that
//! no two in-flight transactions of this party pick the same record.
//!
//! ```text
//!   try_claim ──▶ sweep expired ──▶ select oldest-first ──▶ reserve all
//!                     (one critical section on the vault)
//! ```
//!
//! A claim is an optimisation, not the source of correctness: the notary
//! still rejects any transaction whose inputs were already consumed. What
//! the claim buys is that two local flows never waste a notary round-trip
//! racing for the same record.
//!
//! Selection is deterministic: records are taken in vault insertion
//! order (oldest first) until the running sum reaches the amount.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokenflow_types::{
    AccountHash, Claim, ClaimId, FungibilityGroup, LedgerError, Result, deadline_after,
};
use tracing::debug;

use crate::vault::TokenVault;

/// What to claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCriteria {
    pub group: FungibilityGroup,
    pub owner: AccountHash,
    pub amount: Decimal,
    /// Only records carrying exactly this tag are eligible.
    pub tag: Option<String>,
}

impl ClaimCriteria {
    #[must_use]
    pub fn new(group: FungibilityGroup, owner: AccountHash, amount: Decimal) -> Self {
        Self {
            group,
            owner,
            amount,
            tag: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Hands out exclusive, time-bounded claims over a vault's records.
#[derive(Debug, Clone)]
pub struct ClaimCoordinator {
    vault: Arc<TokenVault>,
}

impl ClaimCoordinator {
    #[must_use]
    pub fn new(vault: Arc<TokenVault>) -> Self {
        Self { vault }
    }

    /// Claim records covering `criteria.amount` for `ttl`.
    ///
    /// Returns `Ok(None)` when the unreserved records cannot cover the
    /// amount. Nothing is reserved in that case and the call never waits
    /// for other claims to finish.
    ///
    /// # Errors
    /// `InvalidAmount` if the amount is not positive, `Configuration` if
    /// `ttl` does not yield a representable expiry.
    pub fn try_claim(&self, criteria: &ClaimCriteria, ttl: Duration) -> Result<Option<Claim>> {
        self.try_claim_at(criteria, ttl, Utc::now())
    }

    /// [`Self::try_claim`] with an explicit clock.
    pub fn try_claim_at(
        &self,
        criteria: &ClaimCriteria,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Claim>> {
        if criteria.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                reason: format!("claim amount must be positive, got {}", criteria.amount),
            });
        }
        let id = ClaimId::new();
        let expires_at = deadline_after(now, ttl)?;
        let reserved = self
            .vault
            .with_pool(|pool| pool.reserve(criteria, id, expires_at, now))?;

        let Some((records, reserved_amount)) = reserved else {
            debug!(
                group = %criteria.group,
                owner = %criteria.owner,
                amount = %criteria.amount,
                "Claim failed: insufficient unreserved records"
            );
            return Ok(None);
        };

        debug!(
            claim_id = %id,
            group = %criteria.group,
            records = records.len(),
            reserved = %reserved_amount,
            requested = %criteria.amount,
            "Claim reserved"
        );
        Ok(Some(Claim {
            id,
            group: criteria.group.clone(),
            owner: criteria.owner,
            requested: criteria.amount,
            records,
            reserved_amount,
            expires_at,
        }))
    }

    /// Return a claim's records to the pool. Returns how many records were
    /// freed; zero if the claim is unknown, expired or already consumed.
    pub fn release(&self, claim_id: ClaimId) -> Result<usize> {
        let freed = self.vault.with_pool(|pool| pool.release(claim_id))?;
        debug!(claim_id = %claim_id, freed, "Claim released");
        Ok(freed)
    }

    /// Drop every reservation that expired at or before `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        self.vault.with_pool(|pool| pool.sweep_expired(now))
    }

    #[must_use]
    pub fn vault(&self) -> &Arc<TokenVault> {
        &self.vault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokenflow_types::{StateAndRef, StateRef, TokenRecord};

    const TTL: Duration = Duration::from_secs(300);

    fn issuer() -> AccountHash {
        AccountHash([1; 32])
    }

    fn owner() -> AccountHash {
        AccountHash([2; 32])
    }

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn criteria(amount: i64) -> ClaimCriteria {
        ClaimCriteria::new(FungibilityGroup::new("USD", issuer()), owner(), dec(amount))
    }

    fn coordinator_with(amounts: &[i64]) -> (ClaimCoordinator, Vec<StateAndRef>) {
        let vault = Arc::new(TokenVault::new());
        let mut records = Vec::new();
        for amount in amounts {
            let r = StateAndRef::dummy(TokenRecord::dummy("USD", dec(*amount), issuer(), owner()));
            vault.insert(r.clone()).unwrap();
            records.push(r);
        }
        (ClaimCoordinator::new(vault), records)
    }

    #[test]
    fn claim_covers_amount_and_exposes_change() {
        let (coord, records) = coordinator_with(&[100]);
        let claim = coord.try_claim(&criteria(40), TTL).unwrap().unwrap();
        assert_eq!(claim.records, records);
        assert_eq!(claim.reserved_amount, dec(100));
        assert_eq!(claim.change(), dec(60));
    }

    #[test]
    fn insufficient_returns_none() {
        let (coord, _) = coordinator_with(&[30, 20]);
        assert!(coord.try_claim(&criteria(51), TTL).unwrap().is_none());
        // Nothing was reserved by the failed attempt.
        assert!(coord.try_claim(&criteria(50), TTL).unwrap().is_some());
    }

    #[test]
    fn non_positive_amount_is_an_error() {
        let (coord, _) = coordinator_with(&[10]);
        assert!(matches!(
            coord.try_claim(&criteria(0), TTL),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn unrepresentable_ttl_is_an_error_and_reserves_nothing() {
        let (coord, _) = coordinator_with(&[10]);
        assert!(matches!(
            coord.try_claim(&criteria(10), Duration::from_secs(u64::MAX)),
            Err(LedgerError::Configuration(_))
        ));
        assert!(coord.try_claim(&criteria(10), TTL).unwrap().is_some());
    }

    #[test]
    fn concurrent_70_and_50_against_100_exactly_one_wins() {
        let (coord, _) = coordinator_with(&[100]);
        let results: Vec<Option<Claim>> = std::thread::scope(|s| {
            let a = s.spawn(|| coord.try_claim(&criteria(70), TTL).unwrap());
            let b = s.spawn(|| coord.try_claim(&criteria(50), TTL).unwrap());
            vec![a.join().unwrap(), b.join().unwrap()]
        });
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    }

    #[test]
    fn concurrent_claims_never_overlap() {
        let amounts: Vec<i64> = (1..=40).collect();
        let (coord, _) = coordinator_with(&amounts);
        let claims: Vec<Claim> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let coord = &coord;
                    s.spawn(move || coord.try_claim(&criteria(10 + i), TTL).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect()
        });
        assert!(!claims.is_empty());
        let mut seen: HashSet<StateRef> = HashSet::new();
        for claim in &claims {
            assert!(claim.reserved_amount >= claim.requested);
            for reference in claim.references() {
                assert!(seen.insert(reference), "record {reference} claimed twice");
            }
        }
    }

    #[test]
    fn expired_claim_is_reclaimable() {
        let (coord, records) = coordinator_with(&[100]);
        let now = Utc::now();
        let first = coord
            .try_claim_at(&criteria(100), Duration::from_secs(1), now)
            .unwrap()
            .unwrap();
        assert!(
            coord
                .try_claim_at(&criteria(100), TTL, now)
                .unwrap()
                .is_none()
        );
        let later = now + chrono::Duration::seconds(2);
        let second = coord.try_claim_at(&criteria(100), TTL, later).unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.records, records);
        // The expired claim no longer owns anything.
        assert_eq!(coord.release(first.id).unwrap(), 0);
    }

    #[test]
    fn release_returns_records_immediately() {
        let (coord, _) = coordinator_with(&[60, 40]);
        let claim = coord.try_claim(&criteria(100), TTL).unwrap().unwrap();
        assert!(coord.try_claim(&criteria(1), TTL).unwrap().is_none());
        assert_eq!(coord.release(claim.id).unwrap(), 2);
        assert!(coord.try_claim(&criteria(100), TTL).unwrap().is_some());
    }

    #[test]
    fn explicit_sweep() {
        let (coord, _) = coordinator_with(&[10]);
        let now = Utc::now();
        coord
            .try_claim_at(&criteria(10), Duration::from_secs(5), now)
            .unwrap()
            .unwrap();
        assert_eq!(coord.sweep(now).unwrap(), 0);
        assert_eq!(coord.sweep(now + chrono::Duration::seconds(5)).unwrap(), 1);
    }

    #[test]
    fn selection_is_deterministic() {
        let (coord_a, records_a) = coordinator_with(&[5, 10, 20, 40]);
        let claim = coord_a.try_claim(&criteria(12), TTL).unwrap().unwrap();
        assert_eq!(claim.records, records_a[..2].to_vec());
        assert_eq!(claim.change(), dec(3));
    }
}
