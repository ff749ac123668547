//! Balance Query Service.
//!
//! Reports the *available* balance: unspent records of an owner in one
//! fungibility group that are not held by a live claim. A record under an
//! expired claim counts as available again even before the next sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokenflow_types::{AccountHash, FungibilityGroup, Result, StateAndRef};

use crate::vault::TokenVault;

/// Read-only view over a party's vault.
#[derive(Debug, Clone)]
pub struct BalanceQuery {
    vault: Arc<TokenVault>,
}

impl BalanceQuery {
    #[must_use]
    pub fn new(vault: Arc<TokenVault>) -> Self {
        Self { vault }
    }

    /// Available balance of `owner` in `group`. Zero when nothing matches.
    pub fn query_balance(&self, group: &FungibilityGroup, owner: &AccountHash) -> Result<Decimal> {
        self.query_balance_at(group, owner, Utc::now())
    }

    pub fn query_balance_at(
        &self,
        group: &FungibilityGroup,
        owner: &AccountHash,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        self.vault.with_pool(|pool| pool.available(group, owner, now))
    }

    /// Every unspent record of `owner` in `group`, including reserved ones.
    pub fn query_unspent(
        &self,
        group: &FungibilityGroup,
        owner: &AccountHash,
    ) -> Result<Vec<StateAndRef>> {
        self.vault
            .with_pool(|pool| pool.unspent(group, owner).cloned().collect())
    }

    /// Sum of all unspent records in `group` held by this party.
    pub fn total_unspent(&self, group: &FungibilityGroup) -> Result<Decimal> {
        self.vault.with_pool(|pool| pool.total_in_group(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim_coordinator::{ClaimCoordinator, ClaimCriteria};
    use std::time::Duration;
    use tokenflow_types::TokenRecord;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn setup(amounts: &[(i64, u8)]) -> (Arc<TokenVault>, FungibilityGroup) {
        let issuer = AccountHash([1; 32]);
        let vault = Arc::new(TokenVault::new());
        for (amount, owner) in amounts {
            let record = TokenRecord::dummy("USD", dec(*amount), issuer, AccountHash([*owner; 32]));
            vault.insert(StateAndRef::dummy(record)).unwrap();
        }
        (vault, FungibilityGroup::new("USD", issuer))
    }

    #[test]
    fn no_records_is_zero() {
        let (vault, group) = setup(&[]);
        let query = BalanceQuery::new(vault);
        assert_eq!(query.query_balance(&group, &AccountHash([2; 32])).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn sums_only_matching_owner_and_group() {
        let (vault, group) = setup(&[(60, 2), (40, 2), (500, 3)]);
        let other_symbol = TokenRecord::dummy("EUR", dec(7), AccountHash([1; 32]), AccountHash([2; 32]));
        vault.insert(StateAndRef::dummy(other_symbol)).unwrap();

        let query = BalanceQuery::new(vault);
        assert_eq!(query.query_balance(&group, &AccountHash([2; 32])).unwrap(), dec(100));
        assert_eq!(query.total_unspent(&group).unwrap(), dec(600));
    }

    #[test]
    fn reserved_records_are_excluded_until_expiry() {
        let (vault, group) = setup(&[(60, 2), (40, 2)]);
        let owner = AccountHash([2; 32]);
        let query = BalanceQuery::new(Arc::clone(&vault));
        let coord = ClaimCoordinator::new(vault);

        let now = Utc::now();
        coord
            .try_claim_at(
                &ClaimCriteria::new(group.clone(), owner, dec(50)),
                Duration::from_secs(10),
                now,
            )
            .unwrap()
            .unwrap();

        assert_eq!(query.query_balance_at(&group, &owner, now).unwrap(), dec(40));
        // Raw unspent set still contains the reserved record.
        assert_eq!(query.query_unspent(&group, &owner).unwrap().len(), 2);
        assert_eq!(query.total_unspent(&group).unwrap(), dec(100));

        let after = now + chrono::Duration::seconds(10);
        assert_eq!(query.query_balance_at(&group, &owner, after).unwrap(), dec(100));
    }
}
