//! Fungible token records.
//!
//! A [`TokenRecord`] is an immutable quantity of `symbol` issued by one
//! account and owned by another. Records are never updated in place: a
//! record is consumed as a transaction input and replaced by new outputs.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountHash, LedgerError, LedgerKey, Result, StateRef};

/// Key under which records are mutually interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FungibilityGroup {
    pub symbol: String,
    pub issuer: AccountHash,
}

impl FungibilityGroup {
    #[must_use]
    pub fn new(symbol: impl Into<String>, issuer: AccountHash) -> Self {
        Self {
            symbol: symbol.into(),
            issuer,
        }
    }
}

impl fmt::Display for FungibilityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, hex::encode(&self.issuer.0[..4]))
    }
}

/// A quantity of one symbol, issued by `issuer` and owned by `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub symbol: String,
    pub amount: Decimal,
    /// Free-form filter field; defaults to the owner's identifier.
    pub tag: String,
    pub issuer: AccountHash,
    pub owner: AccountHash,
    /// Key of the owner's host; only this key may spend the record.
    pub owning_key: LedgerKey,
    /// Key of the issuer's host. Issuing and redeeming need its signature.
    pub issuer_key: LedgerKey,
}

impl TokenRecord {
    #[must_use]
    pub fn group(&self) -> FungibilityGroup {
        FungibilityGroup::new(self.symbol.clone(), self.issuer)
    }

    /// Two records are fungible iff they share symbol and issuer.
    #[must_use]
    pub fn is_fungible_with(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.issuer == other.issuer
    }

    #[must_use]
    pub fn belongs_to(&self, group: &FungibilityGroup) -> bool {
        self.symbol == group.symbol && self.issuer == group.issuer
    }

    /// # Errors
    /// Returns `InvalidAmount` unless the amount is strictly positive.
    pub fn check_amount(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                reason: format!("record of {} {} must be positive", self.amount, self.symbol),
            });
        }
        Ok(())
    }

    pub(crate) fn canonical_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"token:");
        out.extend_from_slice(&(self.symbol.len() as u64).to_le_bytes());
        out.extend_from_slice(self.symbol.as_bytes());
        let amount = self.amount.normalize().to_string();
        out.extend_from_slice(&(amount.len() as u64).to_le_bytes());
        out.extend_from_slice(amount.as_bytes());
        out.extend_from_slice(&(self.tag.len() as u64).to_le_bytes());
        out.extend_from_slice(self.tag.as_bytes());
        out.extend_from_slice(&self.issuer.0);
        out.extend_from_slice(&self.owner.0);
        out.extend_from_slice(&self.owning_key.0);
        out.extend_from_slice(&self.issuer_key.0);
    }
}

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (issuer {}, owner {}, tag {})",
            self.amount, self.symbol, self.issuer, self.owner, self.tag
        )
    }
}

/// A resolved record together with the reference that consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub reference: StateRef,
    pub record: TokenRecord,
}

/// Sum of `amounts`, or `None` if it does not fit in a `Decimal`.
pub fn checked_total(amounts: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    amounts.into_iter().try_fold(Decimal::ZERO, Decimal::checked_add)
}

/// Dummy records for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl TokenRecord {
    pub fn dummy(symbol: &str, amount: Decimal, issuer: AccountHash, owner: AccountHash) -> Self {
        Self {
            symbol: symbol.to_string(),
            amount,
            tag: String::new(),
            issuer,
            owner,
            owning_key: LedgerKey([0u8; 32]),
            issuer_key: LedgerKey([0u8; 32]),
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl StateAndRef {
    /// Wrap a record under a random, never-notarised reference.
    pub fn dummy(record: TokenRecord) -> Self {
        Self {
            reference: StateRef::new(crate::TransactionId(rand::random::<[u8; 32]>()), 0),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(amount: i64, issuer: u8, owner: u8) -> TokenRecord {
        TokenRecord::dummy(
            "USD",
            Decimal::new(amount, 0),
            AccountHash([issuer; 32]),
            AccountHash([owner; 32]),
        )
    }

    #[test]
    fn fungible_iff_same_symbol_and_issuer() {
        let a = usd(10, 1, 2);
        let b = usd(20, 1, 3);
        let c = usd(10, 9, 2);
        let mut d = usd(10, 1, 2);
        d.symbol = "EUR".into();
        assert!(a.is_fungible_with(&b));
        assert!(!a.is_fungible_with(&c));
        assert!(!a.is_fungible_with(&d));
        assert!(b.belongs_to(&a.group()));
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        assert!(usd(1, 1, 2).check_amount().is_ok());
        assert!(usd(0, 1, 2).check_amount().is_err());
        assert!(usd(-5, 1, 2).check_amount().is_err());
    }

    #[test]
    fn canonical_bytes_ignore_decimal_scale() {
        let a = usd(100, 1, 2);
        let mut b = a.clone();
        b.amount = Decimal::new(10000, 2);
        let (mut ba, mut bb) = (Vec::new(), Vec::new());
        a.canonical_bytes(&mut ba);
        b.canonical_bytes(&mut bb);
        assert_eq!(ba, bb);
    }

    #[test]
    fn checked_total_sums_and_detects_overflow() {
        let records = [usd(10, 1, 2), usd(15, 1, 2)];
        assert_eq!(checked_total(records.iter().map(|r| r.amount)), Some(Decimal::new(25, 0)));
        assert_eq!(checked_total([]), Some(Decimal::ZERO));
        assert_eq!(checked_total([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn group_display() {
        let g = FungibilityGroup::new("USD", AccountHash([0xab; 32]));
        assert_eq!(g.to_string(), "USD@abababab");
    }
}
