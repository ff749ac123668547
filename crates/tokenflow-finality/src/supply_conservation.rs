//! Supply conservation invariant checker.
//!
//! Invariant enforced for every fungibility group:
//! ```text
//! ∀ group: Σ(unspent amounts) == Σ(issued) - Σ(redeemed)
//! ```
//!
//! The notary records every accepted `Issue` and `Redeem`; transfers move
//! value between owners and never change the expected supply. A mismatch
//! is a critical safety alert.
//!
//! Totals never exceed `Decimal::MAX`: a transaction that would push one
//! past it fails [`SupplyConservation::check_transaction`] and must not be
//! accepted.

use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use tokenflow_types::{
    CandidateTransaction, Command, FungibilityGroup, LedgerError, NotarisedTransaction, Result,
};

/// Supply effect of one transaction.
enum Effect {
    Issue(FungibilityGroup, Decimal),
    Redeem(FungibilityGroup, Decimal),
}

/// The group comes from the first token output for `Issue` and from the
/// first input for `Redeem`; both commands are single-group.
fn effect_of(tx: &CandidateTransaction) -> Option<Effect> {
    match &tx.command {
        Command::Issue { amount } => tx
            .outputs
            .iter()
            .find_map(|o| o.as_token())
            .map(|token| Effect::Issue(token.group(), *amount)),
        Command::Redeem { amount } => tx
            .inputs
            .first()
            .map(|input| Effect::Redeem(input.record.group(), *amount)),
        Command::CreateAccount | Command::Transfer => None,
    }
}

fn add_to(total: Decimal, amount: Decimal, group: &FungibilityGroup, what: &str) -> Result<Decimal> {
    total.checked_add(amount).ok_or_else(|| LedgerError::InvalidAmount {
        reason: format!("{what} supply of {group} would overflow ({total} + {amount})"),
    })
}

/// Tracks per-group issuance and redemption totals.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    /// Total issued per group since genesis.
    issued: HashMap<FungibilityGroup, Decimal>,
    /// Total redeemed per group since genesis.
    redeemed: HashMap<FungibilityGroup, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `InvalidAmount` if the group's issued total would overflow. Nothing
    /// is recorded in that case.
    pub fn record_issue(&mut self, group: &FungibilityGroup, amount: Decimal) -> Result<()> {
        let total = add_to(self.total_issued(group), amount, group, "issued")?;
        self.issued.insert(group.clone(), total);
        Ok(())
    }

    /// # Errors
    /// `InvalidAmount` if the group's redeemed total would overflow.
    pub fn record_redeem(&mut self, group: &FungibilityGroup, amount: Decimal) -> Result<()> {
        let total = add_to(self.total_redeemed(group), amount, group, "redeemed")?;
        self.redeemed.insert(group.clone(), total);
        Ok(())
    }

    /// Whether `tx` could be recorded, without recording it.
    ///
    /// # Errors
    /// `InvalidAmount` if recording would overflow a total.
    pub fn check_transaction(&self, tx: &CandidateTransaction) -> Result<()> {
        match effect_of(tx) {
            Some(Effect::Issue(group, amount)) => {
                add_to(self.total_issued(&group), amount, &group, "issued").map(drop)
            }
            Some(Effect::Redeem(group, amount)) => {
                add_to(self.total_redeemed(&group), amount, &group, "redeemed").map(drop)
            }
            None => Ok(()),
        }
    }

    /// Record the supply effect of a notarised transaction.
    ///
    /// # Errors
    /// `InvalidAmount` if a total would overflow; see
    /// [`Self::check_transaction`].
    pub fn record_transaction(&mut self, notarised: &NotarisedTransaction) -> Result<()> {
        match effect_of(notarised.transaction()) {
            Some(Effect::Issue(group, amount)) => self.record_issue(&group, amount),
            Some(Effect::Redeem(group, amount)) => self.record_redeem(&group, amount),
            None => Ok(()),
        }
    }

    /// Expected supply of a group: issued - redeemed.
    #[must_use]
    pub fn expected_supply(&self, group: &FungibilityGroup) -> Decimal {
        self.total_issued(group) - self.total_redeemed(group)
    }

    /// Verify that the actual unspent total matches the expected supply.
    ///
    /// # Errors
    /// Returns [`LedgerError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, group: &FungibilityGroup, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(group);
        if actual_supply != expected {
            return Err(LedgerError::SupplyInvariantViolation {
                reason: format!(
                    "Group {group}: actual supply {actual_supply} != expected {expected} \
                     (issued={}, redeemed={})",
                    self.total_issued(group),
                    self.total_redeemed(group),
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn tracked_groups(&self) -> Vec<FungibilityGroup> {
        let groups: BTreeSet<FungibilityGroup> = self
            .issued
            .keys()
            .chain(self.redeemed.keys())
            .cloned()
            .collect();
        groups.into_iter().collect()
    }

    #[must_use]
    pub fn total_issued(&self, group: &FungibilityGroup) -> Decimal {
        self.issued.get(group).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn total_redeemed(&self, group: &FungibilityGroup) -> Decimal {
        self.redeemed.get(group).copied().unwrap_or(Decimal::ZERO)
    }
}
