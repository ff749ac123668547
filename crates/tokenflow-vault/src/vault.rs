//! Token vault: the per-party arena of unspent records.
//!
//! Every unspent record the party holds lives in one [`RecordPool`] slot,
//! in ledger insertion order. A slot carries an optional [`Reservation`];
//! reserving and releasing flip that field and nothing else, so a claimed
//! record stays part of the unspent set until the transaction spending it
//! is applied.
//!
//! [`TokenVault`] wraps the pool in a single mutex. Selection, reservation,
//! release and transaction application each run as one critical section,
//! which is what makes "check unreserved, then reserve" indivisible.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokenflow_types::{
    AccountHash, CandidateTransaction, ClaimId, FungibilityGroup, LedgerError, LedgerKey, Result,
    StateAndRef, StateRef,
};
use tracing::debug;

use crate::claim_coordinator::ClaimCriteria;

/// Exclusive hold on a slot, owned by one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub claim: ClaimId,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone)]
struct Slot {
    state: StateAndRef,
    reservation: Option<Reservation>,
}

impl Slot {
    fn matches(&self, group: &FungibilityGroup, owner: &AccountHash) -> bool {
        self.state.record.belongs_to(group) && self.state.record.owner == *owner
    }

    fn is_reserved_at(&self, now: DateTime<Utc>) -> bool {
        self.reservation.is_some_and(|r| r.is_live_at(now))
    }
}

/// Result of applying a finalized transaction to the local vault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    /// Inputs that were present locally and are now spent.
    pub consumed: Vec<StateRef>,
    /// Outputs now held locally as unspent.
    pub produced: Vec<StateRef>,
}

/// Arena of unspent records.
///
/// Plain data with `&mut self` methods; [`TokenVault`] provides the
/// locking.
#[derive(Debug, Default)]
pub struct RecordPool {
    /// Insertion sequence → slot. Iteration order is oldest-first.
    slots: BTreeMap<u64, Slot>,
    by_ref: HashMap<StateRef, u64>,
    claims: HashMap<ClaimId, Vec<u64>>,
    next_sequence: u64,
}

impl RecordPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unspent record. Returns `false` if it is already present.
    pub fn insert(&mut self, state: StateAndRef) -> bool {
        if self.by_ref.contains_key(&state.reference) {
            return false;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.by_ref.insert(state.reference, sequence);
        self.slots.insert(
            sequence,
            Slot {
                state,
                reservation: None,
            },
        );
        true
    }

    /// Remove a record permanently (it was spent). Any reservation on it
    /// goes with it.
    pub fn consume(&mut self, reference: &StateRef) -> Option<StateAndRef> {
        let sequence = self.by_ref.remove(reference)?;
        let slot = self.slots.remove(&sequence)?;
        if let Some(reservation) = slot.reservation {
            if let Some(held) = self.claims.get_mut(&reservation.claim) {
                held.retain(|s| *s != sequence);
                if held.is_empty() {
                    self.claims.remove(&reservation.claim);
                }
            }
        }
        Some(slot.state)
    }

    /// Clear every reservation whose expiry has passed. Returns the number
    /// of claims dropped.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<ClaimId> = self
            .claims
            .iter()
            .filter(|(id, sequences)| {
                sequences.iter().any(|s| {
                    self.slots
                        .get(s)
                        .and_then(|slot| slot.reservation)
                        .is_some_and(|r| r.claim == **id && !r.is_live_at(now))
                })
            })
            .map(|(id, _)| *id)
            .collect();
        for claim in &expired {
            self.release(*claim);
        }
        expired.len()
    }

    /// Select records oldest-first until their sum covers
    /// `criteria.amount`, then reserve them all for `claim`.
    ///
    /// Expired reservations are swept first. Returns `None` and reserves
    /// nothing if the unreserved matching records do not cover the amount.
    pub fn reserve(
        &mut self,
        criteria: &ClaimCriteria,
        claim: ClaimId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<(Vec<StateAndRef>, Decimal)> {
        let swept = self.sweep_expired(now);
        if swept > 0 {
            debug!(swept, "Swept expired claims");
        }
        let mut selected = Vec::new();
        let mut total = Decimal::ZERO;
        for (sequence, slot) in &self.slots {
            if total >= criteria.amount {
                break;
            }
            if !slot.matches(&criteria.group, &criteria.owner) || slot.is_reserved_at(now) {
                continue;
            }
            if criteria
                .tag
                .as_ref()
                .is_some_and(|tag| *tag != slot.state.record.tag)
            {
                continue;
            }
            // A record that would overflow the running total cannot be combined.
            let Some(next) = total.checked_add(slot.state.record.amount) else {
                continue;
            };
            total = next;
            selected.push(*sequence);
        }
        if total < criteria.amount {
            return None;
        }

        let reservation = Reservation {
            claim,
            expires_at,
        };
        let mut records = Vec::with_capacity(selected.len());
        for sequence in &selected {
            if let Some(slot) = self.slots.get_mut(sequence) {
                slot.reservation = Some(reservation);
                records.push(slot.state.clone());
            }
        }
        self.claims.insert(claim, selected);
        Some((records, total))
    }

    /// Drop the reservations held by `claim`. Returns the number of
    /// records returned to the pool.
    pub fn release(&mut self, claim: ClaimId) -> usize {
        let Some(sequences) = self.claims.remove(&claim) else {
            return 0;
        };
        let mut freed = 0;
        for sequence in sequences {
            if let Some(slot) = self.slots.get_mut(&sequence) {
                if slot.reservation.is_some_and(|r| r.claim == claim) {
                    slot.reservation = None;
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Unspent records of `owner` in `group`, reserved or not.
    pub fn unspent<'a>(
        &'a self,
        group: &'a FungibilityGroup,
        owner: &'a AccountHash,
    ) -> impl Iterator<Item = &'a StateAndRef> + 'a {
        self.slots
            .values()
            .filter(move |slot| slot.matches(group, owner))
            .map(|slot| &slot.state)
    }

    /// Sum of matching records not under a live reservation, saturating at
    /// `Decimal::MAX`.
    #[must_use]
    pub fn available(&self, group: &FungibilityGroup, owner: &AccountHash, now: DateTime<Utc>) -> Decimal {
        self.slots
            .values()
            .filter(|slot| slot.matches(group, owner) && !slot.is_reserved_at(now))
            .fold(Decimal::ZERO, |acc, slot| acc.saturating_add(slot.state.record.amount))
    }

    /// Sum of every unspent record in `group`, across all owners,
    /// saturating at `Decimal::MAX`.
    #[must_use]
    pub fn total_in_group(&self, group: &FungibilityGroup) -> Decimal {
        self.slots
            .values()
            .filter(|slot| slot.state.record.belongs_to(group))
            .fold(Decimal::ZERO, |acc, slot| acc.saturating_add(slot.state.record.amount))
    }

    #[must_use]
    pub fn get(&self, reference: &StateRef) -> Option<&StateAndRef> {
        self.by_ref
            .get(reference)
            .and_then(|s| self.slots.get(s))
            .map(|slot| &slot.state)
    }

    #[must_use]
    pub fn reservation_of(&self, reference: &StateRef) -> Option<Reservation> {
        self.by_ref
            .get(reference)
            .and_then(|s| self.slots.get(s))
            .and_then(|slot| slot.reservation)
    }

    #[must_use]
    pub fn contains(&self, reference: &StateRef) -> bool {
        self.by_ref.contains_key(reference)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of claims currently holding reservations.
    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }
}

/// Thread-safe handle to a party's record pool.
#[derive(Debug, Default)]
pub struct TokenVault {
    pool: Mutex<RecordPool>,
}

impl TokenVault {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the pool.
    ///
    /// # Errors
    /// Returns `Internal` if a previous holder panicked.
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut RecordPool) -> R) -> Result<R> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordPool>> {
        self.pool
            .lock()
            .map_err(|_| LedgerError::Internal("token vault lock poisoned".to_string()))
    }

    /// Apply a finalized transaction: spend every input present locally and
    /// add every token output whose owning key is `holder`.
    ///
    /// Inputs held elsewhere are ignored; the vault only tracks what this
    /// party can spend.
    pub fn apply_transaction(
        &self,
        tx: &CandidateTransaction,
        holder: LedgerKey,
    ) -> Result<AppliedChanges> {
        let mut pool = self.lock()?;
        let mut changes = AppliedChanges::default();
        for input in &tx.inputs {
            if pool.consume(&input.reference).is_some() {
                changes.consumed.push(input.reference);
            }
        }
        for output in tx.token_outputs() {
            if output.record.owning_key == holder {
                let reference = output.reference;
                if pool.insert(output) {
                    changes.produced.push(reference);
                }
            }
        }
        debug!(
            tx_id = %tx.id,
            consumed = changes.consumed.len(),
            produced = changes.produced.len(),
            "Applied transaction to vault"
        );
        Ok(changes)
    }

    /// Add an unspent record directly.
    pub fn insert(&self, state: StateAndRef) -> Result<bool> {
        self.with_pool(|pool| pool.insert(state))
    }

    pub fn len(&self) -> Result<usize> {
        self.with_pool(|pool| pool.len())
    }

    pub fn contains(&self, reference: &StateRef) -> Result<bool> {
        self.with_pool(|pool| pool.contains(reference))
    }
}
