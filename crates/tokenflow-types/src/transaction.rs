//! Transaction model: commands, candidate transactions, signatures and
//! notarised (finalized) transactions.
//!
//! ## Lifecycle
//!
//! ```text
//!   CandidateTransaction ──sign──▶ SignedTransaction ──notary──▶ NotarisedTransaction
//!          (builder)              (every signatory)            (globally ordered, final)
//! ```
//!
//! The transaction id commits to every field except itself, so any
//! signature over the id is a signature over the full content.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    Account, FungibilityGroup, LedgerError, LedgerKey, NotaryId, Result, StateAndRef, StateRef,
    TokenRecord, TransactionId, checked_total,
};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Tag used to resolve the contract validator for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum CommandTag {
    CreateAccount,
    Issue,
    Transfer,
    Redeem,
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateAccount => write!(f, "CREATE_ACCOUNT"),
            Self::Issue => write!(f, "ISSUE"),
            Self::Transfer => write!(f, "TRANSFER"),
            Self::Redeem => write!(f, "REDEEM"),
        }
    }
}

/// What a transaction does. Value-changing commands carry the amount they
/// create or destroy so conservation can be checked without context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    CreateAccount,
    Issue { amount: Decimal },
    Transfer,
    Redeem { amount: Decimal },
}

impl Command {
    #[must_use]
    pub fn tag(&self) -> CommandTag {
        match self {
            Self::CreateAccount => CommandTag::CreateAccount,
            Self::Issue { .. } => CommandTag::Issue,
            Self::Transfer => CommandTag::Transfer,
            Self::Redeem { .. } => CommandTag::Redeem,
        }
    }

    fn canonical_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Self::CreateAccount => out.push(0),
            Self::Issue { amount } => {
                out.push(1);
                push_decimal(out, *amount);
            }
            Self::Transfer => out.push(2),
            Self::Redeem { amount } => {
                out.push(3);
                push_decimal(out, *amount);
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue { amount } | Self::Redeem { amount } => write!(f, "{}({amount})", self.tag()),
            Self::CreateAccount | Self::Transfer => write!(f, "{}", self.tag()),
        }
    }
}

fn push_decimal(out: &mut Vec<u8>, value: Decimal) {
    let s = value.normalize().to_string();
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A new ledger state produced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputState {
    Account(Account),
    Token(TokenRecord),
}

impl OutputState {
    #[must_use]
    pub fn as_token(&self) -> Option<&TokenRecord> {
        match self {
            Self::Token(t) => Some(t),
            Self::Account(_) => None,
        }
    }

    #[must_use]
    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Self::Account(a) => Some(a),
            Self::Token(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CandidateTransaction
// ---------------------------------------------------------------------------

/// A fully assembled, not yet signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub id: TransactionId,
    /// Consumed records, in order.
    pub inputs: Vec<StateAndRef>,
    /// Created states, in order. Output `i` is addressed as `StateRef(id, i)`.
    pub outputs: Vec<OutputState>,
    pub command: Command,
    /// Keys that must sign before the notary accepts the transaction.
    pub signatories: BTreeSet<LedgerKey>,
    /// Last instant at which the notary may accept the transaction.
    pub valid_until: DateTime<Utc>,
    pub notary: NotaryId,
    /// Uniqueness salt so identical content yields distinct ids.
    pub salt: [u8; 16],
}

impl CandidateTransaction {
    /// Canonical payload committed to by the id.
    ///
    /// Format: `"tokenflow:tx:v1:" || salt || notary || valid_until_ms || command
    ///          || inputs || outputs || signatories`
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(512);
        payload.extend_from_slice(b"tokenflow:tx:v1:");
        payload.extend_from_slice(&self.salt);
        payload.extend_from_slice(&self.notary.0);
        payload.extend_from_slice(&self.valid_until.timestamp_millis().to_le_bytes());
        self.command.canonical_bytes(&mut payload);

        payload.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            payload.extend_from_slice(&input.reference.transaction.0);
            payload.extend_from_slice(&input.reference.index.to_le_bytes());
            input.record.canonical_bytes(&mut payload);
        }

        payload.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            match output {
                OutputState::Account(a) => a.canonical_bytes(&mut payload),
                OutputState::Token(t) => t.canonical_bytes(&mut payload),
            }
        }

        payload.extend_from_slice(&(self.signatories.len() as u64).to_le_bytes());
        for key in &self.signatories {
            payload.extend_from_slice(&key.0);
        }
        payload
    }

    /// SHA-256 of [`Self::signing_payload`].
    #[must_use]
    pub fn compute_id(&self) -> TransactionId {
        let digest = Sha256::digest(self.signing_payload());
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        TransactionId(id)
    }

    /// # Errors
    /// Returns `TransactionIdMismatch` if the content was altered after sealing.
    pub fn verify_id(&self) -> Result<()> {
        if self.compute_id() != self.id {
            return Err(LedgerError::TransactionIdMismatch);
        }
        Ok(())
    }

    #[must_use]
    pub fn input_refs(&self) -> Vec<StateRef> {
        self.inputs.iter().map(|i| i.reference).collect()
    }

    #[must_use]
    pub fn output_ref(&self, index: u32) -> StateRef {
        StateRef::new(self.id, index)
    }

    /// Token outputs paired with the references they will have once final.
    #[must_use]
    pub fn token_outputs(&self) -> Vec<StateAndRef> {
        self.outputs
            .iter()
            .enumerate()
            .filter_map(|(i, o)| {
                o.as_token().map(|t| StateAndRef {
                    reference: self.output_ref(u32::try_from(i).unwrap_or(u32::MAX)),
                    record: t.clone(),
                })
            })
            .collect()
    }

    pub fn account_outputs(&self) -> impl Iterator<Item = &Account> {
        self.outputs.iter().filter_map(OutputState::as_account)
    }

    #[must_use]
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        now <= self.valid_until
    }

    /// Keys that own the consumed records.
    #[must_use]
    pub fn input_owning_keys(&self) -> BTreeSet<LedgerKey> {
        self.inputs.iter().map(|i| i.record.owning_key).collect()
    }

    /// Check the command's value rules against inputs and outputs.
    ///
    /// - `CreateAccount`: no inputs, exactly one account output
    /// - `Issue { amount }`: no inputs, one group, `Σout == amount`
    /// - `Transfer`: per group `Σin == Σout`
    /// - `Redeem { amount }`: one group, `Σin == Σout + amount`
    ///
    /// # Errors
    /// `InvalidAmount` for non-positive amounts, `ConservationViolation`
    /// for anything that does not balance.
    pub fn check_conservation(&self) -> Result<()> {
        for input in &self.inputs {
            input.record.check_amount()?;
        }
        let tokens: Vec<&TokenRecord> = self.outputs.iter().filter_map(OutputState::as_token).collect();
        for token in &tokens {
            token.check_amount()?;
        }
        let account_count = self.account_outputs().count();

        match &self.command {
            Command::CreateAccount => {
                if !self.inputs.is_empty() || !tokens.is_empty() || account_count != 1 {
                    return Err(violation(
                        "account creation must have no inputs and exactly one account output",
                    ));
                }
            }
            Command::Issue { amount } => {
                check_positive(*amount, "issued amount")?;
                if !self.inputs.is_empty() {
                    return Err(violation("issuance must not consume inputs"));
                }
                if account_count != 0 || tokens.is_empty() {
                    return Err(violation("issuance must produce only token outputs"));
                }
                single_group(tokens.iter().copied())?;
                let issued = sum_or_overflow(tokens.iter().map(|t| t.amount), "issued outputs")?;
                if issued != *amount {
                    return Err(violation(&format!(
                        "issue command declares {amount} but outputs total {issued}"
                    )));
                }
            }
            Command::Transfer => {
                if self.inputs.is_empty() {
                    return Err(violation("transfer must consume at least one input"));
                }
                if account_count != 0 {
                    return Err(violation("transfer must not create accounts"));
                }
                let mut sums: BTreeMap<FungibilityGroup, (Decimal, Decimal)> = BTreeMap::new();
                for input in &self.inputs {
                    let consumed = &mut sums.entry(input.record.group()).or_default().0;
                    *consumed = sum_or_overflow([*consumed, input.record.amount], "transfer inputs")?;
                }
                for token in &tokens {
                    let produced = &mut sums.entry(token.group()).or_default().1;
                    *produced = sum_or_overflow([*produced, token.amount], "transfer outputs")?;
                }
                for (group, (consumed, produced)) in sums {
                    if consumed != produced {
                        return Err(violation(&format!(
                            "group {group}: inputs {consumed} != outputs {produced}"
                        )));
                    }
                }
            }
            Command::Redeem { amount } => {
                check_positive(*amount, "redeemed amount")?;
                if self.inputs.is_empty() {
                    return Err(violation("redemption must consume at least one input"));
                }
                if account_count != 0 {
                    return Err(violation("redemption must not create accounts"));
                }
                single_group(self.inputs.iter().map(|i| &i.record).chain(tokens.iter().copied()))?;
                let consumed = sum_or_overflow(self.inputs.iter().map(|i| i.record.amount), "redeemed inputs")?;
                let produced = sum_or_overflow(tokens.iter().map(|t| t.amount), "redemption change")?;
                if consumed != sum_or_overflow([produced, *amount], "change plus redeemed amount")? {
                    return Err(violation(&format!(
                        "inputs {consumed} != outputs {produced} + redeemed {amount}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn sum_or_overflow(amounts: impl IntoIterator<Item = Decimal>, what: &str) -> Result<Decimal> {
    checked_total(amounts).ok_or_else(|| LedgerError::InvalidAmount {
        reason: format!("{what} overflow the representable amount"),
    })
}

fn violation(reason: &str) -> LedgerError {
    LedgerError::ConservationViolation {
        reason: reason.to_string(),
    }
}

fn check_positive(amount: Decimal, what: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            reason: format!("{what} must be positive, got {amount}"),
        });
    }
    Ok(())
}

fn single_group<'a>(mut records: impl Iterator<Item = &'a TokenRecord>) -> Result<()> {
    if let Some(first) = records.next() {
        if let Some(other) = records.find(|r| !r.is_fungible_with(first)) {
            return Err(violation(&format!(
                "mixed fungibility groups {} and {}",
                first.group(),
                other.group()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// An ed25519 signature by `by` over a transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub by: LedgerKey,
    pub signature: Vec<u8>,
}

impl TransactionSignature {
    fn payload(id: &TransactionId) -> Vec<u8> {
        let mut payload = Vec::with_capacity(49);
        payload.extend_from_slice(b"tokenflow:sig:v1:");
        payload.extend_from_slice(&id.0);
        payload
    }

    /// Sign a transaction id.
    #[must_use]
    pub fn sign(key: &SigningKey, id: &TransactionId) -> Self {
        Self::sign_payload(key, &Self::payload(id))
    }

    /// # Errors
    /// Returns `SignatureInvalid` if the signature does not verify.
    pub fn verify(&self, id: &TransactionId) -> Result<()> {
        self.verify_payload(&Self::payload(id))
    }

    pub(crate) fn sign_payload(key: &SigningKey, payload: &[u8]) -> Self {
        Self {
            by: LedgerKey::from(&key.verifying_key()),
            signature: key.sign(payload).to_bytes().to_vec(),
        }
    }

    pub(crate) fn verify_payload(&self, payload: &[u8]) -> Result<()> {
        let bytes: [u8; 64] =
            self.signature
                .as_slice()
                .try_into()
                .map_err(|_| LedgerError::SignatureInvalid {
                    reason: format!("signature by {} has length {}", self.by, self.signature.len()),
                })?;
        let signature = Signature::from_bytes(&bytes);
        self.by
            .to_verifying_key()?
            .verify(payload, &signature)
            .map_err(|e| LedgerError::SignatureInvalid {
                reason: format!("signature by {} does not verify: {e}", self.by),
            })
    }
}

// ---------------------------------------------------------------------------
// SignedTransaction
// ---------------------------------------------------------------------------

/// A candidate transaction plus the signatures collected so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: CandidateTransaction,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    #[must_use]
    pub fn new(transaction: CandidateTransaction) -> Self {
        Self {
            transaction,
            signatures: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.transaction.id
    }

    /// Sign with a locally held key.
    ///
    /// # Errors
    /// `PolicyViolation` if the key is not a required signatory.
    pub fn sign_with(&mut self, key: &SigningKey) -> Result<()> {
        let signature = TransactionSignature::sign(key, &self.transaction.id);
        self.add_signature(signature)
    }

    /// Attach a signature after checking it. Duplicate signers are ignored.
    ///
    /// # Errors
    /// - `PolicyViolation` if the signer is not a required signatory
    /// - `SignatureInvalid` if the signature does not verify
    pub fn add_signature(&mut self, signature: TransactionSignature) -> Result<()> {
        if !self.transaction.signatories.contains(&signature.by) {
            return Err(LedgerError::PolicyViolation {
                reason: format!("{} is not a signatory of {}", signature.by, self.transaction.id),
            });
        }
        signature.verify(&self.transaction.id)?;
        if !self.signatures.iter().any(|s| s.by == signature.by) {
            self.signatures.push(signature);
        }
        Ok(())
    }

    #[must_use]
    pub fn signed_keys(&self) -> BTreeSet<LedgerKey> {
        self.signatures.iter().map(|s| s.by).collect()
    }

    #[must_use]
    pub fn missing_signatories(&self) -> Vec<LedgerKey> {
        let signed = self.signed_keys();
        self.transaction
            .signatories
            .iter()
            .filter(|k| !signed.contains(k))
            .copied()
            .collect()
    }

    /// Every signatory has signed and every signature verifies.
    ///
    /// # Errors
    /// `MissingSignature` or `SignatureInvalid`.
    pub fn verify_signatures(&self) -> Result<()> {
        if let Some(missing) = self.missing_signatories().first() {
            return Err(LedgerError::MissingSignature(*missing));
        }
        for signature in &self.signatures {
            signature.verify(&self.transaction.id)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NotarisedTransaction
// ---------------------------------------------------------------------------

/// A transaction the ordering authority accepted. **Irreversible.**
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotarisedTransaction {
    pub signed: SignedTransaction,
    /// Position in the notary's global order.
    pub sequence: u64,
    pub notary_signature: TransactionSignature,
    pub notarised_at: DateTime<Utc>,
}

impl NotarisedTransaction {
    /// Payload the notary signs: `"tokenflow:notary:v1:" || tx_id || sequence`.
    #[must_use]
    pub fn notary_payload(id: &TransactionId, sequence: u64) -> Vec<u8> {
        let mut payload = Vec::with_capacity(60);
        payload.extend_from_slice(b"tokenflow:notary:v1:");
        payload.extend_from_slice(&id.0);
        payload.extend_from_slice(&sequence.to_le_bytes());
        payload
    }

    /// Stamp a signed transaction.
    #[must_use]
    pub fn stamp(signed: SignedTransaction, sequence: u64, notary_key: &SigningKey) -> Self {
        let payload = Self::notary_payload(&signed.transaction.id, sequence);
        Self {
            notary_signature: TransactionSignature::sign_payload(notary_key, &payload),
            signed,
            sequence,
            notarised_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.signed.transaction.id
    }

    #[must_use]
    pub fn transaction(&self) -> &CandidateTransaction {
        &self.signed.transaction
    }

    /// Check that `notary` stamped this transaction and that the content
    /// is intact.
    ///
    /// # Errors
    /// `TransactionIdMismatch`, `PolicyViolation` (wrong notary) or
    /// `SignatureInvalid`.
    pub fn verify_notary(&self, notary: NotaryId) -> Result<()> {
        self.signed.transaction.verify_id()?;
        if self.signed.transaction.notary != notary || self.notary_signature.by != notary.ledger_key() {
            return Err(LedgerError::PolicyViolation {
                reason: format!("{} was not notarised by {notary}", self.id()),
            });
        }
        self.notary_signature
            .verify_payload(&Self::notary_payload(&self.id(), self.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountHash, PartyId};
    use uuid::Uuid;

    fn key() -> SigningKey {
        SigningKey::generate(&mut rand::rngs::OsRng)
    }

    fn usd(amount: i64, owning_key: LedgerKey) -> TokenRecord {
        let mut t = TokenRecord::dummy("USD", Decimal::new(amount, 0), AccountHash([1; 32]), AccountHash([2; 32]));
        t.owning_key = owning_key;
        t
    }

    fn candidate(
        command: Command,
        inputs: Vec<StateAndRef>,
        outputs: Vec<OutputState>,
        signatories: &[LedgerKey],
    ) -> CandidateTransaction {
        let mut tx = CandidateTransaction {
            id: TransactionId([0; 32]),
            inputs,
            outputs,
            command,
            signatories: signatories.iter().copied().collect(),
            valid_until: Utc::now() + chrono::Duration::hours(24),
            notary: PartyId([9; 32]),
            salt: [0; 16],
        };
        tx.id = tx.compute_id();
        tx
    }

    #[test]
    fn id_commits_to_content() {
        let k = LedgerKey([5; 32]);
        let mut tx = candidate(
            Command::Issue { amount: Decimal::new(100, 0) },
            vec![],
            vec![OutputState::Token(usd(100, k))],
            &[k],
        );
        assert!(tx.verify_id().is_ok());
        tx.outputs = vec![OutputState::Token(usd(1000, k))];
        assert!(matches!(tx.verify_id(), Err(LedgerError::TransactionIdMismatch)));
    }

    #[test]
    fn salt_distinguishes_identical_content() {
        let k = LedgerKey([5; 32]);
        let a = candidate(
            Command::Issue { amount: Decimal::new(1, 0) },
            vec![],
            vec![OutputState::Token(usd(1, k))],
            &[k],
        );
        let mut b = a.clone();
        b.salt = [1; 16];
        assert_ne!(a.compute_id(), b.compute_id());
    }

    #[test]
    fn issue_conservation() {
        let k = LedgerKey([5; 32]);
        let ok = candidate(
            Command::Issue { amount: Decimal::new(100, 0) },
            vec![],
            vec![OutputState::Token(usd(60, k)), OutputState::Token(usd(40, k))],
            &[k],
        );
        assert!(ok.check_conservation().is_ok());

        let bad = candidate(
            Command::Issue { amount: Decimal::new(100, 0) },
            vec![],
            vec![OutputState::Token(usd(99, k))],
            &[k],
        );
        assert!(matches!(
            bad.check_conservation(),
            Err(LedgerError::ConservationViolation { .. })
        ));
    }

    #[test]
    fn issue_with_inputs_rejected() {
        let k = LedgerKey([5; 32]);
        let tx = candidate(
            Command::Issue { amount: Decimal::new(10, 0) },
            vec![StateAndRef::dummy(usd(10, k))],
            vec![OutputState::Token(usd(10, k))],
            &[k],
        );
        assert!(tx.check_conservation().is_err());
    }

    #[test]
    fn redeem_conservation_counts_destroyed_value() {
        let k = LedgerKey([5; 32]);
        let ok = candidate(
            Command::Redeem { amount: Decimal::new(40, 0) },
            vec![StateAndRef::dummy(usd(100, k))],
            vec![OutputState::Token(usd(60, k))],
            &[k],
        );
        assert!(ok.check_conservation().is_ok());

        let bad = candidate(
            Command::Redeem { amount: Decimal::new(40, 0) },
            vec![StateAndRef::dummy(usd(100, k))],
            vec![OutputState::Token(usd(70, k))],
            &[k],
        );
        assert!(bad.check_conservation().is_err());
    }

    #[test]
    fn transfer_must_balance_per_group() {
        let k = LedgerKey([5; 32]);
        let mut other_group = usd(50, k);
        other_group.issuer = AccountHash([7; 32]);

        let bad = candidate(
            Command::Transfer,
            vec![StateAndRef::dummy(usd(50, k))],
            vec![OutputState::Token(other_group)],
            &[k],
        );
        assert!(bad.check_conservation().is_err());

        let ok = candidate(
            Command::Transfer,
            vec![StateAndRef::dummy(usd(30, k)), StateAndRef::dummy(usd(20, k))],
            vec![OutputState::Token(usd(45, k)), OutputState::Token(usd(5, k))],
            &[k],
        );
        assert!(ok.check_conservation().is_ok());
    }

    #[test]
    fn overflowing_totals_are_rejected_not_panicked() {
        let k = LedgerKey([5; 32]);
        let mut huge = usd(1, k);
        huge.amount = Decimal::MAX;

        let transfer = candidate(
            Command::Transfer,
            vec![StateAndRef::dummy(huge.clone()), StateAndRef::dummy(huge.clone())],
            vec![OutputState::Token(huge.clone())],
            &[k],
        );
        assert!(matches!(
            transfer.check_conservation(),
            Err(LedgerError::InvalidAmount { ref reason }) if reason.contains("overflow")
        ));

        let redeem = candidate(
            Command::Redeem { amount: Decimal::MAX },
            vec![StateAndRef::dummy(huge.clone())],
            vec![OutputState::Token(usd(1, k))],
            &[k],
        );
        assert!(matches!(redeem.check_conservation(), Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn zero_amount_outputs_rejected() {
        let k = LedgerKey([5; 32]);
        let tx = candidate(
            Command::Transfer,
            vec![StateAndRef::dummy(usd(10, k))],
            vec![OutputState::Token(usd(10, k)), OutputState::Token(usd(0, k))],
            &[k],
        );
        assert!(matches!(
            tx.check_conservation(),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn create_account_shape() {
        let k = LedgerKey([5; 32]);
        let account = Account::new(Uuid::new_v4(), None, k);
        let ok = candidate(Command::CreateAccount, vec![], vec![OutputState::Account(account)], &[k]);
        assert!(ok.check_conservation().is_ok());
        let empty = candidate(Command::CreateAccount, vec![], vec![], &[k]);
        assert!(empty.check_conservation().is_err());
    }

    #[test]
    fn signatures_collect_and_verify() {
        let alice = key();
        let bob = key();
        let ka = LedgerKey::from(&alice.verifying_key());
        let kb = LedgerKey::from(&bob.verifying_key());
        let tx = candidate(
            Command::Redeem { amount: Decimal::new(10, 0) },
            vec![StateAndRef::dummy(usd(10, ka))],
            vec![],
            &[ka, kb],
        );
        let mut signed = SignedTransaction::new(tx);
        signed.sign_with(&alice).unwrap();
        assert_eq!(signed.missing_signatories(), vec![kb]);
        assert!(matches!(
            signed.verify_signatures(),
            Err(LedgerError::MissingSignature(k)) if k == kb
        ));

        signed.sign_with(&bob).unwrap();
        signed.sign_with(&bob).unwrap();
        assert_eq!(signed.signatures.len(), 2);
        assert!(signed.verify_signatures().is_ok());
    }

    #[test]
    fn non_signatory_cannot_sign() {
        let alice = key();
        let mallory = key();
        let ka = LedgerKey::from(&alice.verifying_key());
        let tx = candidate(
            Command::Issue { amount: Decimal::new(1, 0) },
            vec![],
            vec![OutputState::Token(usd(1, ka))],
            &[ka],
        );
        let mut signed = SignedTransaction::new(tx);
        let err = signed.sign_with(&mallory).unwrap_err();
        assert!(matches!(err, LedgerError::PolicyViolation { .. }));
    }

    #[test]
    fn forged_signature_rejected() {
        let alice = key();
        let ka = LedgerKey::from(&alice.verifying_key());
        let tx = candidate(
            Command::Issue { amount: Decimal::new(1, 0) },
            vec![],
            vec![OutputState::Token(usd(1, ka))],
            &[ka],
        );
        let mut signed = SignedTransaction::new(tx);
        let mut sig = TransactionSignature::sign(&alice, &signed.id());
        sig.signature[0] ^= 0xff;
        assert!(matches!(
            signed.add_signature(sig),
            Err(LedgerError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn notary_stamp_verifies_only_for_that_notary() {
        let notary = key();
        let notary_id = PartyId::from(LedgerKey::from(&notary.verifying_key()));
        let alice = key();
        let ka = LedgerKey::from(&alice.verifying_key());
        let mut tx = candidate(
            Command::Issue { amount: Decimal::new(1, 0) },
            vec![],
            vec![OutputState::Token(usd(1, ka))],
            &[ka],
        );
        tx.notary = notary_id;
        tx.id = tx.compute_id();
        let mut signed = SignedTransaction::new(tx);
        signed.sign_with(&alice).unwrap();

        let stamped = NotarisedTransaction::stamp(signed, 7, &notary);
        assert!(stamped.verify_notary(notary_id).is_ok());
        assert!(stamped.verify_notary(PartyId([1; 32])).is_err());

        let mut replayed = stamped.clone();
        replayed.sequence = 8;
        assert!(replayed.verify_notary(notary_id).is_err());
    }
}
