//! Identifiers and keys used throughout tokenflow.
//!
//! Ephemeral coordination ids (`ClaimId`, `SessionId`) use UUIDv7 for
//! time-ordered sorting. Ledger-visible ids are SHA-256 digests, and
//! party identities are raw ed25519 public keys.

use std::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{LedgerError, Result};

// ---------------------------------------------------------------------------
// LedgerKey
// ---------------------------------------------------------------------------

/// Raw ed25519 public key (32 bytes) that owns state or signs transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerKey(pub [u8; 32]);

impl LedgerKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse into a usable ed25519 verifying key.
    ///
    /// # Errors
    /// Returns `SignatureInvalid` if the bytes are not a valid curve point.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| LedgerError::SignatureInvalid {
            reason: format!("malformed ledger key {self}: {e}"),
        })
    }
}

impl From<&VerifyingKey> for LedgerKey {
    fn from(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// Identity of a party (a node hosting accounts) on the network.
///
/// A party is identified by its ledger key, so the host of an account is
/// simply `PartyId::from(account.owning_key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PartyId(pub [u8; 32]);

impl PartyId {
    #[must_use]
    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey(self.0)
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<LedgerKey> for PartyId {
    fn from(key: LedgerKey) -> Self {
        Self(key.0)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "party:{}", hex::encode(&self.0[..8]))
    }
}

/// The ordering authority is addressed like any other party.
pub type NotaryId = PartyId;

// ---------------------------------------------------------------------------
// AccountHash
// ---------------------------------------------------------------------------

/// Stable 256-bit key other ledger entities use to reference an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountHash(pub [u8; 32]);

impl AccountHash {
    /// Deterministic hash of an account identifier: SHA-256 over the
    /// hyphenated lowercase UUID string.
    #[must_use]
    pub fn of(identifier: &Uuid) -> Self {
        let digest = Sha256::digest(identifier.to_string().as_bytes());
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Self(hash)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for AccountHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA-256:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// TransactionId
// ---------------------------------------------------------------------------

/// SHA-256 over a transaction's canonical payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TransactionId(pub [u8; 32]);

impl TransactionId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// StateRef
// ---------------------------------------------------------------------------

/// Points at one output of a notarised transaction.
///
/// This is the identity of a token record: a record is consumed by
/// referencing its `StateRef` as a transaction input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StateRef {
    pub transaction: TransactionId,
    pub index: u32,
}

impl StateRef {
    #[must_use]
    pub fn new(transaction: TransactionId, index: u32) -> Self {
        Self { transaction, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction, self.index)
    }
}

// ---------------------------------------------------------------------------
// ClaimId
// ---------------------------------------------------------------------------

/// Identifier of a local, time-bounded reservation of unspent records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier of one initiator/responder conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn account_hash_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(AccountHash::of(&id), AccountHash::of(&id));
        assert_ne!(AccountHash::of(&id), AccountHash::of(&Uuid::new_v4()));
    }

    #[test]
    fn account_hash_matches_sha256_of_uuid_string() {
        let id = Uuid::parse_str("df26f856-7437-4b6c-aaa9-3b7bb1810890").unwrap();
        let expected = Sha256::digest(b"df26f856-7437-4b6c-aaa9-3b7bb1810890");
        assert_eq!(AccountHash::of(&id).0.as_slice(), expected.as_slice());
    }

    #[test]
    fn claim_ids_are_v7() {
        let a = ClaimId::new();
        assert_eq!(a.0.get_version_num(), 7);
        assert_ne!(a, ClaimId::new());
    }

    #[test]
    fn ledger_key_roundtrips_through_verifying_key() {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let key = LedgerKey::from(&signing.verifying_key());
        assert_eq!(key.to_verifying_key().unwrap(), signing.verifying_key());
        assert_eq!(PartyId::from(key).ledger_key(), key);
    }

    #[test]
    fn state_ref_display() {
        let r = StateRef::new(TransactionId([0xab; 32]), 3);
        assert_eq!(r.to_string(), "tx:abababababababab:3");
    }

    #[test]
    fn serde_roundtrips() {
        let r = StateRef::new(TransactionId([7; 32]), 1);
        let json = serde_json::to_string(&r).unwrap();
        let back: StateRef = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);

        let claim = ClaimId::new();
        let json = serde_json::to_string(&claim).unwrap();
        let back: ClaimId = serde_json::from_str(&json).unwrap();
        assert_eq!(claim, back);
    }
}
