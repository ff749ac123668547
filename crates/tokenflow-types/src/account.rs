//! Account identity records.
//!
//! An account is created once by a `CreateAccount` transaction and is
//! immutable afterwards. Token records never embed the account itself,
//! only its [`AccountHash`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountHash, LedgerError, LedgerKey, PartyId, Result};

/// An account hosted by exactly one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Externally visible identifier, as used in client requests.
    pub identifier: Uuid,
    /// Free-form label supplied at creation.
    pub metadata: Option<String>,
    /// SHA-256 of `identifier`; the stable key token records reference.
    pub account_hash: AccountHash,
    /// The single key that controls this account.
    pub owning_key: LedgerKey,
}

impl Account {
    /// Create an account, deriving its hash from the identifier.
    #[must_use]
    pub fn new(identifier: Uuid, metadata: Option<String>, owning_key: LedgerKey) -> Self {
        Self {
            identifier,
            metadata,
            account_hash: AccountHash::of(&identifier),
            owning_key,
        }
    }

    /// The party hosting this account.
    #[must_use]
    pub fn host(&self) -> PartyId {
        PartyId::from(self.owning_key)
    }

    /// Check that `account_hash` derives from `identifier`.
    ///
    /// # Errors
    /// Returns `InvalidAccount` on mismatch.
    pub fn verify_hash(&self) -> Result<()> {
        if AccountHash::of(&self.identifier) != self.account_hash {
            return Err(LedgerError::InvalidAccount {
                reason: format!(
                    "account {} carries hash {} that does not derive from its identifier",
                    self.identifier, self.account_hash
                ),
            });
        }
        Ok(())
    }

    /// Canonical bytes committed to by transaction ids.
    pub(crate) fn canonical_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"account:");
        out.extend_from_slice(self.identifier.as_bytes());
        match &self.metadata {
            Some(meta) => {
                out.push(1);
                out.extend_from_slice(&(meta.len() as u64).to_le_bytes());
                out.extend_from_slice(meta.as_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.account_hash.0);
        out.extend_from_slice(&self.owning_key.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_hash() {
        let id = Uuid::new_v4();
        let account = Account::new(id, Some("issuer".into()), LedgerKey([1; 32]));
        assert_eq!(account.account_hash, AccountHash::of(&id));
        assert!(account.verify_hash().is_ok());
        assert_eq!(account.host(), PartyId([1; 32]));
    }

    #[test]
    fn tampered_hash_rejected() {
        let mut account = Account::new(Uuid::new_v4(), None, LedgerKey([1; 32]));
        account.account_hash = AccountHash([9; 32]);
        let err = account.verify_hash().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAccount { .. }));
    }

    #[test]
    fn canonical_bytes_distinguish_metadata() {
        let id = Uuid::new_v4();
        let a = Account::new(id, None, LedgerKey([1; 32]));
        let b = Account::new(id, Some(String::new()), LedgerKey([1; 32]));
        let (mut ba, mut bb) = (Vec::new(), Vec::new());
        a.canonical_bytes(&mut ba);
        b.canonical_bytes(&mut bb);
        assert_ne!(ba, bb);
    }

    #[test]
    fn serde_roundtrip() {
        let account = Account::new(Uuid::new_v4(), Some("owner".into()), LedgerKey([3; 32]));
        let json = serde_json::to_string(&account).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(account, back);
    }
}
