//! Local account registry.
//!
//! Holds every account this party has recorded, either because it hosts
//! the account or because the account was shared with it. Lookups by
//! identifier and by hash; a miss is an ordinary `AccountNotFound`.

use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tokenflow_types::{Account, AccountHash, LedgerError, PartyId, Result};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<Uuid, Account>,
    by_hash: HashMap<AccountHash, Uuid>,
}

#[derive(Debug, Default)]
pub struct AccountRegistry {
    inner: RwLock<Accounts>,
}

impl AccountRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an account. Returns `false` if it was already known.
    ///
    /// # Errors
    /// `InvalidAccount` if the hash does not derive from the identifier.
    pub fn record(&self, account: Account) -> Result<bool> {
        account.verify_hash()?;
        let mut accounts = self.write()?;
        if accounts.by_id.contains_key(&account.identifier) {
            return Ok(false);
        }
        debug!(
            account_id = %account.identifier,
            account_hash = %account.account_hash,
            host = %account.host(),
            "Recorded account"
        );
        accounts.by_hash.insert(account.account_hash, account.identifier);
        accounts.by_id.insert(account.identifier, account);
        Ok(true)
    }

    /// # Errors
    /// `AccountNotFound` if no such account is recorded.
    pub fn find(&self, identifier: &Uuid) -> Result<Account> {
        self.read()?
            .by_id
            .get(identifier)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(identifier.to_string()))
    }

    /// # Errors
    /// `AccountNotFound` if no such account is recorded.
    pub fn find_by_hash(&self, hash: &AccountHash) -> Result<Account> {
        let accounts = self.read()?;
        accounts
            .by_hash
            .get(hash)
            .and_then(|id| accounts.by_id.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(hash.to_string()))
    }

    /// Accounts hosted by `party`.
    pub fn hosted_by(&self, party: PartyId) -> Result<Vec<Account>> {
        Ok(self
            .read()?
            .by_id
            .values()
            .filter(|a| a.host() == party)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.by_id.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.by_id.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Accounts>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::Internal("account registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Accounts>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::Internal("account registry lock poisoned".to_string()))
    }
}
