//! Append-only log of transactions a party has seen finalized.
//!
//! Responders append asynchronously, so callers that need to observe a
//! counterparty's view wait on [`TransactionLog::await_transaction`].

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokenflow_types::{LedgerError, NotarisedTransaction, Result, TransactionId};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<TransactionId, NotarisedTransaction>,
    /// Ids in the order they were recorded locally.
    order: Vec<TransactionId>,
}

#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Mutex<Entries>,
    appended: Notify,
}

impl TransactionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notarised transaction. Returns `false` if already present.
    pub fn record(&self, notarised: NotarisedTransaction) -> Result<bool> {
        let inserted = {
            let mut entries = self.lock()?;
            let id = notarised.id();
            if entries.by_id.contains_key(&id) {
                false
            } else {
                entries.by_id.insert(id, notarised);
                entries.order.push(id);
                true
            }
        };
        if inserted {
            self.appended.notify_waiters();
        }
        Ok(inserted)
    }

    pub fn get(&self, id: &TransactionId) -> Result<Option<NotarisedTransaction>> {
        Ok(self.lock()?.by_id.get(id).cloned())
    }

    pub fn contains(&self, id: &TransactionId) -> Result<bool> {
        Ok(self.lock()?.by_id.contains_key(id))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.order.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.order.is_empty())
    }

    /// Ids in local recording order.
    pub fn ids(&self) -> Result<Vec<TransactionId>> {
        Ok(self.lock()?.order.clone())
    }

    /// Wait until `id` is recorded.
    ///
    /// # Errors
    /// `Timeout` if it is not recorded within `timeout`.
    pub async fn await_transaction(
        &self,
        id: TransactionId,
        timeout: Duration,
    ) -> Result<NotarisedTransaction> {
        let wait = async {
            loop {
                let appended = self.appended.notified();
                tokio::pin!(appended);
                appended.as_mut().enable();
                match self.get(&id) {
                    Ok(Some(found)) => return Ok(found),
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
                appended.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| LedgerError::Timeout {
                stage: format!("waiting for {id}"),
            })?
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| LedgerError::Internal("transaction log lock poisoned".to_string()))
    }
}
