//! A party: one node hosting accounts and token records.
//!
//! [`Party::start`] registers the party on the bus and spawns a listener
//! that runs a responder task for every session opened to it. Client entry
//! points live in [`crate::flows`].

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use ed25519_dalek::SigningKey;
use tokenflow_types::{LedgerConfig, LedgerError, LedgerKey, PartyId, Result};
use tokenflow_vault::{AccountRegistry, BalanceQuery, ClaimCoordinator, TokenVault};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    history::TransactionLog,
    notary::NotaryHandle,
    responder::{self, ResponderOutcome},
    session::{MessageBus, Session},
    validator::ValidatorRegistry,
};

/// Everything a flow running on behalf of a party needs.
#[derive(Debug)]
pub struct PartyContext {
    pub(crate) signing_key: SigningKey,
    pub(crate) id: PartyId,
    pub(crate) bus: MessageBus,
    pub(crate) notary: NotaryHandle,
    pub(crate) validators: Arc<ValidatorRegistry>,
    pub(crate) config: LedgerConfig,
    pub(crate) vault: Arc<TokenVault>,
    pub(crate) accounts: Arc<AccountRegistry>,
    pub(crate) claims: ClaimCoordinator,
    pub(crate) balances: BalanceQuery,
    pub(crate) log: Arc<TransactionLog>,
    /// Oldest first, at most `config.responder_history` long.
    pub(crate) responder_outcomes: Mutex<VecDeque<ResponderOutcome>>,
}

impl PartyContext {
    pub(crate) fn ledger_key(&self) -> LedgerKey {
        self.id.ledger_key()
    }

    fn record_outcome(&self, outcome: ResponderOutcome) {
        if let Ok(mut outcomes) = self.responder_outcomes.lock() {
            while outcomes.len() >= self.config.responder_history.max(1) {
                outcomes.pop_front();
            }
            outcomes.push_back(outcome);
        }
    }
}

/// Handle to a running party. Dropping it stops the responder listener.
#[derive(Debug)]
pub struct Party {
    pub(crate) ctx: Arc<PartyContext>,
    listener: JoinHandle<()>,
}

impl Party {
    /// Register on the bus and start answering sessions.
    ///
    /// # Errors
    /// `Configuration` if `config` is invalid.
    pub fn start(
        signing_key: SigningKey,
        bus: MessageBus,
        notary: NotaryHandle,
        validators: Arc<ValidatorRegistry>,
        config: LedgerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let id = PartyId::from(LedgerKey::from(&signing_key.verifying_key()));
        let vault = Arc::new(TokenVault::new());
        let inbox = bus.register(id)?;
        let ctx = Arc::new(PartyContext {
            signing_key,
            id,
            bus,
            notary,
            validators,
            config,
            claims: ClaimCoordinator::new(Arc::clone(&vault)),
            balances: BalanceQuery::new(Arc::clone(&vault)),
            vault,
            accounts: Arc::new(AccountRegistry::new()),
            log: Arc::new(TransactionLog::new()),
            responder_outcomes: Mutex::new(VecDeque::new()),
        });
        let listener = tokio::spawn(listen(Arc::clone(&ctx), inbox));
        info!(party = %id, "Party started");
        Ok(Self { ctx, listener })
    }

    #[must_use]
    pub fn id(&self) -> PartyId {
        self.ctx.id
    }

    #[must_use]
    pub fn ledger_key(&self) -> LedgerKey {
        self.ctx.ledger_key()
    }

    #[must_use]
    pub fn vault(&self) -> &Arc<TokenVault> {
        &self.ctx.vault
    }

    #[must_use]
    pub fn accounts(&self) -> &Arc<AccountRegistry> {
        &self.ctx.accounts
    }

    #[must_use]
    pub fn balances(&self) -> &BalanceQuery {
        &self.ctx.balances
    }

    #[must_use]
    pub fn claims(&self) -> &ClaimCoordinator {
        &self.ctx.claims
    }

    #[must_use]
    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.ctx.log
    }

    #[must_use]
    pub fn notary(&self) -> &NotaryHandle {
        &self.ctx.notary
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.ctx.config
    }

    /// Outcomes of the most recent responder runs, oldest first. Only the
    /// last `responder_history` are kept.
    pub fn responder_outcomes(&self) -> Result<Vec<ResponderOutcome>> {
        self.ctx
            .responder_outcomes
            .lock()
            .map(|outcomes| outcomes.iter().cloned().collect())
            .map_err(|_| LedgerError::Internal("responder outcome lock poisoned".to_string()))
    }

    /// Take every kept responder outcome, leaving the history empty.
    pub fn drain_responder_outcomes(&self) -> Result<Vec<ResponderOutcome>> {
        self.ctx
            .responder_outcomes
            .lock()
            .map(|mut outcomes| outcomes.drain(..).collect())
            .map_err(|_| LedgerError::Internal("responder outcome lock poisoned".to_string()))
    }
}

impl Drop for Party {
    fn drop(&mut self) {
        self.listener.abort();
        let _ = self.ctx.bus.unregister(self.ctx.id);
    }
}

async fn listen(ctx: Arc<PartyContext>, mut inbox: mpsc::UnboundedReceiver<Session>) {
    while let Some(session) = inbox.recv().await {
        debug!(party = %ctx.id, session = %session.id(), from = %session.peer(), "Incoming session");
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let outcome = responder::respond(&ctx, session).await;
            ctx.record_outcome(outcome);
        });
    }
    debug!(party = %ctx.id, "Listener stopped (bus closed)");
}
