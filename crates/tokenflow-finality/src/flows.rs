//! Client entry points.
//!
//! Every entry point resolves accounts locally, enforces the hosting rule,
//! builds a candidate and hands it to the initiator. None of them return an
//! error: failures are folded into a [`FlowResponse`].

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tokenflow_types::{
    Account, CandidateTransaction, ClaimId, Command, CreateAccountRequest, FlowResponse,
    FungibilityGroup, GetBalanceRequest, IssueTokenRequest, LedgerError, NotarisedTransaction,
    PartyId, RedeemTokenRequest, Result, StateAndRef, TokenRecord, TransferTokenRequest,
};
use tokenflow_vault::ClaimCriteria;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{builder::TransactionBuilder, initiator, party::Party};

fn require_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            reason: format!("amount must be positive, got {amount}"),
        });
    }
    Ok(())
}

fn require_hosted(account: &Account, party: PartyId, role: &str) -> Result<()> {
    if account.host() != party {
        return Err(LedgerError::PolicyViolation {
            reason: format!("{role} Account should be hosted on initiator node."),
        });
    }
    Ok(())
}

fn failed(flow: &str, err: &LedgerError) -> FlowResponse {
    warn!(flow, error = %err, kind = ?err.kind(), "Flow failed");
    FlowResponse::from_error(err)
}

impl Party {
    /// Create an account controlled by this party's key. The account is
    /// also recorded by `share_with`, if given.
    pub async fn create_account(&self, request: CreateAccountRequest) -> FlowResponse {
        let identifier = Uuid::new_v4();
        let metadata = request.metadata.clone().unwrap_or_default();
        match self.try_create_account(identifier, request).await {
            Ok(notarised) => {
                info!(party = %self.id(), account = %identifier, tx_id = %notarised.id(), "Account created");
                FlowResponse::success(
                    format!("Account Has Been Successfully Created With id:{identifier}, metadata: {metadata}"),
                    Some(notarised.id()),
                )
                .with_account(identifier)
            }
            Err(e) => failed("create_account", &e),
        }
    }

    async fn try_create_account(
        &self,
        identifier: Uuid,
        request: CreateAccountRequest,
    ) -> Result<NotarisedTransaction> {
        let ctx = &self.ctx;
        let mut counterparties = BTreeSet::new();
        if let Some(peer) = request.share_with.filter(|&p| p != ctx.id) {
            if !ctx.bus.is_registered(peer)? {
                return Err(LedgerError::UnknownParty(peer));
            }
            counterparties.insert(peer);
        }
        let account = Account::new(identifier, request.metadata, ctx.ledger_key());
        let candidate = TransactionBuilder::with_config(&ctx.config)
            .notary(ctx.notary.id())
            .command(Command::CreateAccount)
            .add_account_output(account)
            .add_signatory(ctx.ledger_key())
            .build()?;
        initiator::finalize(ctx, candidate, &counterparties, None).await
    }

    /// Issue new tokens from a locally hosted issuer account to `owner_id`.
    pub async fn issue_token(&self, request: IssueTokenRequest) -> FlowResponse {
        match self.try_issue(&request).await {
            Ok((notarised, token)) => FlowResponse::success(
                format!(
                    "Successfully Issued New Token(symbol:{}, amount:{}) To {}",
                    token.symbol, token.amount, request.owner_id
                ),
                Some(notarised.id()),
            ),
            Err(e) => failed("issue_token", &e),
        }
    }

    async fn try_issue(&self, request: &IssueTokenRequest) -> Result<(NotarisedTransaction, TokenRecord)> {
        let ctx = &self.ctx;
        require_positive(request.amount)?;
        let issuer = ctx.accounts.find(&request.issuer_id)?;
        let owner = ctx.accounts.find(&request.owner_id)?;
        require_hosted(&issuer, ctx.id, "Issuer")?;

        let token = TokenRecord {
            symbol: request.symbol.clone(),
            amount: request.amount,
            tag: request.owner_id.to_string(),
            issuer: issuer.account_hash,
            owner: owner.account_hash,
            owning_key: owner.owning_key,
            issuer_key: issuer.owning_key,
        };
        let candidate = TransactionBuilder::with_config(&ctx.config)
            .notary(ctx.notary.id())
            .command(Command::Issue {
                amount: request.amount,
            })
            .add_token_output(token.clone())
            .add_signatory(issuer.owning_key)
            .build()?;
        let counterparties = BTreeSet::from([owner.host()]);
        let notarised = initiator::finalize(ctx, candidate, &counterparties, None).await?;
        Ok((notarised, token))
    }

    /// Destroy `amount` of a locally hosted owner's tokens. The issuer's
    /// host countersigns.
    pub async fn redeem_token(&self, request: RedeemTokenRequest) -> FlowResponse {
        match self.try_redeem(&request).await {
            Ok(notarised) => FlowResponse::success(
                format!("Successfully Redeemed {}{}", request.amount, request.symbol),
                Some(notarised.id()),
            ),
            Err(LedgerError::InsufficientBalance { needed, available }) => {
                info!(owner = %request.owner_id, %needed, %available, "Redeem refused: insufficient balance");
                FlowResponse::insufficient_balance()
            }
            Err(e) => failed("redeem_token", &e),
        }
    }

    async fn try_redeem(&self, request: &RedeemTokenRequest) -> Result<NotarisedTransaction> {
        let ctx = &self.ctx;
        require_positive(request.amount)?;
        let owner = ctx.accounts.find(&request.owner_id)?;
        let issuer = ctx.accounts.find(&request.issuer_id)?;
        require_hosted(&owner, ctx.id, "Owner")?;

        let spend = Spend::claim(self, &owner, &issuer, &request.symbol, request.amount)?;
        let builder = TransactionBuilder::with_config(&ctx.config)
            .notary(ctx.notary.id())
            .command(Command::Redeem {
                amount: request.amount,
            })
            .add_signatories([owner.owning_key, issuer.owning_key]);
        let candidate = spend.build(self, builder)?;
        let counterparties = BTreeSet::from([issuer.host()]);
        initiator::finalize(ctx, candidate, &counterparties, Some(spend.claim_id)).await
    }

    /// Move `amount` from a locally hosted owner to `recipient_id`.
    pub async fn transfer_token(&self, request: TransferTokenRequest) -> FlowResponse {
        match self.try_transfer(&request).await {
            Ok(notarised) => FlowResponse::success(
                format!(
                    "Successfully Transferred {}{} To {}",
                    request.amount, request.symbol, request.recipient_id
                ),
                Some(notarised.id()),
            ),
            Err(LedgerError::InsufficientBalance { .. }) => FlowResponse::insufficient_balance(),
            Err(e) => failed("transfer_token", &e),
        }
    }

    async fn try_transfer(&self, request: &TransferTokenRequest) -> Result<NotarisedTransaction> {
        let ctx = &self.ctx;
        require_positive(request.amount)?;
        let owner = ctx.accounts.find(&request.owner_id)?;
        let issuer = ctx.accounts.find(&request.issuer_id)?;
        let recipient = ctx.accounts.find(&request.recipient_id)?;
        require_hosted(&owner, ctx.id, "Owner")?;

        let spend = Spend::claim(self, &owner, &issuer, &request.symbol, request.amount)?;
        let builder = TransactionBuilder::with_config(&ctx.config)
            .notary(ctx.notary.id())
            .command(Command::Transfer)
            .add_token_output(TokenRecord {
                symbol: request.symbol.clone(),
                amount: request.amount,
                tag: request.recipient_id.to_string(),
                issuer: issuer.account_hash,
                owner: recipient.account_hash,
                owning_key: recipient.owning_key,
                issuer_key: issuer.owning_key,
            })
            .add_signatory(owner.owning_key);
        let candidate = spend.build(self, builder)?;
        let counterparties = BTreeSet::from([recipient.host()]);
        initiator::finalize(ctx, candidate, &counterparties, Some(spend.claim_id)).await
    }

    /// Report the available balance of `owner_id` in one fungibility group.
    pub async fn get_balance(&self, request: GetBalanceRequest) -> FlowResponse {
        match self.balance_of(&request) {
            Ok(balance) => FlowResponse::success(
                format!("Token balance of {} is {balance}{}", request.owner_id, request.symbol),
                None,
            ),
            Err(e) => failed("get_balance", &e),
        }
    }

    /// Available (unspent, unclaimed) balance for a balance request.
    pub fn balance_of(&self, request: &GetBalanceRequest) -> Result<Decimal> {
        let owner = self.ctx.accounts.find(&request.owner_id)?;
        let issuer = self.ctx.accounts.find(&request.issuer_id)?;
        let group = FungibilityGroup::new(request.symbol.clone(), issuer.account_hash);
        self.ctx.balances.query_balance(&group, &owner.account_hash)
    }
}

/// Records claimed for a spend, plus what is left to return as change.
struct Spend {
    claim_id: ClaimId,
    inputs: Vec<StateAndRef>,
    change: Option<TokenRecord>,
}

impl Spend {
    fn claim(party: &Party, owner: &Account, issuer: &Account, symbol: &str, amount: Decimal) -> Result<Self> {
        let ctx = &party.ctx;
        let group = FungibilityGroup::new(symbol, issuer.account_hash);
        let criteria = ClaimCriteria::new(group.clone(), owner.account_hash, amount)
            .with_tag(owner.identifier.to_string());
        let Some(claim) = ctx.claims.try_claim(&criteria, ctx.config.claim_ttl)? else {
            let available = ctx.balances.query_balance(&group, &owner.account_hash)?;
            return Err(LedgerError::InsufficientBalance {
                needed: amount,
                available,
            });
        };
        let change = claim.change();
        Ok(Self {
            claim_id: claim.id,
            inputs: claim.records,
            change: (change > Decimal::ZERO).then(|| TokenRecord {
                symbol: symbol.to_string(),
                amount: change,
                tag: owner.identifier.to_string(),
                issuer: issuer.account_hash,
                owner: owner.account_hash,
                owning_key: owner.owning_key,
                issuer_key: issuer.owning_key,
            }),
        })
    }

    /// Add inputs and change, then build. Releases the claim on failure.
    fn build(
        &self,
        party: &Party,
        builder: TransactionBuilder,
    ) -> Result<CandidateTransaction> {
        let mut builder = builder.add_inputs(self.inputs.iter().cloned());
        if let Some(change) = &self.change {
            builder = builder.add_token_output(change.clone());
        }
        builder.build().inspect_err(|_| {
            if let Err(e) = party.ctx.claims.release(self.claim_id) {
                warn!(claim_id = %self.claim_id, error = %e, "Could not release claim after build failure");
            }
        })
    }
}
