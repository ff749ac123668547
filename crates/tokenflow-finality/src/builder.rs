//! Transaction builder.
//!
//! Pure assembly: no I/O, no locking. Inputs are records the caller has
//! already claimed; outputs include any change the caller computed from
//! [`Claim::change`](tokenflow_types::Claim::change).

use std::{collections::BTreeSet, time::Duration};

use chrono::{DateTime, Utc};
use tokenflow_types::{
    Account, CandidateTransaction, Command, LedgerConfig, LedgerError, LedgerKey, NotaryId,
    OutputState, Result, StateAndRef, TokenRecord, TransactionId, constants, deadline_after,
};

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Option<NotaryId>,
    command: Option<Command>,
    inputs: Vec<StateAndRef>,
    outputs: Vec<OutputState>,
    signatories: BTreeSet<LedgerKey>,
    validity_horizon: Duration,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            notary: None,
            command: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            signatories: BTreeSet::new(),
            validity_horizon: Duration::from_millis(constants::DEFAULT_VALIDITY_HORIZON_MS),
        }
    }

    /// Builder preloaded with the configured validity horizon.
    #[must_use]
    pub fn with_config(config: &LedgerConfig) -> Self {
        Self::new().validity_horizon(config.validity_horizon)
    }

    #[must_use]
    pub fn notary(mut self, notary: NotaryId) -> Self {
        self.notary = Some(notary);
        self
    }

    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    #[must_use]
    pub fn add_input(mut self, input: StateAndRef) -> Self {
        self.inputs.push(input);
        self
    }

    #[must_use]
    pub fn add_inputs(mut self, inputs: impl IntoIterator<Item = StateAndRef>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    #[must_use]
    pub fn add_output(mut self, output: OutputState) -> Self {
        self.outputs.push(output);
        self
    }

    #[must_use]
    pub fn add_token_output(self, token: TokenRecord) -> Self {
        self.add_output(OutputState::Token(token))
    }

    #[must_use]
    pub fn add_account_output(self, account: Account) -> Self {
        self.add_output(OutputState::Account(account))
    }

    #[must_use]
    pub fn add_signatory(mut self, key: LedgerKey) -> Self {
        self.signatories.insert(key);
        self
    }

    #[must_use]
    pub fn add_signatories(mut self, keys: impl IntoIterator<Item = LedgerKey>) -> Self {
        self.signatories.extend(keys);
        self
    }

    #[must_use]
    pub fn validity_horizon(mut self, horizon: Duration) -> Self {
        self.validity_horizon = horizon;
        self
    }

    pub fn build(self) -> Result<CandidateTransaction> {
        self.build_at(Utc::now())
    }

    /// Assemble the transaction with `valid_until = now + horizon`.
    ///
    /// # Errors
    /// - `IncompleteTransaction` if the command or notary is missing, or an
    ///   input appears twice
    /// - `EmptySignatories` if no signatory was added
    /// - `ConservationViolation` / `InvalidAmount` if value does not balance
    /// - `Configuration` if the horizon pushes `valid_until` out of range
    pub fn build_at(self, now: DateTime<Utc>) -> Result<CandidateTransaction> {
        let command = self.command.ok_or_else(|| LedgerError::IncompleteTransaction {
            reason: "no command".to_string(),
        })?;
        let notary = self.notary.ok_or_else(|| LedgerError::IncompleteTransaction {
            reason: "no notary".to_string(),
        })?;
        if self.signatories.is_empty() {
            return Err(LedgerError::EmptySignatories);
        }
        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(input.reference) {
                return Err(LedgerError::IncompleteTransaction {
                    reason: format!("input {} listed twice", input.reference),
                });
            }
        }

        let valid_until = deadline_after(now, self.validity_horizon)?;
        let mut tx = CandidateTransaction {
            id: TransactionId([0; 32]),
            inputs: self.inputs,
            outputs: self.outputs,
            command,
            signatories: self.signatories,
            valid_until,
            notary,
            salt: rand::random(),
        };
        tx.check_conservation()?;
        tx.id = tx.compute_id();
        Ok(tx)
    }
}
