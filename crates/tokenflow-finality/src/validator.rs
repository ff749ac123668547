//! Contract validators.
//!
//! A validator decides whether a transaction is acceptable for its
//! command. The notary and every responder run the same registry, so a
//! transaction that one honest party accepts, all honest parties accept.
//!
//! Validators are resolved by [`CommandTag`]; an unregistered tag is a
//! rejection.

use std::{collections::HashMap, fmt, sync::Arc};

use tokenflow_types::{
    CandidateTransaction, Command, CommandTag, FungibilityGroup, LedgerKey, TokenRecord,
};

/// Outcome of a validator: `Err` carries a human-readable reason.
pub type Verdict = std::result::Result<(), String>;

pub trait ContractValidator: Send + Sync {
    fn validate(&self, tx: &CandidateTransaction) -> Verdict;
}

impl<F> ContractValidator for F
where
    F: Fn(&CandidateTransaction) -> Verdict + Send + Sync,
{
    fn validate(&self, tx: &CandidateTransaction) -> Verdict {
        self(tx)
    }
}

/// Validators keyed by command tag.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<CommandTag, Arc<dyn ContractValidator>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.validators.keys().collect();
        tags.sort();
        f.debug_struct("ValidatorRegistry").field("tags", &tags).finish()
    }
}

impl ValidatorRegistry {
    /// A registry with no validators; every transaction is rejected.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in rules for all four commands.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(CommandTag::CreateAccount, validate_create_account)
            .with(CommandTag::Issue, validate_issue)
            .with(CommandTag::Transfer, validate_transfer)
            .with(CommandTag::Redeem, validate_redeem)
    }

    /// Register (or replace) the validator for `tag`.
    #[must_use]
    pub fn with(mut self, tag: CommandTag, validator: impl ContractValidator + 'static) -> Self {
        self.validators.insert(tag, Arc::new(validator));
        self
    }

    /// # Errors
    /// The validator's reason, or a rejection if no validator handles the
    /// command.
    pub fn validate(&self, tx: &CandidateTransaction) -> Verdict {
        let tag = tx.command.tag();
        let validator = self
            .validators
            .get(&tag)
            .ok_or_else(|| format!("no contract validator registered for {tag}"))?;
        validator.validate(tx)
    }
}

fn check_common(tx: &CandidateTransaction) -> Verdict {
    tx.check_conservation().map_err(|e| e.to_string())?;
    if tx.signatories.is_empty() {
        return Err("transaction has no signatories".to_string());
    }
    if let Some(key) = tx
        .input_owning_keys()
        .into_iter()
        .find(|k| !tx.signatories.contains(k))
    {
        return Err(format!("owner key {key} of a consumed record must sign"));
    }
    let mut issuer_keys: HashMap<FungibilityGroup, LedgerKey> = HashMap::new();
    for record in records(tx) {
        let expected = issuer_keys.entry(record.group()).or_insert(record.issuer_key);
        if *expected != record.issuer_key {
            return Err(format!("records of {} disagree on the issuer key", record.group()));
        }
    }
    Ok(())
}

fn records(tx: &CandidateTransaction) -> impl Iterator<Item = &TokenRecord> {
    tx.inputs
        .iter()
        .map(|i| &i.record)
        .chain(tx.outputs.iter().filter_map(|o| o.as_token()))
}

fn require_issuer_signatures<'a>(
    tx: &CandidateTransaction,
    mut covered: impl Iterator<Item = &'a TokenRecord>,
) -> Verdict {
    match covered.find(|r| !tx.signatories.contains(&r.issuer_key)) {
        Some(record) => Err(format!("issuer key {} of {} must sign", record.issuer_key, record.group())),
        None => Ok(()),
    }
}

/// The new account is well formed and its owner signs.
pub fn validate_create_account(tx: &CandidateTransaction) -> Verdict {
    check_common(tx)?;
    for account in tx.account_outputs() {
        account.verify_hash().map_err(|e| e.to_string())?;
        if !tx.signatories.contains(&account.owning_key) {
            return Err(format!(
                "account {} must be signed by its owning key",
                account.identifier
            ));
        }
    }
    Ok(())
}

/// Issued records name a symbol, carry a positive amount, and are signed
/// for by their issuer.
pub fn validate_issue(tx: &CandidateTransaction) -> Verdict {
    check_common(tx)?;
    if tx
        .outputs
        .iter()
        .filter_map(|o| o.as_token())
        .any(|t| t.symbol.trim().is_empty())
    {
        return Err("issued token has an empty symbol".to_string());
    }
    require_issuer_signatures(tx, tx.outputs.iter().filter_map(|o| o.as_token()))
}

/// Value moves between owners within each group.
pub fn validate_transfer(tx: &CandidateTransaction) -> Verdict {
    check_common(tx)
}

/// Destroyed value is declared on the command, taken from one group, and
/// countersigned by its issuer.
pub fn validate_redeem(tx: &CandidateTransaction) -> Verdict {
    check_common(tx)?;
    if !matches!(tx.command, Command::Redeem { .. }) {
        return Err("redeem validator applied to another command".to_string());
    }
    require_issuer_signatures(tx, tx.inputs.iter().map(|i| &i.record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokenflow_types::{
        AccountHash, LedgerKey, OutputState, PartyId, StateAndRef, TokenRecord, TransactionId,
    };

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    const ISSUER: LedgerKey = LedgerKey([2; 32]);

    fn owned(amount: i64, key: LedgerKey) -> TokenRecord {
        let mut t = TokenRecord::dummy("USD", dec(amount), AccountHash([1; 32]), AccountHash([2; 32]));
        t.owning_key = key;
        t.issuer_key = ISSUER;
        t
    }

    fn tx(
        command: Command,
        inputs: Vec<StateAndRef>,
        outputs: Vec<TokenRecord>,
        signatories: &[LedgerKey],
    ) -> CandidateTransaction {
        let mut tx = CandidateTransaction {
            id: TransactionId([0; 32]),
            inputs,
            outputs: outputs.into_iter().map(OutputState::Token).collect(),
            command,
            signatories: signatories.iter().copied().collect(),
            valid_until: Utc::now() + chrono::Duration::hours(1),
            notary: PartyId([9; 32]),
            salt: [0; 16],
        };
        tx.id = tx.compute_id();
        tx
    }

    #[test]
    fn redeem_checks_destroyed_amount() {
        let owner = LedgerKey([1; 32]);
        let issuer = ISSUER;
        let input = StateAndRef::dummy(owned(100, owner));
        let registry = ValidatorRegistry::standard();

        let ok = tx(
            Command::Redeem { amount: dec(40) },
            vec![input.clone()],
            vec![owned(60, owner)],
            &[owner, issuer],
        );
        assert!(registry.validate(&ok).is_ok());

        let overdrawn = tx(
            Command::Redeem { amount: dec(40) },
            vec![input],
            vec![owned(70, owner)],
            &[owner, issuer],
        );
        assert!(registry.validate(&overdrawn).is_err());
    }

    #[test]
    fn redeem_needs_issuer_countersignature() {
        let owner = LedgerKey([1; 32]);
        let input = StateAndRef::dummy(owned(100, owner));
        let single = tx(
            Command::Redeem { amount: dec(40) },
            vec![input],
            vec![owned(60, owner)],
            &[owner],
        );
        let reason = ValidatorRegistry::standard().validate(&single).unwrap_err();
        assert!(reason.contains("issuer key"), "{reason}");
    }

    #[test]
    fn issue_needs_issuer_signature() {
        let owner = LedgerKey([1; 32]);
        let forged = tx(Command::Issue { amount: dec(5) }, vec![], vec![owned(5, owner)], &[owner]);
        let reason = ValidatorRegistry::standard().validate(&forged).unwrap_err();
        assert!(reason.contains("issuer key"), "{reason}");

        let signed = tx(Command::Issue { amount: dec(5) }, vec![], vec![owned(5, owner)], &[ISSUER]);
        assert!(ValidatorRegistry::standard().validate(&signed).is_ok());
    }

    #[test]
    fn transfer_cannot_swap_issuer_key() {
        let owner = LedgerKey([1; 32]);
        let mut relabelled = owned(10, LedgerKey([3; 32]));
        relabelled.issuer_key = owner;
        let t = tx(
            Command::Transfer,
            vec![StateAndRef::dummy(owned(10, owner))],
            vec![relabelled],
            &[owner],
        );
        let reason = ValidatorRegistry::standard().validate(&t).unwrap_err();
        assert!(reason.contains("disagree"), "{reason}");
    }

    #[test]
    fn input_owner_must_sign() {
        let owner = LedgerKey([1; 32]);
        let thief = LedgerKey([3; 32]);
        let t = tx(
            Command::Transfer,
            vec![StateAndRef::dummy(owned(10, owner))],
            vec![owned(10, thief)],
            &[thief],
        );
        let reason = ValidatorRegistry::standard().validate(&t).unwrap_err();
        assert!(reason.contains("must sign"), "{reason}");
    }

    #[test]
    fn unregistered_tag_rejected() {
        let key = LedgerKey([1; 32]);
        let t = tx(Command::Issue { amount: dec(5) }, vec![], vec![owned(5, key)], &[key]);
        let registry = ValidatorRegistry::empty().with(CommandTag::Transfer, validate_transfer);
        assert!(registry.validate(&t).unwrap_err().contains("ISSUE"));
    }

    #[test]
    fn closures_are_validators() {
        let key = LedgerKey([1; 32]);
        let t = tx(Command::Issue { amount: dec(5) }, vec![], vec![owned(5, key)], &[key]);
        let registry = ValidatorRegistry::standard()
            .with(CommandTag::Issue, |_: &CandidateTransaction| -> Verdict {
                Err("issuance frozen".to_string())
            });
        assert_eq!(registry.validate(&t), Err("issuance frozen".to_string()));
    }

    #[test]
    fn empty_symbol_rejected() {
        let key = LedgerKey([1; 32]);
        let mut record = owned(5, key);
        record.symbol = " ".into();
        let t = tx(Command::Issue { amount: dec(5) }, vec![], vec![record], &[key]);
        assert!(ValidatorRegistry::standard().validate(&t).is_err());
    }
}
