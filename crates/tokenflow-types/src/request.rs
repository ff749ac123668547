//! Client requests, one per entry point.
//!
//! Requests arrive already deserialized. Field names follow the camelCase
//! wire convention of the client surface.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PartyId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub metadata: Option<String>,
    /// Another party that should also record the new account.
    #[serde(default)]
    pub share_with: Option<PartyId>,
}

/// Issue `amount` of `symbol` from the issuer account to the owner account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub issuer_id: Uuid,
    pub owner_id: Uuid,
    pub symbol: String,
    pub amount: Decimal,
}

/// Destroy `amount` of the owner's tokens, countersigned by the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemTokenRequest {
    pub issuer_id: Uuid,
    pub owner_id: Uuid,
    pub symbol: String,
    pub amount: Decimal,
}

/// Move `amount` from the owner account to the recipient account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTokenRequest {
    pub issuer_id: Uuid,
    pub owner_id: Uuid,
    pub recipient_id: Uuid,
    pub symbol: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBalanceRequest {
    pub issuer_id: Uuid,
    pub owner_id: Uuid,
    pub symbol: String,
}
