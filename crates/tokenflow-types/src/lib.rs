//! # tokenflow-types
//!
//! Shared types, errors, and configuration for the **tokenflow** ledger.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`LedgerKey`], [`PartyId`], [`NotaryId`], [`AccountHash`], [`TransactionId`], [`StateRef`], [`ClaimId`], [`SessionId`]
//! - **Accounts**: [`Account`]
//! - **Tokens**: [`TokenRecord`], [`FungibilityGroup`], [`StateAndRef`]
//! - **Claims**: [`Claim`]
//! - **Transactions**: [`Command`], [`CandidateTransaction`], [`SignedTransaction`], [`NotarisedTransaction`]
//! - **Client surface**: request structs and [`FlowResponse`]
//! - **Configuration**: [`LedgerConfig`]
//! - **Errors**: [`LedgerError`] with `TF_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod account;
pub mod claim;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod token;
pub mod transaction;

// Re-export all primary types at crate root for ergonomic imports:
//   use tokenflow_types::{Account, TokenRecord, Claim, ...};

pub use account::*;
pub use claim::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use outcome::*;
pub use request::*;
pub use token::*;
pub use transaction::*;

// Constants are accessed via `tokenflow_types::constants::FOO`
// (not re-exported to avoid name collisions).
