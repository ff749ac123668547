//! # tokenflow-finality
//!
//! **Finality plane**: turns a locally built candidate into an irreversible,
//! notarised transaction that every involved party applies.
//!
//! ## Architecture
//!
//! The finality plane takes a candidate from a client entry point and:
//! 1. Validates it against the contract rules for its command
//! 2. Collects a signature from every required signatory over a session
//! 3. Submits it to the notary, which orders it and rejects double spends
//! 4. Applies the notarised result to every involved party's vault
//! 5. Tracks per-group supply (issued minus redeemed) at the notary
//!
//! ## Finalization
//!
//! ```text
//! Party (initiator) ──Propose──▶ Party (responder)
//!        ◀──Endorse / Reject──
//!        ──submit──▶ Notary ──Finalized / Rejected──▶
//!        ──Finality / Abort──▶
//! ```

pub mod builder;
pub mod flows;
pub mod history;
pub mod initiator;
pub mod notary;
pub mod party;
pub mod responder;
pub mod session;
pub mod supply_conservation;
pub mod validator;

pub use builder::TransactionBuilder;
pub use history::TransactionLog;
pub use initiator::InitiatorState;
pub use notary::{NotaryHandle, NotaryOutcome, NotaryRequest, NotaryService, NotaryState, RejectionReason};
pub use party::{Party, PartyContext};
pub use responder::{ResponderOutcome, ResponderState};
pub use session::{FlowMessage, MessageBus, Session};
pub use supply_conservation::SupplyConservation;
pub use validator::{ContractValidator, ValidatorRegistry, Verdict};
