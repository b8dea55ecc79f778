//! # cardano-x402-facilitator
//!
//! Facilitator side of the x402 "pay-per-request" protocol on Cardano.
//!
//! Resource servers hand the facilitator a client-signed transaction and the
//! payment they expect. The facilitator:
//!
//! 1. decodes the CBOR transaction ([`transaction`]),
//! 2. runs ten ordered checks against the requirements ([`verify`]),
//! 3. submits the transaction at most once and polls for confirmation
//!    ([`settlement`]).
//!
//! ```text
//! Facilitator ──► Settler ──► verify ──► transaction::decode ──► registry
//!      │             │
//!      │             ├──► SettlementStore (atomic claim)
//!      │             └──► ChainClient (submit / query)
//!      └──► verify (standalone /verify)
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod facilitator;
pub mod registry;
pub mod settlement;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod transaction;
pub mod types;
pub mod verify;

pub use config::{CardanoNetwork, FacilitatorConfig};
pub use error::{Error, Result};
pub use facilitator::Facilitator;
pub use settlement::Settler;
pub use types::ReasonCode;
pub use verify::{verify, VerificationContext};
