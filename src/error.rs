//! Error types for the facilitator.
//!
//! Failed payments are not errors: they are reason-coded verdicts (see
//! [`crate::types::ReasonCode`]). The variants here cover infrastructure
//! faults only, which callers surface generically.

use crate::chain::ChainError;
use thiserror::Error;

/// Infrastructure error.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport or client construction failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Chain collaborator failed outside the settlement state machine.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Settlement store failed or returned an unreadable record.
    #[error("Store error: {0}")]
    Store(String),

    /// Slot or min-UTxO oracle failed.
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal failure (e.g. a settlement task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
