//! Chain access consumed by verification and settlement.
//!
//! The facilitator never builds transactions. It only submits client-signed
//! bytes and asks whether a transaction id is on-chain. Retry and backoff
//! belong to the implementation.

pub mod blockfrost;
mod cache;

pub use blockfrost::BlockfrostClient;
pub use cache::{CacheStats, ConfirmedCache};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-chain transaction summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    /// Transaction id (hex).
    pub hash: String,
    /// Height of the including block.
    #[serde(default)]
    pub block_height: Option<u64>,
    /// Slot of the including block.
    #[serde(default)]
    pub slot: Option<u64>,
    /// Unix time of the including block.
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// Chain client failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The chain API answered with an error status.
    #[error("Chain API rejected request (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status (or equivalent).
        status: u16,
        /// Response body or error text.
        message: String,
    },

    /// The chain API could not be reached or answered unintelligibly.
    #[error("Chain API unavailable: {0}")]
    Unavailable(String),
}

impl ChainError {
    /// Whether the error means the transaction itself was refused.
    ///
    /// 4xx answers count, except 408 and 429 which say nothing about the
    /// transaction.
    #[must_use]
    pub fn is_client_rejection(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            Self::Unavailable(_) => false,
        }
    }
}

/// Submit and query capability.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit signed transaction bytes; returns the transaction id.
    async fn submit(&self, tx: &[u8]) -> Result<String, ChainError>;

    /// Look up a transaction; `None` if it is not on-chain (yet).
    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TxInfo>, ChainError>;
}
