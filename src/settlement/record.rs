//! Persisted settlement state.

use crate::types::ReasonCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a settlement stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    /// Claimed; submission in progress or done, not yet confirmed.
    Submitted,
    /// Seen on-chain. Terminal.
    Confirmed,
    /// Submission failed. Terminal.
    Failed,
    /// Polling budget ran out; a later query may still confirm it.
    Timeout,
}

/// Record stored under a dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    /// Transaction hash (decoded content hash until submission returns one).
    pub tx_hash: String,
    /// Current state.
    pub status: SettlementStatus,
    /// When the chain accepted the submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// When confirmation was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Failure reason for `failed` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl SettlementRecord {
    /// Claim placeholder written before submission.
    #[must_use]
    pub fn claimed(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            status: SettlementStatus::Submitted,
            submitted_at: None,
            confirmed_at: None,
            reason: None,
        }
    }

    /// Accepted by the chain at `at`.
    #[must_use]
    pub fn submitted(tx_hash: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            submitted_at: Some(at),
            ..Self::claimed(tx_hash)
        }
    }

    /// Same record, now confirmed at `at`.
    #[must_use]
    pub fn into_confirmed(self, at: DateTime<Utc>) -> Self {
        Self {
            status: SettlementStatus::Confirmed,
            confirmed_at: Some(at),
            ..self
        }
    }

    /// Same record, now timed out.
    #[must_use]
    pub fn into_timeout(self) -> Self {
        Self {
            status: SettlementStatus::Timeout,
            ..self
        }
    }

    /// Same record, now failed with `reason`.
    #[must_use]
    pub fn into_failed(self, reason: ReasonCode) -> Self {
        Self {
            status: SettlementStatus::Failed,
            reason: Some(reason),
            ..self
        }
    }
}
