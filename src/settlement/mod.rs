//! Idempotent settlement.
//!
//! A settlement re-verifies the payment, claims the transaction in the
//! [`SettlementStore`] and only the claim winner submits. Everyone else reads
//! the winner's record. Per dedup key:
//!
//! ```text
//! unclaimed ──claim──► submitted ──► confirmed
//!                          │    └──► timeout ──(later query)──► confirmed
//!                          └──► failed
//! ```
//!
//! A signed transaction reaches [`ChainClient::submit`] at most once for the
//! lifetime of its record, however many requests carry it.

mod record;
pub mod store;

pub use record::{SettlementRecord, SettlementStatus};
pub use store::{MemoryStore, SettlementStore};

use crate::chain::ChainClient;
use crate::config::CardanoNetwork;
use crate::error::{Error, Result};
use crate::event::{SettlementEvent, SettlementEventsSender};
use crate::types::{ReasonCode, SettleResponse};
use crate::verify::{self, VerificationContext};
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay between confirmation queries.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Total time spent polling before answering `confirmation_timeout`.
pub const CONFIRMATION_BUDGET: Duration = Duration::from_secs(120);

/// Lifetime of settlement records.
pub const SETTLEMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix of dedup keys.
pub const SETTLE_KEY_PREFIX: &str = "x402:cardano:settle:";

/// Prefix of the tx-hash → dedup-key index.
pub const TX_INDEX_PREFIX: &str = "x402:cardano:tx:";

/// Dedup key for raw transaction bytes.
#[must_use]
pub fn dedup_key(raw: &[u8]) -> String {
    format!("{SETTLE_KEY_PREFIX}{}", hex::encode(Sha256::digest(raw)))
}

fn index_key(tx_hash: &str) -> String {
    format!("{TX_INDEX_PREFIX}{}", tx_hash.to_ascii_lowercase())
}

/// Settlement orchestrator.
pub struct Settler {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn SettlementStore>,
    network: CardanoNetwork,
    events: SettlementEventsSender,
}

impl Settler {
    /// Settler over `chain` and `store` for `network`.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn SettlementStore>,
        network: CardanoNetwork,
        events: SettlementEventsSender,
    ) -> Self {
        Self {
            chain,
            store,
            network,
            events,
        }
    }

    /// Network this settler submits to.
    #[must_use]
    pub fn network(&self) -> CardanoNetwork {
        self.network
    }

    /// Verify, claim, submit and confirm `raw`.
    ///
    /// `raw` must be the decoded bytes of `ctx.transaction`.
    ///
    /// # Errors
    ///
    /// Returns an error if an oracle or the store fails. Chain failures
    /// become reason-coded responses.
    pub async fn settle(&self, mut ctx: VerificationContext, raw: Bytes) -> Result<SettleResponse> {
        let verdict = verify::verify(&mut ctx).await?;
        if !verdict.is_valid {
            info!(
                "Settlement refused: verification failed ({})",
                verdict
                    .invalid_reason
                    .map_or("unknown", ReasonCode::as_str)
            );
            let _ = self.events.send(SettlementEvent::Failed {
                reason: ReasonCode::VerificationFailed,
            });
            return Ok(SettleResponse::failed(ReasonCode::VerificationFailed));
        }

        let content_hash = ctx
            .decoded()
            .map(|tx| tx.tx_hash.clone())
            .unwrap_or_default();
        let key = dedup_key(&raw);

        let claim = serde_json::to_string(&SettlementRecord::claimed(&content_hash))?;
        if self.store.set_if_absent(&key, claim, SETTLEMENT_TTL).await? {
            info!("Claimed settlement {key}");
            let _ = self.events.send(SettlementEvent::Claimed { key: key.clone() });
            self.submit_and_confirm(&key, &raw, content_hash).await
        } else {
            debug!("Settlement {key} already claimed");
            self.resume(&key, content_hash).await
        }
    }

    /// Run [`Settler::settle`] on its own task.
    ///
    /// The settlement finishes even if the returned future is dropped, so a
    /// disconnected caller never leaves a claim without a final record.
    ///
    /// # Errors
    ///
    /// Returns the settlement's error, or [`Error::Internal`] if the task
    /// panicked.
    pub async fn settle_detached(
        self: Arc<Self>,
        ctx: VerificationContext,
        raw: Bytes,
    ) -> Result<SettleResponse> {
        tokio::spawn(async move { self.settle(ctx, raw).await })
            .await
            .map_err(|e| Error::Internal(format!("Settlement task failed: {e}")))?
    }

    /// Record of the settlement that submitted `tx_hash`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds an unreadable record.
    pub async fn record_for(&self, tx_hash: &str) -> Result<Option<SettlementRecord>> {
        let Some(key) = self.store.get(&index_key(tx_hash)).await? else {
            return Ok(None);
        };
        self.read(&key).await
    }

    async fn submit_and_confirm(
        &self,
        key: &str,
        raw: &[u8],
        content_hash: String,
    ) -> Result<SettleResponse> {
        let tx_hash = match self.chain.submit(raw).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                let reason = if e.is_client_rejection() {
                    ReasonCode::InvalidTransaction
                } else {
                    ReasonCode::SubmissionRejected
                };
                warn!("Submission of {content_hash} failed ({reason}): {e}");
                let failed = SettlementRecord::claimed(content_hash).into_failed(reason);
                if let Some(confirmed) = self.advance(key, &failed).await? {
                    return Ok(self.already_confirmed(confirmed));
                }
                let _ = self.events.send(SettlementEvent::Failed { reason });
                return Ok(SettleResponse::failed(reason));
            }
        };

        info!("Submitted transaction {tx_hash}");
        self.store
            .set(&index_key(&tx_hash), key.to_string(), SETTLEMENT_TTL)
            .await?;
        let record = SettlementRecord::submitted(&tx_hash, Utc::now());
        if let Some(confirmed) = self.advance(key, &record).await? {
            return Ok(self.already_confirmed(confirmed));
        }
        let _ = self.events.send(SettlementEvent::Submitted {
            tx_hash: tx_hash.clone(),
        });

        let polled =
            tokio::time::timeout(CONFIRMATION_BUDGET, self.wait_for_confirmation(&tx_hash)).await;
        if polled.is_ok() {
            return self.confirm(key, record).await;
        }

        warn!(
            "Transaction {tx_hash} not confirmed within {}s",
            CONFIRMATION_BUDGET.as_secs()
        );
        if let Some(confirmed) = self.advance(key, &record.into_timeout()).await? {
            return Ok(self.already_confirmed(confirmed));
        }
        let _ = self.events.send(SettlementEvent::TimedOut {
            tx_hash: tx_hash.clone(),
        });
        Ok(SettleResponse::timed_out(tx_hash))
    }

    async fn resume(&self, key: &str, content_hash: String) -> Result<SettleResponse> {
        let Some(record) = self.read(key).await? else {
            warn!("Settlement {key} was claimed but its record is gone");
            return Ok(SettleResponse::timed_out(content_hash));
        };

        match record.status {
            SettlementStatus::Confirmed => Ok(SettleResponse::confirmed(
                record.tx_hash,
                self.network.caip2(),
            )),
            SettlementStatus::Failed => Ok(SettleResponse::failed(
                record.reason.unwrap_or(ReasonCode::SubmissionRejected),
            )),
            SettlementStatus::Submitted | SettlementStatus::Timeout => {
                if self.is_confirmed(&record.tx_hash).await {
                    self.confirm(key, record).await
                } else {
                    Ok(SettleResponse::timed_out(record.tx_hash))
                }
            }
        }
    }

    async fn wait_for_confirmation(&self, tx_hash: &str) {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if self.is_confirmed(tx_hash).await {
                return;
            }
        }
    }

    async fn is_confirmed(&self, tx_hash: &str) -> bool {
        match self.chain.get_transaction(tx_hash).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("Transaction {tx_hash} not on-chain yet");
                false
            }
            Err(e) => {
                warn!("Confirmation query for {tx_hash} failed: {e}");
                false
            }
        }
    }

    async fn confirm(&self, key: &str, record: SettlementRecord) -> Result<SettleResponse> {
        let tx_hash = record.tx_hash.clone();
        info!("Transaction {tx_hash} confirmed");
        if let Some(confirmed) = self.advance(key, &record.into_confirmed(Utc::now())).await? {
            return Ok(self.already_confirmed(confirmed));
        }
        let _ = self.events.send(SettlementEvent::Confirmed {
            tx_hash: tx_hash.clone(),
        });
        Ok(SettleResponse::confirmed(tx_hash, self.network.caip2()))
    }

    fn already_confirmed(&self, record: SettlementRecord) -> SettleResponse {
        debug!("Settlement of {} already confirmed by another caller", record.tx_hash);
        SettleResponse::confirmed(record.tx_hash, self.network.caip2())
    }

    /// Write `record` unless the stored one is already confirmed, which is
    /// terminal. Returns the confirmed record when the write was skipped.
    ///
    /// Read-then-write: the store offers no compare-and-set, so this only
    /// narrows the window in which a confirmation can be overwritten.
    async fn advance(
        &self,
        key: &str,
        record: &SettlementRecord,
    ) -> Result<Option<SettlementRecord>> {
        let current = self.read(key).await?;
        if let Some(confirmed) = current.filter(|r| r.status == SettlementStatus::Confirmed) {
            return Ok(Some(confirmed));
        }
        self.write(key, record).await?;
        Ok(None)
    }

    async fn read(&self, key: &str) -> Result<Option<SettlementRecord>> {
        self.store
            .get(key)
            .await?
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| Error::Store(format!("Unreadable record under {key}: {e}")))
            })
            .transpose()
    }

    async fn write(&self, key: &str, record: &SettlementRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.store.set(key, value, SETTLEMENT_TTL).await
    }
}
