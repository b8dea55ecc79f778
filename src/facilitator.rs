//! Request boundary for verify, settle and status.
//!
//! Takes raw JSON bodies, rejects malformed ones with `invalid_request`
//! verdicts rather than errors, and wires each request into a fresh
//! [`VerificationContext`].

use crate::chain::{CacheStats, ChainClient, ConfirmedCache};
use crate::config::{CardanoNetwork, FacilitatorConfig};
use crate::error::Result;
use crate::event::{create_event_channel, SettlementEventsChannel, SettlementEventsSender};
use crate::settlement::{SettlementStatus, SettlementStore, Settler};
use crate::transaction;
use crate::types::{
    PaymentRequirements, ReasonCode, SettleRequest, SettleResponse, StatusRequest, StatusResponse,
    TransactionStatus, VerifyRequest, VerifyResponse, X402_VERSION,
};
use crate::verify::oracle::{MinUtxoOracle, SlotOracle};
use crate::verify::{self, FeeBounds, VerificationContext};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TX_HASH_HEX_LEN: usize = 64;

/// x402 facilitator for one Cardano network.
pub struct Facilitator {
    network: CardanoNetwork,
    fee_bounds: FeeBounds,
    chain: Arc<dyn ChainClient>,
    slot_oracle: Arc<dyn SlotOracle>,
    min_utxo_oracle: Option<Arc<dyn MinUtxoOracle>>,
    settler: Arc<Settler>,
    confirmed: ConfirmedCache,
    events_tx: SettlementEventsSender,
}

impl Facilitator {
    /// Build a facilitator from validated configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: &FacilitatorConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn SettlementStore>,
        slot_oracle: Arc<dyn SlotOracle>,
        min_utxo_oracle: Option<Arc<dyn MinUtxoOracle>>,
    ) -> Result<Self> {
        config.validate()?;
        let network = config.cardano_network()?;
        let (events_tx, _) = create_event_channel();
        let settler = Settler::new(Arc::clone(&chain), store, network, events_tx.clone());

        info!(
            "Facilitator for {} (fees {}..={} lovelace, min UTxO check {})",
            network.caip2(),
            config.fees.min_lovelace,
            config.fees.max_lovelace,
            if min_utxo_oracle.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            network,
            fee_bounds: FeeBounds::new(config.fees.min_lovelace, config.fees.max_lovelace),
            chain,
            slot_oracle,
            min_utxo_oracle,
            settler: Arc::new(settler),
            confirmed: ConfirmedCache::new(config.confirmed_cache_capacity),
            events_tx,
        })
    }

    /// Network served.
    #[must_use]
    pub fn network(&self) -> CardanoNetwork {
        self.network
    }

    /// Subscribe to settlement events.
    #[must_use]
    pub fn subscribe_events(&self) -> SettlementEventsChannel {
        self.events_tx.subscribe()
    }

    /// Confirmed-transaction cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.confirmed.stats()
    }

    /// Handle a `/verify` body.
    ///
    /// # Errors
    ///
    /// Returns an error only when an oracle fails.
    pub async fn verify(&self, body: &[u8]) -> Result<VerifyResponse> {
        let Some(request) = parse::<VerifyRequest>(body) else {
            return Ok(VerifyResponse::invalid_request());
        };
        if request.payment_payload.x402_version != X402_VERSION {
            debug!(
                "Unsupported x402Version {}",
                request.payment_payload.x402_version
            );
            return Ok(VerifyResponse::invalid_request());
        }
        let payload = request.payment_payload.payload;
        if !well_formed(&request.payment_requirements, &payload.transaction) {
            return Ok(VerifyResponse::invalid_request());
        }

        let mut ctx = self
            .context(request.payment_requirements, payload.transaction)
            .with_payer(payload.payer);
        verify::verify(&mut ctx).await
    }

    /// Handle a `/settle` body. Settlement runs on its own task.
    ///
    /// # Errors
    ///
    /// Returns an error if an oracle or the store fails.
    pub async fn settle(&self, body: &[u8]) -> Result<SettleResponse> {
        let Some(request) = parse::<SettleRequest>(body) else {
            return Ok(SettleResponse::failed(ReasonCode::InvalidRequest));
        };
        if !well_formed(&request.payment_requirements, &request.transaction) {
            return Ok(SettleResponse::failed(ReasonCode::InvalidRequest));
        }

        let raw = match transaction::decode_base64(&request.transaction) {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                debug!("Settle transaction is not base64: {e}");
                return Ok(SettleResponse::failed(ReasonCode::VerificationFailed));
            }
        };

        let ctx = self.context(request.payment_requirements, request.transaction);
        let response = Arc::clone(&self.settler).settle_detached(ctx, raw).await?;
        if let (true, Some(tx_hash)) = (response.success, response.transaction.as_deref()) {
            self.confirmed.record(tx_hash);
        }
        Ok(response)
    }

    /// Handle a `/status` body.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain query or the store fails.
    pub async fn status(&self, body: &[u8]) -> Result<StatusResponse> {
        let Some(request) = parse::<StatusRequest>(body) else {
            return Ok(invalid_status(echo_transaction(body)));
        };
        let tx_hash = request.transaction.trim().to_ascii_lowercase();
        if tx_hash.len() != TX_HASH_HEX_LEN || !tx_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            debug!("Malformed status transaction hash");
            return Ok(invalid_status(request.transaction));
        }

        let status = self.lookup(&tx_hash).await?;
        Ok(StatusResponse {
            status,
            transaction: request.transaction,
            reason: None,
        })
    }

    async fn lookup(&self, tx_hash: &str) -> Result<TransactionStatus> {
        if self.confirmed.is_confirmed(tx_hash) {
            return Ok(TransactionStatus::Confirmed);
        }

        match self.chain.get_transaction(tx_hash).await {
            Ok(Some(_)) => {
                self.confirmed.record(tx_hash);
                return Ok(TransactionStatus::Confirmed);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Status query for {tx_hash} failed: {e}");
                return Err(e.into());
            }
        }

        let status = match self.settler.record_for(tx_hash).await? {
            Some(record) => match record.status {
                SettlementStatus::Submitted | SettlementStatus::Timeout => {
                    TransactionStatus::Pending
                }
                SettlementStatus::Confirmed => TransactionStatus::Confirmed,
                SettlementStatus::Failed => TransactionStatus::NotFound,
            },
            None => TransactionStatus::NotFound,
        };
        Ok(status)
    }

    fn context(&self, requirements: PaymentRequirements, tx: String) -> VerificationContext {
        VerificationContext::new(
            requirements,
            tx,
            self.network,
            self.fee_bounds.clone(),
            Arc::clone(&self.slot_oracle),
        )
        .with_min_utxo_oracle(self.min_utxo_oracle.clone())
    }
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_json::from_slice(body)
        .map_err(|e| debug!("Malformed request body: {e}"))
        .ok()
}

fn well_formed(requirements: &PaymentRequirements, transaction: &str) -> bool {
    if !requirements.has_decimal_amount() {
        debug!(
            "maxAmountRequired is not a decimal integer: {:?}",
            requirements.max_amount_required
        );
        return false;
    }
    if transaction.trim().is_empty() {
        debug!("Empty transaction");
        return false;
    }
    true
}

fn echo_transaction(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("transaction")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn invalid_status(transaction: String) -> StatusResponse {
    StatusResponse {
        status: TransactionStatus::NotFound,
        transaction,
        reason: Some(ReasonCode::InvalidRequest),
    }
}
