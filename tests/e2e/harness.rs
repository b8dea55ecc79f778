//! Test harness wiring the facilitator to an in-process mock chain.
//!
//! `MockChain` stands in for Blockfrost: it counts submissions, can reject
//! them, and makes a submitted transaction visible after a configurable
//! number of confirmation queries.

use async_trait::async_trait;
use bytes::Bytes;
use cardano_x402::chain::{ChainClient, ChainError, TxInfo};
use cardano_x402::config::FacilitatorConfig;
use cardano_x402::event::{create_event_channel, SettlementEventsChannel};
use cardano_x402::settlement::{MemoryStore, SettlementStore, Settler};
use cardano_x402::testing::{test_address, TxBuilder};
use cardano_x402::transaction::{self, address};
use cardano_x402::types::PaymentRequirements;
use cardano_x402::verify::oracle::{MinUtxoOracle, SlotOracle};
use cardano_x402::verify::{FeeBounds, VerificationContext};
use cardano_x402::{CardanoNetwork, Facilitator};
use num_bigint::BigUint;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Slot reported by [`FixedSlot`] in the default harness.
pub const CURRENT_SLOT: u64 = 1_000;

/// Required payment in the default requirements.
pub const REQUIRED_LOVELACE: u64 = 2_000_000;

/// Slot oracle returning a constant.
pub struct FixedSlot(pub u64);

#[async_trait]
impl SlotOracle for FixedSlot {
    async fn current_slot(&self) -> cardano_x402::Result<u64> {
        Ok(self.0)
    }
}

/// Min-UTxO oracle returning a constant per asset count.
pub struct FixedMin {
    /// Minimum for an ADA-only output.
    pub base: u64,
    /// Added per asset.
    pub per_asset: u64,
}

#[async_trait]
impl MinUtxoOracle for FixedMin {
    async fn min_output_value(&self, num_assets: usize) -> cardano_x402::Result<BigUint> {
        Ok(BigUint::from(self.base) + BigUint::from(self.per_asset) * BigUint::from(num_assets))
    }
}

#[derive(Default)]
struct ChainState {
    reject_with: Option<ChainError>,
    confirm_after: Option<usize>,
    failing_queries: usize,
    submitted: HashMap<String, usize>,
    visible: HashSet<String>,
}

/// In-process chain client.
pub struct MockChain {
    state: Mutex<ChainState>,
    submit_delay: Duration,
    query_delay: Duration,
    submits: AtomicUsize,
    queries: AtomicUsize,
}

impl MockChain {
    /// Chain that accepts submissions and confirms on the first query after.
    pub fn new() -> Self {
        Self::with_submit_delay(Duration::ZERO)
    }

    /// Chain whose submissions take `delay`.
    pub fn with_submit_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::new(ChainState {
                confirm_after: Some(1),
                ..ChainState::default()
            }),
            submit_delay: delay,
            query_delay: Duration::ZERO,
            submits: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Chain whose lookups take `delay`. Visibility is decided when the
    /// lookup starts.
    pub fn with_query_delay(delay: Duration) -> Self {
        Self {
            query_delay: delay,
            ..Self::new()
        }
    }

    /// Reject every submission with `error`.
    pub fn reject_submissions(&self, error: ChainError) {
        self.state.lock().reject_with = Some(error);
    }

    /// Make submitted transactions visible after `queries` lookups; `None`
    /// never confirms them.
    pub fn confirm_after(&self, queries: Option<usize>) {
        self.state.lock().confirm_after = queries;
    }

    /// Fail the next `count` lookups as unavailable.
    pub fn fail_next_queries(&self, count: usize) {
        self.state.lock().failing_queries = count;
    }

    /// Put `tx_hash` on-chain immediately.
    pub fn confirm(&self, tx_hash: &str) {
        self.state.lock().visible.insert(tx_hash.to_string());
    }

    /// Number of `submit` calls.
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    /// Number of `get_transaction` calls.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn submit(&self, tx: &[u8]) -> Result<String, ChainError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }

        let mut state = self.state.lock();
        if let Some(error) = state.reject_with.clone() {
            return Err(error);
        }
        let decoded = transaction::decode_bytes(tx).map_err(|e| ChainError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        state.submitted.insert(decoded.tx_hash.clone(), 0);
        Ok(decoded.tx_hash)
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TxInfo>, ChainError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let visible = {
            let mut state = self.state.lock();
            if state.failing_queries > 0 {
                state.failing_queries -= 1;
                return Err(ChainError::Unavailable("connection reset".to_string()));
            }

            let confirm_after = state.confirm_after;
            let visible = state.visible.contains(tx_hash)
                || state.submitted.get_mut(tx_hash).is_some_and(|count| {
                    *count += 1;
                    confirm_after.is_some_and(|n| *count >= n)
                });
            if visible {
                state.visible.insert(tx_hash.to_string());
            }
            visible
        };
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }

        Ok(visible.then(|| TxInfo {
            hash: tx_hash.to_string(),
            block_height: Some(1),
            slot: Some(CURRENT_SLOT),
            block_time: None,
        }))
    }
}

/// Facilitator plus direct access to its collaborators.
pub struct TestHarness {
    /// Mock chain shared by the facilitator and [`TestHarness::settler`].
    pub chain: Arc<MockChain>,
    /// Store shared by the facilitator and [`TestHarness::settler`].
    pub store: Arc<MemoryStore>,
    /// Facilitator under test.
    pub facilitator: Facilitator,
}

impl TestHarness {
    /// Preprod facilitator over a chain that confirms on first query.
    pub fn new() -> Self {
        Self::with_chain(MockChain::new())
    }

    /// Preprod facilitator over `chain`.
    pub fn with_chain(chain: MockChain) -> Self {
        let chain = Arc::new(chain);
        let store = Arc::new(MemoryStore::new());
        let facilitator = Facilitator::new(
            &FacilitatorConfig::default(),
            chain.clone(),
            store.clone(),
            Arc::new(FixedSlot(CURRENT_SLOT)),
            Some(Arc::new(FixedMin {
                base: 1_000_000,
                per_asset: 200_000,
            })),
        )
        .expect("Failed to build facilitator");

        Self {
            chain,
            store,
            facilitator,
        }
    }

    /// Settler over the harness chain and store, with its own event channel.
    pub fn settler(&self) -> (Arc<Settler>, SettlementEventsChannel) {
        let (events_tx, events_rx) = create_event_channel();
        let chain: Arc<dyn ChainClient> = self.chain.clone();
        let store: Arc<dyn SettlementStore> = self.store.clone();
        let settler = Settler::new(chain, store, CardanoNetwork::Preprod, events_tx);
        (Arc::new(settler), events_rx)
    }

    /// Fresh verification context for `tx` against [`requirements`].
    pub fn context(&self, tx: &str) -> VerificationContext {
        VerificationContext::new(
            requirements(),
            tx.to_string(),
            CardanoNetwork::Preprod,
            FeeBounds::new(150_000, 2_000_000),
            Arc::new(FixedSlot(CURRENT_SLOT)),
        )
    }
}

/// Address the default requirements pay to.
pub fn pay_to() -> Vec<u8> {
    test_address(0, 42)
}

/// Default requirements: 2 ADA to [`pay_to`] on preprod.
pub fn requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".to_string(),
        network: "cardano:preprod".to_string(),
        asset: "native".to_string(),
        max_amount_required: REQUIRED_LOVELACE.to_string(),
        pay_to: address::to_bech32(&pay_to()),
        max_timeout_seconds: 300,
    }
}

/// Signed transaction paying `lovelace` to [`pay_to`], spending `seed`'s
/// input so different seeds give different transactions.
pub fn payment(lovelace: u64, seed: u8) -> TxBuilder {
    TxBuilder::new()
        .input([seed; 32], 0)
        .output(&test_address(0, 7), 5_000_000)
        .output(&pay_to(), lovelace)
        .fee(180_000)
        .ttl(CURRENT_SLOT + 500)
}

/// Base64 and raw bytes of `tx`.
pub fn encode(tx: &TxBuilder) -> (String, Bytes) {
    let raw = tx.build().expect("Failed to build transaction");
    let encoded = tx.to_base64().expect("Failed to encode transaction");
    (encoded, Bytes::from(raw))
}

/// Content hash of `tx`.
pub fn tx_hash(tx: &TxBuilder) -> String {
    let raw = tx.build().expect("Failed to build transaction");
    transaction::decode_bytes(&raw)
        .expect("Failed to decode transaction")
        .tx_hash
}

/// `/verify` body for `tx`.
pub fn verify_body(tx: &str) -> Vec<u8> {
    body(&json!({
        "paymentPayload": {
            "x402Version": 2,
            "scheme": "exact",
            "network": "cardano:preprod",
            "payload": { "transaction": tx, "payer": "addr_test1payer" }
        },
        "paymentRequirements": requirements(),
    }))
}

/// `/settle` body for `tx`.
pub fn settle_body(tx: &str) -> Vec<u8> {
    body(&json!({ "transaction": tx, "paymentRequirements": requirements() }))
}

/// `/status` body for `tx_hash`.
pub fn status_body(tx_hash: &str) -> Vec<u8> {
    body(&json!({ "transaction": tx_hash, "paymentRequirements": requirements() }))
}

/// Serialize a JSON value.
pub fn body(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("Failed to serialize body")
}
