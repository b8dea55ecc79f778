//! Async oracles injected into verification.

use crate::config::CardanoNetwork;
use crate::error::Result;
use async_trait::async_trait;
use num_bigint::BigUint;

/// Current-slot source for the TTL check.
#[async_trait]
pub trait SlotOracle: Send + Sync {
    /// The chain's current slot.
    async fn current_slot(&self) -> Result<u64>;
}

/// Ledger minimum value for an output.
#[async_trait]
pub trait MinUtxoOracle: Send + Sync {
    /// Minimum lovelace for an output holding `num_assets` distinct assets
    /// besides ADA.
    async fn min_output_value(&self, num_assets: usize) -> Result<BigUint>;
}

/// Slot derived from the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct ClockSlotOracle {
    network: CardanoNetwork,
}

impl ClockSlotOracle {
    /// Oracle for `network`.
    #[must_use]
    pub fn new(network: CardanoNetwork) -> Self {
        Self { network }
    }
}

#[async_trait]
impl SlotOracle for ClockSlotOracle {
    async fn current_slot(&self) -> Result<u64> {
        Ok(self.network.slot_at(chrono::Utc::now().timestamp()))
    }
}

/// Serialized size estimate of an output with a base address, in bytes.
const BASE_OUTPUT_BYTES: u64 = 67;
/// Added size per distinct asset (policy id, short name, quantity, map overhead).
const PER_ASSET_BYTES: u64 = 44;
/// Fixed per-UTxO overhead the ledger adds before pricing.
const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// Babbage-era minimum for an output, priced at `coins_per_utxo_byte`.
#[must_use]
pub fn min_output_lovelace(coins_per_utxo_byte: u64, num_assets: usize) -> BigUint {
    let assets = u64::try_from(num_assets).unwrap_or(u64::MAX);
    let size = UTXO_ENTRY_OVERHEAD
        .saturating_add(BASE_OUTPUT_BYTES)
        .saturating_add(PER_ASSET_BYTES.saturating_mul(assets));
    BigUint::from(size) * BigUint::from(coins_per_utxo_byte)
}
