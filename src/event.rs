//! Settlement event system.

use crate::types::ReasonCode;
use tokio::sync::broadcast;

/// Events emitted while settling payments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    /// This instance won the claim for a transaction.
    Claimed {
        /// Dedup key that was claimed.
        key: String,
    },

    /// Transaction accepted by the chain client.
    Submitted {
        /// Chain transaction hash.
        tx_hash: String,
    },

    /// Transaction seen on-chain.
    Confirmed {
        /// Chain transaction hash.
        tx_hash: String,
    },

    /// Polling budget ran out before confirmation.
    TimedOut {
        /// Chain transaction hash.
        tx_hash: String,
    },

    /// Settlement ended without submission succeeding.
    Failed {
        /// Why.
        reason: ReasonCode,
    },
}

/// Channel for receiving settlement events.
pub type SettlementEventsChannel = broadcast::Receiver<SettlementEvent>;

/// Sender for settlement events.
pub type SettlementEventsSender = broadcast::Sender<SettlementEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (SettlementEventsSender, SettlementEventsChannel) {
    broadcast::channel(256)
}
