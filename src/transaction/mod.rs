//! Transaction decoding.
//!
//! Turns the base64 CBOR of a client-signed Cardano transaction into a
//! [`DecodedTransaction`]. The input is adversary-supplied: every structural
//! problem surfaces as [`DecodeError::InvalidCbor`], never as a panic.

pub mod address;
mod decoder;

use crate::types::ReasonCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use num_bigint::BigUint;
use std::collections::BTreeMap;
use thiserror::Error;

pub use decoder::decode_bytes;

/// Decoding failure, mapped 1:1 onto a reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not valid base64.
    #[error("invalid base64")]
    InvalidBase64,
    /// Bytes are not a well-formed transaction.
    #[error("invalid transaction CBOR: {0}")]
    InvalidCbor(String),
}

impl DecodeError {
    /// Reason code for this failure.
    #[must_use]
    pub fn reason(&self) -> ReasonCode {
        match self {
            Self::InvalidBase64 => ReasonCode::InvalidBase64,
            Self::InvalidCbor(_) => ReasonCode::InvalidCbor,
        }
    }
}

/// Reference to a previous transaction's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Hash of the transaction that created the output (hex).
    pub tx_hash: String,
    /// Output index within that transaction.
    pub index: u64,
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Raw address bytes as lower-case hex. Used for recipient matching.
    pub address_hex: String,
    /// Human-readable (bech32) address. Display only.
    pub address: String,
    /// ADA amount in lovelace.
    pub lovelace: BigUint,
    /// Native assets keyed by unit (policy id hex ++ asset name hex).
    pub assets: BTreeMap<String, BigUint>,
    /// Network id from the address header, if any.
    pub network_id: Option<u8>,
}

impl TxOutput {
    /// Quantity of `unit` held by this output (zero when absent).
    #[must_use]
    pub fn asset_quantity(&self, unit: &str) -> BigUint {
        self.assets.get(unit).cloned().unwrap_or_default()
    }
}

/// Immutable view of a signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    /// Inputs in body order.
    pub inputs: Vec<TxInput>,
    /// Outputs in body order.
    pub outputs: Vec<TxOutput>,
    /// Fee in lovelace.
    pub fee: BigUint,
    /// Slot after which the transaction is invalid.
    pub ttl: Option<u64>,
    /// Body network id if present, else the first output's.
    pub network_id: Option<u8>,
    /// Whether the witness set carries at least one signature.
    pub has_signatures: bool,
    /// Blake2b-256 of the body bytes (hex). The on-chain transaction id.
    pub tx_hash: String,
}

/// Decode standard, padded base64.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidBase64`] for empty or malformed input.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::InvalidBase64);
    }
    STANDARD
        .decode(trimmed)
        .map_err(|_| DecodeError::InvalidBase64)
}

/// Decode a base64 CBOR transaction.
///
/// # Errors
///
/// [`DecodeError::InvalidBase64`] if the transport encoding is bad,
/// [`DecodeError::InvalidCbor`] if the bytes are not a transaction.
pub fn decode(encoded: &str) -> Result<DecodedTransaction, DecodeError> {
    let raw = decode_base64(encoded)?;
    decode_bytes(&raw)
}
