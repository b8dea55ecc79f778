//! x402 wire types shared by the verify, settle and status operations.
//!
//! All JSON is camelCase. Amounts travel as decimal strings and never as
//! JSON numbers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The only payment scheme this facilitator accepts.
pub const EXACT_SCHEME: &str = "exact";

/// x402 protocol version carried in payment payloads.
pub const X402_VERSION: u32 = 2;

/// Closed vocabulary of reason codes. Consumers branch on these, not on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Transaction is not valid base64.
    InvalidBase64,
    /// Transaction bytes are not a well-formed Cardano transaction.
    InvalidCbor,
    /// Scheme other than `exact`.
    UnsupportedScheme,
    /// Requirements or transaction target another network.
    NetworkMismatch,
    /// Asset is not in the token registry.
    UnsupportedToken,
    /// No output pays the required address.
    RecipientMismatch,
    /// Matched output pays less than required.
    AmountInsufficient,
    /// Matched output is below the ledger minimum.
    MinUtxoInsufficient,
    /// Transaction carries no signature.
    MissingWitness,
    /// Transaction TTL is not after the current slot.
    TransactionExpired,
    /// Fee is outside the configured bounds.
    UnreasonableFee,
    /// Check needs a decoded transaction but decoding failed.
    CborRequired,
    /// Settlement refused because verification failed.
    VerificationFailed,
    /// Chain rejected the transaction as invalid.
    InvalidTransaction,
    /// Chain submission failed for another reason.
    SubmissionRejected,
    /// Transaction was not confirmed within the polling budget.
    ConfirmationTimeout,
    /// Request body was malformed.
    InvalidRequest,
}

impl ReasonCode {
    /// Wire form of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidBase64 => "invalid_base64",
            Self::InvalidCbor => "invalid_cbor",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::NetworkMismatch => "network_mismatch",
            Self::UnsupportedToken => "unsupported_token",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::AmountInsufficient => "amount_insufficient",
            Self::MinUtxoInsufficient => "min_utxo_insufficient",
            Self::MissingWitness => "missing_witness",
            Self::TransactionExpired => "transaction_expired",
            Self::UnreasonableFee => "unreasonable_fee",
            Self::CborRequired => "cbor_required",
            Self::VerificationFailed => "verification_failed",
            Self::InvalidTransaction => "invalid_transaction",
            Self::SubmissionRejected => "submission_rejected",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::InvalidRequest => "invalid_request",
        }
    }

    /// Human-readable message for the code.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidBase64 => "Transaction is not valid base64",
            Self::InvalidCbor => "Transaction could not be decoded as Cardano CBOR",
            Self::UnsupportedScheme => "Only the exact payment scheme is supported",
            Self::NetworkMismatch => "Transaction or requirements target a different network",
            Self::UnsupportedToken => "Payment asset is not supported",
            Self::RecipientMismatch => "No transaction output pays the required address",
            Self::AmountInsufficient => "Payment amount is less than required",
            Self::MinUtxoInsufficient => "Payment output is below the minimum UTxO value",
            Self::MissingWitness => "Transaction is not signed",
            Self::TransactionExpired => "Transaction validity interval has expired",
            Self::UnreasonableFee => "Transaction fee is outside the accepted range",
            Self::CborRequired => "Check requires a decodable transaction",
            Self::VerificationFailed => "Payment verification failed",
            Self::InvalidTransaction => "Transaction was rejected by the network",
            Self::SubmissionRejected => "Transaction submission failed",
            Self::ConfirmationTimeout => "Transaction was not confirmed in time",
            Self::InvalidRequest => "Request body is malformed",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_asset() -> String {
    crate::registry::NATIVE_ASSET.to_string()
}

/// What the resource server wants to be paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme; only `exact` verifies.
    pub scheme: String,
    /// CAIP-2 network id.
    pub network: String,
    /// `native` or `policy.assetname`.
    #[serde(default = "default_asset")]
    pub asset: String,
    /// Required amount as a decimal string (lovelace or token base units).
    pub max_amount_required: String,
    /// Recipient bech32 address.
    pub pay_to: String,
    /// Upper bound on how long the resource server waits for payment.
    pub max_timeout_seconds: u64,
}

impl PaymentRequirements {
    /// Whether the required amount is a non-empty decimal digit string.
    #[must_use]
    pub fn has_decimal_amount(&self) -> bool {
        !self.max_amount_required.is_empty()
            && self.max_amount_required.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Inner payload carried by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactCardanoPayload {
    /// Base64 CBOR of the signed transaction.
    pub transaction: String,
    /// Declared payer address.
    #[serde(default)]
    pub payer: Option<String>,
}

/// Client payment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version; must be [`X402_VERSION`].
    pub x402_version: u32,
    /// Scheme chosen by the client.
    pub scheme: String,
    /// Network chosen by the client.
    pub network: String,
    /// Scheme-specific payload.
    pub payload: ExactCardanoPayload,
}

/// `/verify` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Client payment.
    pub payment_payload: PaymentPayload,
    /// Server requirements.
    pub payment_requirements: PaymentRequirements,
}

/// `/settle` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Base64 CBOR of the signed transaction.
    pub transaction: String,
    /// Server requirements.
    pub payment_requirements: PaymentRequirements,
}

/// `/status` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    /// 64-hex transaction hash.
    pub transaction: String,
    /// Server requirements.
    pub payment_requirements: PaymentRequirements,
}

/// Extensions attached to a verify response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerifyExtensions {
    /// Summary of an accepted payment.
    #[serde(rename_all = "camelCase")]
    Accepted {
        /// Scheme that was verified.
        scheme: String,
        /// Required amount, decimal string.
        amount: String,
        /// Recipient address.
        pay_to: String,
        /// Content hash of the transaction.
        tx_hash: String,
    },
    /// Every failure reason, in check order.
    Rejected {
        /// All failure reasons.
        errors: Vec<ReasonCode>,
        /// Detail of the first failure, if it carried one.
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<BTreeMap<String, String>>,
    },
}

/// `/verify` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether every check passed.
    pub is_valid: bool,
    /// Declared payer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// First failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ReasonCode>,
    /// Human text for `invalid_reason`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_message: Option<String>,
    /// Accepted summary or failure list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<VerifyExtensions>,
}

impl VerifyResponse {
    /// Response for a body that could not be parsed or validated.
    #[must_use]
    pub fn invalid_request() -> Self {
        Self {
            is_valid: false,
            payer: None,
            invalid_reason: Some(ReasonCode::InvalidRequest),
            invalid_message: Some(ReasonCode::InvalidRequest.message().to_string()),
            extensions: None,
        }
    }
}

/// `/settle` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether the transaction is confirmed on-chain.
    pub success: bool,
    /// Transaction hash, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// CAIP-2 network, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl SettleResponse {
    /// Confirmed settlement.
    #[must_use]
    pub fn confirmed(transaction: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction: Some(transaction.into()),
            network: Some(network.into()),
            reason: None,
        }
    }

    /// Failed settlement without a known transaction hash.
    #[must_use]
    pub fn failed(reason: ReasonCode) -> Self {
        Self {
            success: false,
            transaction: None,
            network: None,
            reason: Some(reason),
        }
    }

    /// Submitted but unconfirmed at the time of the answer.
    #[must_use]
    pub fn timed_out(transaction: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: Some(transaction.into()),
            network: None,
            reason: Some(ReasonCode::ConfirmationTimeout),
        }
    }
}

/// Settlement status reported by `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// On-chain.
    Confirmed,
    /// Submitted by this facilitator, not yet seen on-chain.
    Pending,
    /// Unknown to the chain and to this facilitator.
    NotFound,
}

/// `/status` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Current status.
    pub status: TransactionStatus,
    /// Echoed transaction hash.
    pub transaction: String,
    /// Set only for malformed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}
