//! Verification pipeline.
//!
//! Ten independent checks run in a fixed order on every call. Nothing
//! short-circuits: a single call reports every problem with the payment.
//!
//! ```text
//! cbor_valid → scheme → network → token_supported → recipient
//!     → amount → min_utxo → witness → ttl → fee
//! ```
//!
//! Early checks write scratch state (decoded transaction, matched output)
//! onto the per-call [`VerificationContext`]; later checks read it. Checks
//! that need a decoded transaction report `cbor_required` when decoding
//! failed.

mod checks;
pub mod oracle;

use crate::config::CardanoNetwork;
use crate::error::Result;
use crate::transaction::DecodedTransaction;
use crate::types::{PaymentRequirements, ReasonCode, VerifyExtensions, VerifyResponse};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use oracle::{MinUtxoOracle, SlotOracle};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Inclusive fee range in lovelace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeBounds {
    /// Lowest accepted fee.
    pub min: BigUint,
    /// Highest accepted fee.
    pub max: BigUint,
}

impl FeeBounds {
    /// Bounds from lovelace amounts.
    #[must_use]
    pub fn new(min: u64, max: u64) -> Self {
        Self {
            min: BigUint::from(min),
            max: BigUint::from(max),
        }
    }
}

/// Name of a pipeline check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckName {
    /// Transaction decodes.
    CborValid,
    /// Scheme is `exact`.
    Scheme,
    /// Network matches configuration.
    Network,
    /// Asset is ADA or registered.
    TokenSupported,
    /// An output pays `payTo`.
    Recipient,
    /// That output pays enough.
    Amount,
    /// That output meets the ledger minimum.
    MinUtxo,
    /// Transaction is signed.
    Witness,
    /// TTL is in the future.
    Ttl,
    /// Fee is within bounds.
    Fee,
}

impl CheckName {
    /// Every check, in execution order.
    pub const ALL: [Self; 10] = [
        Self::CborValid,
        Self::Scheme,
        Self::Network,
        Self::TokenSupported,
        Self::Recipient,
        Self::Amount,
        Self::MinUtxo,
        Self::Witness,
        Self::Ttl,
        Self::Fee,
    ];

    /// Snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CborValid => "cbor_valid",
            Self::Scheme => "scheme",
            Self::Network => "network",
            Self::TokenSupported => "token_supported",
            Self::Recipient => "recipient",
            Self::Amount => "amount",
            Self::MinUtxo => "min_utxo",
            Self::Witness => "witness",
            Self::Ttl => "ttl",
            Self::Fee => "fee",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Which check.
    pub check: CheckName,
    /// Whether it passed.
    pub passed: bool,
    /// Reason, for failures.
    pub reason: Option<ReasonCode>,
    /// Supporting values, all pre-rendered as strings.
    pub detail: Option<BTreeMap<String, String>>,
}

impl CheckResult {
    /// Passing result.
    #[must_use]
    pub fn pass(check: CheckName) -> Self {
        Self {
            check,
            passed: true,
            reason: None,
            detail: None,
        }
    }

    /// Failing result.
    #[must_use]
    pub fn fail(check: CheckName, reason: ReasonCode) -> Self {
        Self {
            check,
            passed: false,
            reason: Some(reason),
            detail: None,
        }
    }

    /// Attach a detail entry.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.detail
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Values written by early checks for later ones.
#[derive(Debug, Default)]
struct Scratch {
    decoded: Option<DecodedTransaction>,
    matched_output: Option<usize>,
    matched_lovelace: Option<BigUint>,
}

/// Everything one verification call needs. Build one per call.
pub struct VerificationContext {
    /// Server requirements.
    pub requirements: PaymentRequirements,
    /// Base64 CBOR transaction.
    pub transaction: String,
    /// Declared payer address.
    pub payer: Option<String>,
    /// When the request arrived.
    pub requested_at: DateTime<Utc>,
    /// Accepted fee range.
    pub fee_bounds: FeeBounds,
    /// Network this facilitator serves.
    pub network: CardanoNetwork,
    /// Current-slot source.
    pub slot_oracle: Arc<dyn SlotOracle>,
    /// Min-UTxO source; the check is skipped without one.
    pub min_utxo_oracle: Option<Arc<dyn MinUtxoOracle>>,
    scratch: Scratch,
}

impl VerificationContext {
    /// New context with empty scratch state.
    #[must_use]
    pub fn new(
        requirements: PaymentRequirements,
        transaction: String,
        network: CardanoNetwork,
        fee_bounds: FeeBounds,
        slot_oracle: Arc<dyn SlotOracle>,
    ) -> Self {
        Self {
            requirements,
            transaction,
            payer: None,
            requested_at: Utc::now(),
            fee_bounds,
            network,
            slot_oracle,
            min_utxo_oracle: None,
            scratch: Scratch::default(),
        }
    }

    /// Set the declared payer.
    #[must_use]
    pub fn with_payer(mut self, payer: Option<String>) -> Self {
        self.payer = payer;
        self
    }

    /// Wire a min-UTxO oracle.
    #[must_use]
    pub fn with_min_utxo_oracle(mut self, oracle: Option<Arc<dyn MinUtxoOracle>>) -> Self {
        self.min_utxo_oracle = oracle;
        self
    }

    /// Decoded transaction, once `cbor_valid` has run successfully.
    #[must_use]
    pub fn decoded(&self) -> Option<&DecodedTransaction> {
        self.scratch.decoded.as_ref()
    }

    /// Index of the output matched by `recipient`.
    #[must_use]
    pub fn matched_output(&self) -> Option<usize> {
        self.scratch.matched_output
    }
}

impl fmt::Debug for VerificationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationContext")
            .field("requirements", &self.requirements)
            .field("payer", &self.payer)
            .field("requested_at", &self.requested_at)
            .field("network", &self.network)
            .field("min_utxo_oracle", &self.min_utxo_oracle.is_some())
            .finish_non_exhaustive()
    }
}

/// Run all ten checks in order and return every result.
///
/// # Errors
///
/// Returns an error only when an oracle fails; payment problems are
/// reported as failed checks.
pub async fn run_checks(ctx: &mut VerificationContext) -> Result<Vec<CheckResult>> {
    ctx.scratch = Scratch::default();
    let results = vec![
        checks::cbor_valid(ctx),
        checks::scheme(ctx),
        checks::network(ctx),
        checks::token_supported(ctx),
        checks::recipient(ctx),
        checks::amount(ctx),
        checks::min_utxo(ctx).await?,
        checks::witness(ctx),
        checks::ttl(ctx).await?,
        checks::fee(ctx),
    ];

    for result in results.iter().filter(|r| !r.passed) {
        debug!(
            "Check {} failed: {}",
            result.check,
            result.reason.map_or("unknown", ReasonCode::as_str)
        );
    }

    Ok(results)
}

/// Verify a payment and build the wire response.
///
/// # Errors
///
/// Returns an error only when an oracle fails.
pub async fn verify(ctx: &mut VerificationContext) -> Result<VerifyResponse> {
    let results = run_checks(ctx).await?;
    let response = build_response(ctx, &results);

    match response.invalid_reason {
        None => info!(
            "Payment verified: tx={} payTo={} amount={}",
            ctx.decoded().map_or("-", |tx| tx.tx_hash.as_str()),
            ctx.requirements.pay_to,
            ctx.requirements.max_amount_required
        ),
        Some(reason) => info!(
            "Payment rejected: reason={} failures={} requested_at={}",
            reason,
            results.iter().filter(|r| !r.passed).count(),
            ctx.requested_at
        ),
    }

    Ok(response)
}

fn build_response(ctx: &VerificationContext, results: &[CheckResult]) -> VerifyResponse {
    let failures: Vec<&CheckResult> = results.iter().filter(|r| !r.passed).collect();

    let Some(first) = failures.first() else {
        return VerifyResponse {
            is_valid: true,
            payer: ctx.payer.clone(),
            invalid_reason: None,
            invalid_message: None,
            extensions: Some(VerifyExtensions::Accepted {
                scheme: ctx.requirements.scheme.clone(),
                amount: ctx.requirements.max_amount_required.clone(),
                pay_to: ctx.requirements.pay_to.clone(),
                tx_hash: ctx
                    .decoded()
                    .map(|tx| tx.tx_hash.clone())
                    .unwrap_or_default(),
            }),
        };
    };

    let reason = first.reason.unwrap_or(ReasonCode::VerificationFailed);
    VerifyResponse {
        is_valid: false,
        payer: ctx.payer.clone(),
        invalid_reason: Some(reason),
        invalid_message: Some(reason.message().to_string()),
        extensions: Some(VerifyExtensions::Rejected {
            errors: failures.iter().filter_map(|r| r.reason).collect(),
            expected: first.detail.clone(),
        }),
    }
}
