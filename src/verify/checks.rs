//! The ten pipeline checks.

use super::{CheckName, CheckResult, VerificationContext};
use crate::error::Result;
use crate::registry;
use crate::transaction::{self, address, DecodeError};
use crate::types::{ReasonCode, EXACT_SCHEME};
use num_bigint::BigUint;

fn cbor_required(check: CheckName) -> CheckResult {
    CheckResult::fail(check, ReasonCode::CborRequired)
}

fn parse_amount(amount: &str) -> Option<BigUint> {
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(amount.as_bytes(), 10)
}

pub(super) fn cbor_valid(ctx: &mut VerificationContext) -> CheckResult {
    match transaction::decode(&ctx.transaction) {
        Ok(tx) => {
            ctx.scratch.decoded = Some(tx);
            CheckResult::pass(CheckName::CborValid)
        }
        Err(DecodeError::InvalidCbor(message)) => {
            CheckResult::fail(CheckName::CborValid, ReasonCode::InvalidCbor)
                .with("message", message)
        }
        Err(err) => CheckResult::fail(CheckName::CborValid, err.reason()),
    }
}

pub(super) fn scheme(ctx: &VerificationContext) -> CheckResult {
    if ctx.requirements.scheme == EXACT_SCHEME {
        CheckResult::pass(CheckName::Scheme)
    } else {
        CheckResult::fail(CheckName::Scheme, ReasonCode::UnsupportedScheme)
            .with("expected", EXACT_SCHEME)
            .with("actual", &ctx.requirements.scheme)
    }
}

pub(super) fn network(ctx: &VerificationContext) -> CheckResult {
    let expected = ctx.network;
    if ctx.requirements.network != expected.caip2() {
        return CheckResult::fail(CheckName::Network, ReasonCode::NetworkMismatch)
            .with("expected", expected.caip2())
            .with("actual", &ctx.requirements.network);
    }

    let Some(tx) = ctx.scratch.decoded.as_ref() else {
        return cbor_required(CheckName::Network);
    };

    match tx.network_id {
        Some(id) if id == expected.network_id() => CheckResult::pass(CheckName::Network),
        other => CheckResult::fail(CheckName::Network, ReasonCode::NetworkMismatch)
            .with("expected", expected.network_id())
            .with(
                "actual",
                other.map_or_else(|| "unknown".to_string(), |id| id.to_string()),
            ),
    }
}

pub(super) fn token_supported(ctx: &VerificationContext) -> CheckResult {
    let asset = &ctx.requirements.asset;
    if !registry::is_token_payment(asset) || registry::lookup(&registry::to_unit(asset)).is_some()
    {
        CheckResult::pass(CheckName::TokenSupported)
    } else {
        CheckResult::fail(CheckName::TokenSupported, ReasonCode::UnsupportedToken)
            .with("asset", asset)
    }
}

fn recipient_mismatch(pay_to: &str) -> CheckResult {
    CheckResult::fail(CheckName::Recipient, ReasonCode::RecipientMismatch).with("payTo", pay_to)
}

pub(super) fn recipient(ctx: &mut VerificationContext) -> CheckResult {
    let Some(tx) = ctx.scratch.decoded.as_ref() else {
        return cbor_required(CheckName::Recipient);
    };
    let Some(expected) = address::canonical_hex(&ctx.requirements.pay_to) else {
        return recipient_mismatch(&ctx.requirements.pay_to);
    };

    let matched = tx
        .outputs
        .iter()
        .enumerate()
        .find(|(_, output)| output.address_hex == expected)
        .map(|(index, output)| (index, output.lovelace.clone()));

    let Some((index, lovelace)) = matched else {
        return recipient_mismatch(&ctx.requirements.pay_to);
    };
    ctx.scratch.matched_output = Some(index);
    ctx.scratch.matched_lovelace = Some(lovelace);
    CheckResult::pass(CheckName::Recipient)
}

pub(super) fn amount(ctx: &VerificationContext) -> CheckResult {
    let Some(tx) = ctx.scratch.decoded.as_ref() else {
        return cbor_required(CheckName::Amount);
    };
    let raw_required = &ctx.requirements.max_amount_required;
    let Some(required) = parse_amount(raw_required) else {
        return CheckResult::fail(CheckName::Amount, ReasonCode::AmountInsufficient)
            .with("required", raw_required)
            .with("message", "required amount is not a decimal integer");
    };

    let asset = &ctx.requirements.asset;
    let output = ctx.scratch.matched_output.and_then(|i| tx.outputs.get(i));
    let actual = match output {
        None => BigUint::default(),
        Some(output) if registry::is_token_payment(asset) => {
            output.asset_quantity(&registry::to_unit(asset))
        }
        Some(output) => output.lovelace.clone(),
    };

    if output.is_some() && actual >= required {
        CheckResult::pass(CheckName::Amount)
    } else {
        CheckResult::fail(CheckName::Amount, ReasonCode::AmountInsufficient)
            .with("asset", asset)
            .with("required", &required)
            .with("actual", &actual)
    }
}

pub(super) async fn min_utxo(ctx: &VerificationContext) -> Result<CheckResult> {
    let Some(oracle) = ctx.min_utxo_oracle.as_ref() else {
        return Ok(CheckResult::pass(CheckName::MinUtxo));
    };
    let Some(actual) = ctx.scratch.matched_lovelace.as_ref() else {
        return Ok(CheckResult::pass(CheckName::MinUtxo));
    };

    let num_assets = usize::from(registry::is_token_payment(&ctx.requirements.asset));
    let required = oracle.min_output_value(num_assets).await?;

    if *actual >= required {
        Ok(CheckResult::pass(CheckName::MinUtxo))
    } else {
        Ok(
            CheckResult::fail(CheckName::MinUtxo, ReasonCode::MinUtxoInsufficient)
                .with("required", &required)
                .with("actual", actual)
                .with(
                    "message",
                    format!("output holds {actual} lovelace, minimum is {required}"),
                ),
        )
    }
}

pub(super) fn witness(ctx: &VerificationContext) -> CheckResult {
    match ctx.scratch.decoded.as_ref() {
        None => cbor_required(CheckName::Witness),
        Some(tx) if tx.has_signatures => CheckResult::pass(CheckName::Witness),
        Some(_) => CheckResult::fail(CheckName::Witness, ReasonCode::MissingWitness),
    }
}

pub(super) async fn ttl(ctx: &VerificationContext) -> Result<CheckResult> {
    let Some(tx) = ctx.scratch.decoded.as_ref() else {
        return Ok(cbor_required(CheckName::Ttl));
    };
    let Some(ttl) = tx.ttl else {
        return Ok(CheckResult::pass(CheckName::Ttl));
    };

    let current = ctx.slot_oracle.current_slot().await?;
    if ttl > current {
        Ok(CheckResult::pass(CheckName::Ttl))
    } else {
        Ok(
            CheckResult::fail(CheckName::Ttl, ReasonCode::TransactionExpired)
                .with("ttl", ttl)
                .with("currentSlot", current),
        )
    }
}

pub(super) fn fee(ctx: &VerificationContext) -> CheckResult {
    let Some(tx) = ctx.scratch.decoded.as_ref() else {
        return cbor_required(CheckName::Fee);
    };
    let bounds = &ctx.fee_bounds;
    if bounds.min <= tx.fee && tx.fee <= bounds.max {
        CheckResult::pass(CheckName::Fee)
    } else {
        CheckResult::fail(CheckName::Fee, ReasonCode::UnreasonableFee)
            .with("fee", &tx.fee)
            .with("min", &bounds.min)
            .with("max", &bounds.max)
    }
}
