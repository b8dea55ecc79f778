//! CBOR parser for Cardano transactions (Shelley through Conway).
//!
//! ```text
//! transaction = [ body, witness_set, ? is_valid, ? auxiliary_data ]
//! body        = { 0: inputs, 1: outputs, 2: fee, ? 3: ttl, ? 15: network_id, * }
//! output      = [ address, value, * ] / { 0: address, 1: value, * }
//! value       = coin / [ coin, { policy_id => { asset_name => uint } } ]
//! ```
//!
//! Sets may be wrapped in tag 258 and any container may use indefinite
//! length. The decoder borrows the input slice and holds no other state, so
//! nothing needs releasing on error paths.

use super::{address, DecodeError, DecodedTransaction, TxInput, TxOutput};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use minicbor::data::Type;
use minicbor::decode::Error;
use minicbor::Decoder;
use num_bigint::BigUint;
use std::collections::BTreeMap;

type Blake2b256 = Blake2b<U32>;

const TX_HASH_LEN: usize = 32;
const POLICY_ID_LEN: usize = 28;
const MAX_ASSET_NAME_LEN: usize = 32;

/// Decode raw transaction bytes.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidCbor`] carrying the parser message for any
/// structural problem, including trailing bytes.
pub fn decode_bytes(raw: &[u8]) -> Result<DecodedTransaction, DecodeError> {
    parse_transaction(raw).map_err(|e| DecodeError::InvalidCbor(e.to_string()))
}

struct Body {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    fee: u64,
    ttl: Option<u64>,
    network_id: Option<u8>,
}

fn parse_transaction(raw: &[u8]) -> Result<DecodedTransaction, Error> {
    let mut d = Decoder::new(raw);
    let len = d.array()?;
    require_len(len, 2, "transaction")?;

    let start = d.position();
    d.skip()?;
    let body_bytes = &raw[start..d.position()];

    let has_signatures = parse_witness_set(&mut d)?;
    skip_remaining(&mut d, len, 2)?;
    if d.position() != raw.len() {
        return Err(Error::message("trailing bytes after transaction"));
    }

    let body = parse_body(&mut Decoder::new(body_bytes))?;
    let network_id = body
        .network_id
        .or_else(|| body.outputs.first().and_then(|o| o.network_id));

    Ok(DecodedTransaction {
        inputs: body.inputs,
        outputs: body.outputs,
        fee: BigUint::from(body.fee),
        ttl: body.ttl,
        network_id,
        has_signatures,
        tx_hash: hex::encode(Blake2b256::digest(body_bytes)),
    })
}

fn parse_body(d: &mut Decoder<'_>) -> Result<Body, Error> {
    let len = d.map()?;
    let mut inputs = None;
    let mut outputs = None;
    let mut fee = None;
    let mut ttl = None;
    let mut network_id = None;

    each(d, len, |d| {
        match d.u64()? {
            0 => inputs = Some(parse_inputs(d)?),
            1 => outputs = Some(parse_outputs(d)?),
            2 => fee = Some(d.u64()?),
            3 => ttl = Some(d.u64()?),
            15 => network_id = Some(parse_network_id(d)?),
            _ => d.skip()?,
        }
        Ok(())
    })?;

    Ok(Body {
        inputs: inputs.ok_or_else(|| Error::message("transaction body has no inputs"))?,
        outputs: outputs.ok_or_else(|| Error::message("transaction body has no outputs"))?,
        fee: fee.ok_or_else(|| Error::message("transaction body has no fee"))?,
        ttl,
        network_id,
    })
}

fn parse_network_id(d: &mut Decoder<'_>) -> Result<u8, Error> {
    match d.u64()? {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(Error::message(format!("invalid network id {other}"))),
    }
}

fn parse_inputs(d: &mut Decoder<'_>) -> Result<Vec<TxInput>, Error> {
    skip_tags(d)?;
    let len = d.array()?;
    let mut inputs = Vec::new();
    each(d, len, |d| {
        let inner = d.array()?;
        require_len(inner, 2, "input")?;
        let hash = d.bytes()?;
        if hash.len() != TX_HASH_LEN {
            return Err(Error::message(format!(
                "input hash is {} bytes, expected {TX_HASH_LEN}",
                hash.len()
            )));
        }
        let index = d.u64()?;
        skip_remaining(d, inner, 2)?;
        inputs.push(TxInput {
            tx_hash: hex::encode(hash),
            index,
        });
        Ok(())
    })?;
    Ok(inputs)
}

fn parse_outputs(d: &mut Decoder<'_>) -> Result<Vec<TxOutput>, Error> {
    let len = d.array()?;
    let mut outputs = Vec::new();
    each(d, len, |d| {
        outputs.push(parse_output(d)?);
        Ok(())
    })?;
    Ok(outputs)
}

fn parse_output(d: &mut Decoder<'_>) -> Result<TxOutput, Error> {
    match d.datatype()? {
        Type::Array | Type::ArrayIndef => {
            let len = d.array()?;
            require_len(len, 2, "output")?;
            let address = d.bytes()?;
            let (lovelace, assets) = parse_value(d)?;
            skip_remaining(d, len, 2)?;
            build_output(address, lovelace, assets)
        }
        Type::Map | Type::MapIndef => {
            let len = d.map()?;
            let mut address = None;
            let mut value = None;
            each(d, len, |d| {
                match d.u64()? {
                    0 => address = Some(d.bytes()?),
                    1 => value = Some(parse_value(d)?),
                    _ => d.skip()?,
                }
                Ok(())
            })?;
            let address = address.ok_or_else(|| Error::message("output has no address"))?;
            let (lovelace, assets) = value.ok_or_else(|| Error::message("output has no value"))?;
            build_output(address, lovelace, assets)
        }
        other => Err(Error::message(format!("unexpected output type {other:?}"))),
    }
}

fn build_output(
    raw_address: &[u8],
    lovelace: BigUint,
    assets: BTreeMap<String, BigUint>,
) -> Result<TxOutput, Error> {
    if raw_address.is_empty() {
        return Err(Error::message("output address is empty"));
    }
    Ok(TxOutput {
        address_hex: hex::encode(raw_address),
        address: address::to_bech32(raw_address),
        lovelace,
        assets,
        network_id: address::network_id(raw_address),
    })
}

fn parse_value(d: &mut Decoder<'_>) -> Result<(BigUint, BTreeMap<String, BigUint>), Error> {
    match d.datatype()? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok((BigUint::from(d.u64()?), BTreeMap::new())),
        Type::Array | Type::ArrayIndef => {
            let len = d.array()?;
            require_len(len, 2, "value")?;
            let coin = d.u64()?;
            let assets = parse_multiasset(d)?;
            skip_remaining(d, len, 2)?;
            Ok((BigUint::from(coin), assets))
        }
        other => Err(Error::message(format!("unexpected value type {other:?}"))),
    }
}

fn parse_multiasset(d: &mut Decoder<'_>) -> Result<BTreeMap<String, BigUint>, Error> {
    let len = d.map()?;
    let mut assets: BTreeMap<String, BigUint> = BTreeMap::new();
    each(d, len, |d| {
        let policy = d.bytes()?;
        if policy.len() != POLICY_ID_LEN {
            return Err(Error::message(format!(
                "policy id is {} bytes, expected {POLICY_ID_LEN}",
                policy.len()
            )));
        }
        let policy_hex = hex::encode(policy);
        let names = d.map()?;
        each(d, names, |d| {
            let name = d.bytes()?;
            if name.len() > MAX_ASSET_NAME_LEN {
                return Err(Error::message("asset name longer than 32 bytes"));
            }
            let quantity = d.u64()?;
            *assets
                .entry(format!("{policy_hex}{}", hex::encode(name)))
                .or_default() += BigUint::from(quantity);
            Ok(())
        })
    })?;
    Ok(assets)
}

fn parse_witness_set(d: &mut Decoder<'_>) -> Result<bool, Error> {
    let len = d.map()?;
    let mut signatures: u64 = 0;
    each(d, len, |d| {
        match d.u64()? {
            // vkey witnesses, bootstrap witnesses
            0 | 2 => signatures = signatures.saturating_add(count_elements(d)?),
            _ => d.skip()?,
        }
        Ok(())
    })?;
    Ok(signatures > 0)
}

fn count_elements(d: &mut Decoder<'_>) -> Result<u64, Error> {
    skip_tags(d)?;
    let len = d.array()?;
    let mut count: u64 = 0;
    each(d, len, |d| {
        d.skip()?;
        count += 1;
        Ok(())
    })?;
    Ok(count)
}

/// Visit every element of a container whose header was just read. `len` is
/// the element count (entries for maps), `None` for indefinite length.
fn each<'b, F>(d: &mut Decoder<'b>, len: Option<u64>, mut visit: F) -> Result<(), Error>
where
    F: FnMut(&mut Decoder<'b>) -> Result<(), Error>,
{
    match len {
        Some(n) => {
            for _ in 0..n {
                visit(d)?;
            }
        }
        None => loop {
            if d.datatype()? == Type::Break {
                d.set_position(d.position() + 1);
                break;
            }
            visit(d)?;
        },
    }
    Ok(())
}

fn skip_remaining(d: &mut Decoder<'_>, len: Option<u64>, consumed: u64) -> Result<(), Error> {
    each(d, len.map(|n| n.saturating_sub(consumed)), |d| d.skip())
}

fn skip_tags(d: &mut Decoder<'_>) -> Result<(), Error> {
    while d.datatype()? == Type::Tag {
        d.tag()?;
    }
    Ok(())
}

fn require_len(len: Option<u64>, min: u64, what: &str) -> Result<(), Error> {
    match len {
        Some(n) if n < min => Err(Error::message(format!(
            "{what} has {n} elements, expected at least {min}"
        ))),
        _ => Ok(()),
    }
}
