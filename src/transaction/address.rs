//! Shelley address helpers: header network id, bech32 rendering, canonical hex.
//!
//! Two strings can denote the same address (bech32 vs raw hex, upper vs
//! lower case). Comparisons always go through [`canonical_hex`].

use bech32::{FromBase32, ToBase32, Variant};

/// Network id encoded in the address header, if the address type has one.
///
/// Shelley payment addresses (types 0–7) and reward addresses (14, 15)
/// carry it in the low nibble. Byron addresses (type 8) do not.
#[must_use]
pub fn network_id(address: &[u8]) -> Option<u8> {
    let header = *address.first()?;
    match header >> 4 {
        0..=7 | 14 | 15 => Some(header & 0x0f),
        _ => None,
    }
}

fn hrp(address: &[u8]) -> Option<&'static str> {
    let header = *address.first()?;
    let mainnet = header & 0x0f == 1;
    match (header >> 4, mainnet) {
        (0..=7, true) => Some("addr"),
        (0..=7, false) => Some("addr_test"),
        (14 | 15, true) => Some("stake"),
        (14 | 15, false) => Some("stake_test"),
        _ => None,
    }
}

/// Human-readable form of an address.
///
/// Shelley addresses render as bech32; anything else (Byron, unknown
/// header) falls back to hex.
#[must_use]
pub fn to_bech32(address: &[u8]) -> String {
    hrp(address)
        .and_then(|hrp| bech32::encode(hrp, address.to_base32(), Variant::Bech32).ok())
        .unwrap_or_else(|| hex::encode(address))
}

/// Canonical lower-case hex of an address given as bech32 or hex.
#[must_use]
pub fn canonical_hex(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if let Ok((_, data, Variant::Bech32)) = bech32::decode(trimmed) {
        return Vec::<u8>::from_base32(&data).ok().map(hex::encode);
    }
    hex::decode(trimmed).ok().filter(|b| !b.is_empty()).map(hex::encode)
}
