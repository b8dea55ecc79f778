//! Static allow-list of native assets accepted besides ADA.
//!
//! Tokens are identified internally by their *unit*: the 28-byte policy id
//! in hex followed directly by the asset name in hex. The wire form used in
//! payment requirements is `policy.assetname`.
//!
//! The list is compiled in. Accepting a new token means changing this file
//! and shipping a release.

/// Sentinel asset meaning lovelace (ADA).
pub const NATIVE_ASSET: &str = "native";

/// Length of a policy id in hex characters.
pub const POLICY_ID_HEX_LEN: usize = 56;

/// A supported native asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEntry {
    /// Minting policy id (hex).
    pub policy_id: &'static str,
    /// Asset name (hex).
    pub asset_name: &'static str,
    /// Ticker.
    pub symbol: &'static str,
    /// Display decimals.
    pub decimals: u8,
}

impl TokenEntry {
    /// Concatenated unit for this token.
    #[must_use]
    pub fn unit(&self) -> String {
        format!("{}{}", self.policy_id, self.asset_name)
    }

    fn matches_unit(&self, unit: &str) -> bool {
        unit.len() == self.policy_id.len() + self.asset_name.len()
            && unit.starts_with(self.policy_id)
            && unit.ends_with(self.asset_name)
    }
}

static TOKENS: &[TokenEntry] = &[
    // USDM (CIP-67 fungible label 333)
    TokenEntry {
        policy_id: "c48cbb3d5e57ed56e276bc45f99ab39abe94e6cd7ac39fb402da47ad",
        asset_name: "0014df105553444d",
        symbol: "USDM",
        decimals: 6,
    },
    // DJED
    TokenEntry {
        policy_id: "8db269c3ec630e06ae29f74bc39edd1f87c819f1056206e879a1cd61",
        asset_name: "446a65644d6963726f555344",
        symbol: "DJED",
        decimals: 6,
    },
    // iUSD
    TokenEntry {
        policy_id: "f66d78b4a3cb3d37afa0ec36461e51ecbde00f26c8f0a68f94b69880",
        asset_name: "69555344",
        symbol: "iUSD",
        decimals: 6,
    },
];

/// Whether `asset` names a native token rather than ADA.
#[must_use]
pub fn is_token_payment(asset: &str) -> bool {
    asset != NATIVE_ASSET
}

/// Convert the wire form `policy.assetname` into a unit.
///
/// Input without a separator is taken to already be a unit. Hex is
/// lower-cased so units compare equal to decoder output.
#[must_use]
pub fn to_unit(asset: &str) -> String {
    match asset.split_once('.') {
        Some((policy, name)) => format!("{policy}{name}"),
        None => asset.to_string(),
    }
    .to_ascii_lowercase()
}

/// Find a registry entry by unit.
#[must_use]
pub fn lookup(unit: &str) -> Option<&'static TokenEntry> {
    if unit.len() < POLICY_ID_HEX_LEN {
        return None;
    }
    TOKENS.iter().find(|t| t.matches_unit(unit))
}

/// All supported tokens.
#[must_use]
pub fn tokens() -> &'static [TokenEntry] {
    TOKENS
}
