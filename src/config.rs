//! Configuration for the facilitator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Cardano network served by this facilitator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardanoNetwork {
    /// Mainnet (`cardano:mainnet`, network id 1).
    Mainnet,
    /// Pre-production testnet (`cardano:preprod`, network id 0).
    Preprod,
    /// Preview testnet (`cardano:preview`, network id 0).
    Preview,
}

impl CardanoNetwork {
    /// CAIP-2 identifier.
    #[must_use]
    pub fn caip2(self) -> &'static str {
        match self {
            Self::Mainnet => "cardano:mainnet",
            Self::Preprod => "cardano:preprod",
            Self::Preview => "cardano:preview",
        }
    }

    /// Network id as carried in address headers and transaction bodies.
    #[must_use]
    pub fn network_id(self) -> u8 {
        match self {
            Self::Mainnet => 1,
            Self::Preprod | Self::Preview => 0,
        }
    }

    /// Default Blockfrost API base URL.
    #[must_use]
    pub fn blockfrost_url(self) -> &'static str {
        match self {
            Self::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
            Self::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Self::Preview => "https://cardano-preview.blockfrost.io/api/v0",
        }
    }

    /// Unix time of the network's (virtual) slot zero under one-second slots.
    #[must_use]
    pub fn slot_zero_unix(self) -> i64 {
        match self {
            Self::Mainnet => 1_591_566_291,
            Self::Preprod => 1_655_769_600,
            Self::Preview => 1_666_656_000,
        }
    }

    /// Slot at the given unix time (saturating at zero).
    #[must_use]
    pub fn slot_at(self, unix_secs: i64) -> u64 {
        u64::try_from(unix_secs - self.slot_zero_unix()).unwrap_or(0)
    }
}

impl fmt::Display for CardanoNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.caip2())
    }
}

impl FromStr for CardanoNetwork {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "cardano:mainnet" => Ok(Self::Mainnet),
            "cardano:preprod" => Ok(Self::Preprod),
            "cardano:preview" => Ok(Self::Preview),
            other => Err(crate::Error::Config(format!(
                "Unsupported network: {other}"
            ))),
        }
    }
}

/// Where the current slot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotSource {
    /// Latest block reported by the chain API.
    #[default]
    Chain,
    /// Wall clock and the network's slot-zero time.
    Clock,
}

/// Facilitator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// CAIP-2 network id.
    #[serde(default = "default_network")]
    pub network: String,

    /// Accepted fee range.
    #[serde(default)]
    pub fees: FeeConfig,

    /// Blockfrost access.
    #[serde(default)]
    pub blockfrost: BlockfrostConfig,

    /// Minimum-UTxO check.
    #[serde(default)]
    pub min_utxo: MinUtxoConfig,

    /// Current-slot source for the TTL check.
    #[serde(default)]
    pub slot_source: SlotSource,

    /// Capacity of the confirmed-transaction cache.
    #[serde(default = "default_cache_capacity")]
    pub confirmed_cache_capacity: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Fee bounds in lovelace, inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Lowest accepted fee.
    #[serde(default = "default_fee_min")]
    pub min_lovelace: u64,

    /// Highest accepted fee.
    #[serde(default = "default_fee_max")]
    pub max_lovelace: u64,
}

/// Blockfrost API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockfrostConfig {
    /// Project id sent as the `project_id` header.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Base URL override; defaults to the network's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Minimum-UTxO check configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MinUtxoConfig {
    /// Wire the min-UTxO oracle into verification.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            fees: FeeConfig::default(),
            blockfrost: BlockfrostConfig::default(),
            min_utxo: MinUtxoConfig::default(),
            slot_source: SlotSource::default(),
            confirmed_cache_capacity: default_cache_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            min_lovelace: default_fee_min(),
            max_lovelace: default_fee_max(),
        }
    }
}

impl Default for BlockfrostConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            base_url: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for MinUtxoConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_network() -> String {
    CardanoNetwork::Preprod.caip2().to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_fee_min() -> u64 {
    150_000
}

const fn default_fee_max() -> u64 {
    2_000_000
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_cache_capacity() -> usize {
    10_000
}

const fn default_true() -> bool {
    true
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "cardano-x402")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("cardano-x402.toml"))
}

impl FacilitatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed network.
    ///
    /// # Errors
    ///
    /// Returns an error if `network` is not a supported CAIP-2 id.
    pub fn cardano_network(&self) -> crate::Result<CardanoNetwork> {
        self.network.parse()
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown network or an inverted fee range.
    pub fn validate(&self) -> crate::Result<()> {
        self.cardano_network()?;
        if self.fees.min_lovelace > self.fees.max_lovelace {
            return Err(crate::Error::Config(format!(
                "fees.min_lovelace ({}) exceeds fees.max_lovelace ({})",
                self.fees.min_lovelace, self.fees.max_lovelace
            )));
        }
        Ok(())
    }
}
