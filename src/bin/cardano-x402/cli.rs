//! Command-line interface definition.

use cardano_x402::config::{default_config_path, FacilitatorConfig, SlotSource};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// x402 payment facilitator for Cardano.
#[derive(Parser, Debug)]
#[command(name = "cardano-x402")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// CAIP-2 network id (cardano:mainnet, cardano:preprod, cardano:preview).
    #[arg(long, short, env = "X402_NETWORK")]
    pub network: Option<String>,

    /// Blockfrost project id.
    #[arg(long, env = "BLOCKFROST_PROJECT_ID", hide_env_values = true)]
    pub blockfrost_project_id: Option<String>,

    /// Blockfrost base URL override.
    #[arg(long, env = "BLOCKFROST_URL")]
    pub blockfrost_url: Option<String>,

    /// Current-slot source for the TTL check.
    #[arg(long, value_enum, env = "X402_SLOT_SOURCE")]
    pub slot_source: Option<CliSlotSource>,

    /// Skip the minimum-UTxO check.
    #[arg(long)]
    pub no_min_utxo: bool,

    /// Log level; overrides the config file. `RUST_LOG` takes precedence
    /// over both.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Facilitator operations. Each reads a JSON request and prints the JSON
/// response on stdout.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a payment without submitting it.
    Verify {
        /// Request file, or `-` for stdin.
        #[arg(default_value = "-")]
        input: PathBuf,
    },
    /// Verify, submit and wait for confirmation.
    Settle {
        /// Request file, or `-` for stdin.
        #[arg(default_value = "-")]
        input: PathBuf,
    },
    /// Look up a transaction's settlement status.
    Status {
        /// Request file, or `-` for stdin.
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

impl Command {
    /// Where the request body comes from.
    pub fn input(&self) -> &Path {
        match self {
            Self::Verify { input } | Self::Settle { input } | Self::Status { input } => input,
        }
    }
}

/// Slot source CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliSlotSource {
    /// Latest block from Blockfrost.
    Chain,
    /// Wall-clock slot arithmetic.
    Clock,
}

impl Cli {
    /// Build the facilitator configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<FacilitatorConfig> {
        // Explicit path, then the default location if present, then defaults
        let mut config = if let Some(ref path) = self.config {
            FacilitatorConfig::from_file(path)?
        } else {
            let path = default_config_path();
            if path.exists() {
                FacilitatorConfig::from_file(&path)?
            } else {
                FacilitatorConfig::default()
            }
        };

        // Override with CLI arguments
        if let Some(ref network) = self.network {
            config.network.clone_from(network);
        }
        if self.blockfrost_project_id.is_some() {
            config
                .blockfrost
                .project_id
                .clone_from(&self.blockfrost_project_id);
        }
        if self.blockfrost_url.is_some() {
            config.blockfrost.base_url.clone_from(&self.blockfrost_url);
        }
        if let Some(source) = self.slot_source {
            config.slot_source = source.into();
        }
        if self.no_min_utxo {
            config.min_utxo.enabled = false;
        }
        if let Some(ref level) = self.log_level {
            config.log_level.clone_from(level);
        }

        config.validate()?;
        Ok(config)
    }
}

impl From<CliSlotSource> for SlotSource {
    fn from(s: CliSlotSource) -> Self {
        match s {
            CliSlotSource::Chain => Self::Chain,
            CliSlotSource::Clock => Self::Clock,
        }
    }
}
