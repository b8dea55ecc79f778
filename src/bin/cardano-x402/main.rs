//! cardano-x402 CLI entry point.

mod cli;

use cardano_x402::chain::BlockfrostClient;
use cardano_x402::config::SlotSource;
use cardano_x402::settlement::MemoryStore;
use cardano_x402::verify::oracle::{ClockSlotOracle, MinUtxoOracle, SlotOracle};
use cardano_x402::Facilitator;
use clap::Parser;
use cli::{Cli, Command};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration first so its log level reaches the filter
    let config = cli.to_config()?;

    // Initialize tracing; stdout carries the JSON response
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("cardano-x402 v{}", env!("CARGO_PKG_VERSION"));

    // Build collaborators
    let network = config.cardano_network()?;
    let blockfrost = Arc::new(BlockfrostClient::new(&config.blockfrost, network)?);

    let slot_oracle: Arc<dyn SlotOracle> = match config.slot_source {
        SlotSource::Chain => blockfrost.clone(),
        SlotSource::Clock => Arc::new(ClockSlotOracle::new(network)),
    };
    let min_utxo_oracle: Option<Arc<dyn MinUtxoOracle>> = if config.min_utxo.enabled {
        Some(blockfrost.clone())
    } else {
        None
    };

    let facilitator = Facilitator::new(
        &config,
        blockfrost,
        Arc::new(MemoryStore::new()),
        slot_oracle,
        min_utxo_oracle,
    )?;

    let body = read_input(cli.command.input()).await?;
    let output = match cli.command {
        Command::Verify { .. } => serde_json::to_string_pretty(&facilitator.verify(&body).await?)?,
        Command::Settle { .. } => serde_json::to_string_pretty(&facilitator.settle(&body).await?)?,
        Command::Status { .. } => serde_json::to_string_pretty(&facilitator.status(&body).await?)?,
    };

    println!("{output}");
    Ok(())
}

async fn read_input(path: &Path) -> color_eyre::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        tokio::io::stdin().read_to_end(&mut body).await?;
        Ok(body)
    } else {
        Ok(tokio::fs::read(path).await?)
    }
}
