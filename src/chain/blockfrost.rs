//! Blockfrost-backed chain client.
//!
//! Implements [`ChainClient`] plus both verification oracles:
//!
//! | Capability | Endpoint |
//! |---|---|
//! | submit | `POST /tx/submit` (`application/cbor`) |
//! | confirmation | `GET /txs/{hash}` (404 = not on-chain) |
//! | current slot | `GET /blocks/latest` |
//! | min UTxO | `GET /epochs/latest/parameters` |

use super::{ChainClient, ChainError, TxInfo};
use crate::config::{BlockfrostConfig, CardanoNetwork};
use crate::error::{Error, Result};
use crate::verify::oracle::{min_output_lovelace, MinUtxoOracle, SlotOracle};
use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const PROJECT_ID_HEADER: &str = "project_id";

/// HTTP client for the Blockfrost API.
#[derive(Debug, Clone)]
pub struct BlockfrostClient {
    http: Client,
    base_url: String,
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    hash: String,
    #[serde(default)]
    block_height: Option<u64>,
    #[serde(default)]
    slot: Option<u64>,
    #[serde(default)]
    block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LatestBlock {
    slot: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProtocolParameters {
    coins_per_utxo_size: Option<String>,
}

impl BlockfrostClient {
    /// Build a client for `network`.
    ///
    /// # Errors
    ///
    /// Returns an error if no project id is configured or the HTTP client
    /// cannot be built.
    pub fn new(config: &BlockfrostConfig, network: CardanoNetwork) -> Result<Self> {
        let project_id = config
            .project_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("blockfrost.project_id is required".to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| network.blockfrost_url().to_string());

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> std::result::Result<Option<T>, ChainError> {
        let response = self
            .http
            .get(self.url(path))
            .header(PROJECT_ID_HEADER, &self.project_id)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChainError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ChainError::Unavailable(format!("Malformed response from {path}: {e}")))
    }
}

#[async_trait]
impl ChainClient for BlockfrostClient {
    async fn submit(&self, tx: &[u8]) -> std::result::Result<String, ChainError> {
        debug!("Submitting {} byte transaction to Blockfrost", tx.len());

        let response = self
            .http
            .post(self.url("/tx/submit"))
            .header(PROJECT_ID_HEADER, &self.project_id)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(tx.to_vec())
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Blockfrost rejected submission (HTTP {}): {}", status, message);
            return Err(ChainError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<String>()
            .await
            .map_err(|e| ChainError::Unavailable(format!("Malformed submit response: {e}")))
    }

    async fn get_transaction(
        &self,
        tx_hash: &str,
    ) -> std::result::Result<Option<TxInfo>, ChainError> {
        let tx: Option<TxResponse> = self.get_json(&format!("/txs/{tx_hash}")).await?;
        Ok(tx.map(|tx| TxInfo {
            hash: tx.hash,
            block_height: tx.block_height,
            slot: tx.slot,
            block_time: tx.block_time,
        }))
    }
}

#[async_trait]
impl SlotOracle for BlockfrostClient {
    async fn current_slot(&self) -> Result<u64> {
        let block: Option<LatestBlock> = self.get_json("/blocks/latest").await?;
        block
            .and_then(|b| b.slot)
            .ok_or_else(|| Error::Oracle("latest block has no slot".to_string()))
    }
}

#[async_trait]
impl MinUtxoOracle for BlockfrostClient {
    async fn min_output_value(&self, num_assets: usize) -> Result<BigUint> {
        let params: Option<ProtocolParameters> =
            self.get_json("/epochs/latest/parameters").await?;
        let coins_per_byte = params
            .and_then(|p| p.coins_per_utxo_size)
            .ok_or_else(|| Error::Oracle("protocol parameters lack coins_per_utxo_size".into()))?
            .parse::<u64>()
            .map_err(|e| Error::Oracle(format!("invalid coins_per_utxo_size: {e}")))?;
        Ok(min_output_lovelace(coins_per_byte, num_assets))
    }
}
