//! HTTP client for the gas-threshold relay.
//!
//! Endpoints:
//! - POST /tx  `{ "signed_tx_hex": "0x…", "gwei_threshold": "…" }`
//!
//! The relay stores the payload and broadcasts it once the network gas price
//! is at or below the threshold. This client only hands the payload over.

use crate::config::RelayConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::tx::SignedTransaction;

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Request body of `POST /tx`
#[derive(Debug, Clone, Serialize)]
pub struct RelaySubmission {
    pub signed_tx_hex: String,
    pub gwei_threshold: String,
}

/// Fields of the relay's response that identify the stored transaction
#[derive(Debug, Default, Deserialize)]
struct RelayAck {
    #[serde(alias = "_id", alias = "relay_tx_id")]
    id: Option<serde_json::Value>,
}

/// What the relay acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReceipt {
    /// Relay-assigned identifier for later status tracking
    pub relay_tx_id: String,
    pub tx_hash: H256,
}

/// Relay client for submitting signed transactions
pub struct RelayClient {
    base_url: String,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Submit a signed transaction with the caller's gas threshold.
    ///
    /// The payload is consumed; it must never be resubmitted.
    pub async fn submit(
        &self,
        signed: SignedTransaction,
        min_gas_price_gwei: &str,
    ) -> PipelineResult<RelayReceipt> {
        let url = format!("{}/tx", self.base_url);
        let tx_hash = signed.tx_hash();
        let body = RelaySubmission {
            signed_tx_hex: signed.raw_hex(),
            gwei_threshold: min_gas_price_gwei.to_string(),
        };

        debug!(?tx_hash, gwei_threshold = min_gas_price_gwei, "Submitting to relay");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::SubmissionFailed {
                status: None,
                detail: format!("relay request failed: {}", e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PipelineError::SubmissionFailed {
                status: Some(status.as_u16()),
                detail: if detail.is_empty() {
                    status.to_string()
                } else {
                    detail
                },
            });
        }

        // Body is optional; fall back to the transaction hash
        let ack: RelayAck = resp.json().await.unwrap_or_default();
        let relay_tx_id = match ack.id {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Null) | None => format!("{:?}", tx_hash),
            Some(other) => other.to_string(),
        };

        info!(%relay_tx_id, ?tx_hash, "Relay accepted transaction");

        Ok(RelayReceipt {
            relay_tx_id,
            tx_hash,
        })
    }
}
