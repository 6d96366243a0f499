//! Alchemy-compatible token metadata client
//!
//! Uses the enhanced JSON-RPC methods `alchemy_getTokenBalances` and
//! `alchemy_getTokenMetadata`.

use super::{TokenDirectory, TokenDirectoryError, TokenInfo};
use crate::tx::units::MAX_DECIMALS;

use async_trait::async_trait;
use ethers::types::Address;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalances {
    token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalance {
    contract_address: Address,
}

#[derive(Debug, Deserialize)]
struct TokenMetadata {
    symbol: Option<String>,
    decimals: Option<u32>,
}

/// Token directory backed by an Alchemy-style endpoint for one network
pub struct AlchemyTokenDirectory {
    url: String,
    chain_id: u64,
    client: reqwest::Client,
}

impl AlchemyTokenDirectory {
    /// `url` includes the API key, e.g. `https://polygon-mainnet.g.alchemy.com/v2/<key>`
    pub fn new(url: &str, chain_id: u64) -> Self {
        Self {
            url: url.to_string(),
            chain_id,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, TokenDirectoryError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TokenDirectoryError(format!("{} request failed: {}", method, e)))?;

        if !resp.status().is_success() {
            return Err(TokenDirectoryError(format!(
                "{} returned status {}",
                method,
                resp.status()
            )));
        }

        let body: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| TokenDirectoryError(format!("failed to parse {} response: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(TokenDirectoryError(format!("{}: {}", method, error.message)));
        }

        body.result
            .ok_or_else(|| TokenDirectoryError(format!("{} returned no result", method)))
    }

    fn check_chain(&self, chain_id: u64) -> Result<(), TokenDirectoryError> {
        if chain_id != self.chain_id {
            return Err(TokenDirectoryError(format!(
                "directory serves chain {}, not {}",
                self.chain_id, chain_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenDirectory for AlchemyTokenDirectory {
    async fn list_tokens(
        &self,
        owner: Address,
        chain_id: u64,
    ) -> Result<Vec<TokenInfo>, TokenDirectoryError> {
        self.check_chain(chain_id)?;

        let balances: TokenBalances = self
            .call("alchemy_getTokenBalances", serde_json::json!([owner]))
            .await?;

        let lookups = balances.token_balances.iter().map(|balance| {
            let address = balance.contract_address;
            async move {
                let metadata: Result<TokenMetadata, _> = self
                    .call("alchemy_getTokenMetadata", serde_json::json!([address]))
                    .await;
                (address, metadata)
            }
        });

        let mut tokens = Vec::new();
        for (address, metadata) in futures::future::join_all(lookups).await {
            match metadata {
                Ok(TokenMetadata {
                    symbol: Some(symbol),
                    decimals: Some(decimals),
                }) if decimals <= MAX_DECIMALS => tokens.push(TokenInfo {
                    address,
                    symbol,
                    decimals,
                }),
                Ok(_) => debug!(token = ?address, "Skipping token with unusable metadata"),
                Err(e) => warn!(token = ?address, "Token metadata lookup failed: {}", e),
            }
        }

        debug!(owner = ?owner, count = tokens.len(), "Listed wallet tokens");
        Ok(tokens)
    }

    /// Metadata for the one contract, whether or not the owner holds it
    async fn decimals(
        &self,
        _owner: Address,
        chain_id: u64,
        token: Address,
    ) -> Result<Option<u32>, TokenDirectoryError> {
        self.check_chain(chain_id)?;

        let metadata: TokenMetadata = self
            .call("alchemy_getTokenMetadata", serde_json::json!([token]))
            .await?;

        match metadata.decimals {
            Some(decimals) if decimals > MAX_DECIMALS => Err(TokenDirectoryError(format!(
                "token {:?} reports {} decimals",
                token, decimals
            ))),
            decimals => Ok(decimals),
        }
    }
}
