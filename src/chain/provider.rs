//! JSON-RPC chain reader with multi-RPC failover

use super::ChainReader;
use crate::config::ChainConfig;
use crate::error::{PipelineError, PipelineResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, BlockId, BlockNumber};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> PipelineResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!(chain_id = config.chain_id, "Added HTTP provider");
                }
                Err(e) => {
                    warn!(chain_id = config.chain_id, "Failed to create provider: {}", e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(PipelineError::NetworkUnavailable(format!(
                "no valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!(chain_id = self.config.chain_id, "Failover to provider {}", next);
    }

    /// Configured chain ID
    pub fn configured_chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.http().get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!(chain_id = self.config.chain_id, "Health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ChainReader for ChainProvider {
    async fn chain_id(&self) -> PipelineResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_chainid().await {
                Ok(id) => {
                    let id = id.as_u64();
                    if id != self.config.chain_id {
                        warn!(
                            expected = self.config.chain_id,
                            actual = id,
                            "RPC endpoint serves a different chain than configured"
                        );
                    }
                    return Ok(id);
                }
                Err(e) => {
                    warn!(chain_id = self.config.chain_id, "Failed to get chain id: {}", e);
                    self.failover();
                }
            }
        }

        Err(PipelineError::NetworkUnavailable(format!(
            "all providers failed to report chain id for chain {}",
            self.config.chain_id
        )))
    }

    async fn pending_nonce(&self, account: Address) -> PipelineResult<u64> {
        let block = Some(BlockId::Number(BlockNumber::Pending));

        for _ in 0..self.http_providers.len() {
            match self.http().get_transaction_count(account, block).await {
                Ok(count) => return Ok(count.as_u64()),
                Err(e) => {
                    warn!(
                        chain_id = self.config.chain_id,
                        %account,
                        "Failed to get transaction count: {}", e
                    );
                    self.failover();
                }
            }
        }

        Err(PipelineError::NetworkUnavailable(format!(
            "all providers failed to report the nonce of {:?}",
            account
        )))
    }
}
