//! Chain module - network identity and account nonce
//!
//! This module provides:
//! - The [`ChainReader`] seam over the active network
//! - A multi-RPC provider with automatic failover
//! - [`ChainContextProvider`], which fetches fresh context with bounded retries

pub mod provider;

pub use provider::ChainProvider;

use crate::error::PipelineResult;
use crate::pipeline::retry::RetryPolicy;

use async_trait::async_trait;
use ethers::types::Address;
use std::sync::Arc;
use tracing::debug;

/// Network identity and account sequence for one submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContext {
    pub chain_id: u64,
    pub account_address: Address,
    /// Number of transactions already sent from the account
    pub nonce: u64,
}

/// Read access to the active network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Chain ID reported by the network
    async fn chain_id(&self) -> PipelineResult<u64>;

    /// Transaction count of `account` including pending transactions
    async fn pending_nonce(&self, account: Address) -> PipelineResult<u64>;
}

/// Fetches chain context at call time; nothing is cached between attempts
pub struct ChainContextProvider {
    reader: Arc<dyn ChainReader>,
    retry: RetryPolicy,
}

impl ChainContextProvider {
    pub fn new(reader: Arc<dyn ChainReader>, retry: RetryPolicy) -> Self {
        Self { reader, retry }
    }

    /// Chain ID of the active network
    pub async fn chain_id(&self) -> PipelineResult<u64> {
        self.retry
            .run("chain id", || self.reader.chain_id())
            .await
    }

    /// Full context for `account` on the active network
    pub async fn get_context(&self, account: Address) -> PipelineResult<ChainContext> {
        let chain_id = self.chain_id().await?;
        self.context_on(chain_id, account).await
    }

    /// Context for `account` on an already known chain
    pub async fn context_on(&self, chain_id: u64, account: Address) -> PipelineResult<ChainContext> {
        let nonce = self
            .retry
            .run("account nonce", || self.reader.pending_nonce(account))
            .await?;

        debug!(chain_id, %account, nonce, "Fetched chain context");

        Ok(ChainContext {
            chain_id,
            account_address: account,
            nonce,
        })
    }
}
