//! Token discovery for the form's token selector
//!
//! Discovery is best-effort and independent of the submission pipeline: when
//! it is disabled or failing the form offers only the native asset.

mod alchemy;

pub use alchemy::AlchemyTokenDirectory;

use async_trait::async_trait;
use ethers::types::Address;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Token directory error: {0}")]
pub struct TokenDirectoryError(pub String);

/// One token held by the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u32,
}

/// Source of token metadata
#[async_trait]
pub trait TokenDirectory: Send + Sync {
    async fn list_tokens(
        &self,
        owner: Address,
        chain_id: u64,
    ) -> Result<Vec<TokenInfo>, TokenDirectoryError>;

    /// Decimals of `token` if the directory knows it
    async fn decimals(
        &self,
        owner: Address,
        chain_id: u64,
        token: Address,
    ) -> Result<Option<u32>, TokenDirectoryError> {
        Ok(self
            .list_tokens(owner, chain_id)
            .await?
            .into_iter()
            .find(|t| t.address == token)
            .map(|t| t.decimals))
    }
}

/// Used when token discovery is disabled
pub struct NoTokenDirectory;

#[async_trait]
impl TokenDirectory for NoTokenDirectory {
    async fn list_tokens(
        &self,
        _owner: Address,
        _chain_id: u64,
    ) -> Result<Vec<TokenInfo>, TokenDirectoryError> {
        Ok(Vec::new())
    }
}
