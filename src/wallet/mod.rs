//! Signing capability
//!
//! Both ways of signing (a local key and a connected external wallet) sit
//! behind [`TransactionSigner`], so the pipeline never branches on which one
//! it holds.
//!
//! Key material is never logged or serialized.

mod local;
mod remote;
mod resolver;

pub use local::{EnvCredential, LocalKeySigner};
pub use remote::RemoteWallet;
pub use resolver::{resolve_key, CredentialSource, KeyResolver};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};
use std::sync::Arc;
use thiserror::Error;

/// Why a signer did not produce a signature
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The holder of the key declined, e.g. the user cancelled in their wallet
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Backend(String),
}

/// Anything that can sign a transaction for one account
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Account whose key produces the signature
    fn address(&self) -> Address;

    /// Chain the signer is bound to, if it is bound to one
    fn chain_id(&self) -> Option<u64>;

    /// Sign the transaction's sighash
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, SignError>;
}

/// Resolved signing credential for one submission attempt
pub type SigningHandle = Box<dyn TransactionSigner>;

/// An external wallet that signs without exposing its key
#[async_trait]
pub trait ConnectedWallet: Send + Sync {
    fn address(&self) -> Address;

    fn chain_id(&self) -> u64;

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, SignError>;
}

/// Signing handle that delegates to a connected wallet
pub struct WalletSigner {
    wallet: Arc<dyn ConnectedWallet>,
}

impl WalletSigner {
    pub fn new(wallet: Arc<dyn ConnectedWallet>) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn chain_id(&self) -> Option<u64> {
        Some(self.wallet.chain_id())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, SignError> {
        self.wallet.sign_transaction(tx).await
    }
}
