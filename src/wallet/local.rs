//! In-process signing with a raw private key

use super::{SignError, TransactionSigner};
use crate::error::{PipelineError, PipelineResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};
use std::fmt;

/// Private key material read from the environment for a single attempt
pub struct EnvCredential {
    key_hex: String,
}

impl EnvCredential {
    pub fn new(key_hex: impl Into<String>) -> Self {
        Self {
            key_hex: key_hex.into(),
        }
    }

    /// Read the key from `var` right now; `None` if unset or empty
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    /// Consume the credential into a signer
    pub fn into_signer(self) -> PipelineResult<LocalKeySigner> {
        let wallet = self
            .key_hex
            .parse::<LocalWallet>()
            .map_err(|_| PipelineError::SigningFailed("configured private key is malformed".to_string()))?;
        Ok(LocalKeySigner { wallet })
    }
}

impl fmt::Debug for EnvCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvCredential(<redacted>)")
    }
}

/// Signs locally with an in-memory key
pub struct LocalKeySigner {
    wallet: LocalWallet,
}

impl fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.wallet.address())
            .finish()
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn chain_id(&self) -> Option<u64> {
        None
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, SignError> {
        self.wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| SignError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil/hardhat account #0)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_credential_into_signer() {
        let signer = EnvCredential::new(DEV_KEY).into_signer().unwrap();
        assert_eq!(signer.address(), DEV_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(TransactionSigner::chain_id(&signer), None);
    }

    #[test]
    fn test_malformed_key() {
        assert!(matches!(
            EnvCredential::new("0x1234").into_signer(),
            Err(PipelineError::SigningFailed(_))
        ));
    }

    #[test]
    fn test_debug_never_prints_key() {
        let credential = EnvCredential::new(DEV_KEY);
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("ac0974"));

        let signer = credential.into_signer().unwrap();
        let printed = format!("{:?}", signer);
        assert!(!printed.contains("ac0974"));
    }

    #[test]
    fn test_from_env_ignores_blank_values() {
        std::env::set_var("GAS_SNOOZE_TEST_BLANK_KEY", "  ");
        assert!(EnvCredential::from_env("GAS_SNOOZE_TEST_BLANK_KEY").is_none());
        assert!(EnvCredential::from_env("GAS_SNOOZE_TEST_UNSET_KEY").is_none());
    }
}
