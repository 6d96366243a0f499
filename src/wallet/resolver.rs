//! Key resolution for the active account

use super::{ConnectedWallet, EnvCredential, SigningHandle, WalletSigner};
use crate::error::{PipelineError, PipelineResult};

use std::sync::Arc;
use tracing::debug;

/// Where the signing credential for an attempt comes from
pub enum CredentialSource {
    Env(EnvCredential),
    Wallet(Arc<dyn ConnectedWallet>),
    None,
}

/// Turn a credential source into a signing handle
pub fn resolve_key(source: CredentialSource) -> PipelineResult<SigningHandle> {
    match source {
        CredentialSource::Env(credential) => Ok(Box::new(credential.into_signer()?)),
        CredentialSource::Wallet(wallet) => Ok(Box::new(WalletSigner::new(wallet))),
        CredentialSource::None => Err(PipelineError::NoActiveAccount),
    }
}

/// Picks the credential for each attempt.
///
/// A connected wallet wins over a configured key. The key is read from the
/// environment at resolve time and lives only as long as the returned handle.
#[derive(Clone, Default)]
pub struct KeyResolver {
    wallet: Option<Arc<dyn ConnectedWallet>>,
    key_env: Option<String>,
}

impl KeyResolver {
    pub fn new(wallet: Option<Arc<dyn ConnectedWallet>>, key_env: Option<String>) -> Self {
        Self { wallet, key_env }
    }

    /// Credential source available right now
    pub fn source(&self) -> CredentialSource {
        if let Some(wallet) = &self.wallet {
            return CredentialSource::Wallet(wallet.clone());
        }

        match self.key_env.as_deref().and_then(EnvCredential::from_env) {
            Some(credential) => CredentialSource::Env(credential),
            None => CredentialSource::None,
        }
    }

    /// Resolve a signing handle for one attempt
    pub async fn resolve(&self) -> PipelineResult<SigningHandle> {
        let handle = resolve_key(self.source())?;
        debug!(account = %handle.address(), "Resolved signing key");
        Ok(handle)
    }
}
