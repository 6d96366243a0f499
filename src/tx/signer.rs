//! Signing of built transactions

use super::builder::UnsignedTransaction;
use crate::error::{PipelineError, PipelineResult};
use crate::wallet::{SignError, TransactionSigner};

use ethers::types::{Bytes, H256};
use sha3::{Digest, Keccak256};
use tracing::debug;

/// Serialized signed transaction, ready for broadcast
#[derive(Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    raw: Bytes,
}

impl SignedTransaction {
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// `0x`-prefixed hex encoding of the raw transaction
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// Hash the network will know the transaction by
    pub fn tx_hash(&self) -> H256 {
        H256::from_slice(&Keccak256::digest(&self.raw))
    }
}

impl std::fmt::Debug for SignedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTransaction")
            .field("tx_hash", &self.tx_hash())
            .field("len", &self.raw.len())
            .finish()
    }
}

/// Sign `tx` with `handle`.
///
/// The signature must recover to the handle's account; a wallet that signed
/// anything other than the built transaction is treated as a failure.
pub async fn sign(
    tx: UnsignedTransaction,
    handle: &dyn TransactionSigner,
) -> PipelineResult<SignedTransaction> {
    let typed = tx.to_typed();

    let signature = handle
        .sign_transaction(&typed)
        .await
        .map_err(|e| match e {
            SignError::Rejected(msg) => PipelineError::SigningRejected(msg),
            SignError::Backend(msg) => PipelineError::SigningFailed(msg),
        })?;

    let recovered = signature
        .recover(typed.sighash())
        .map_err(|e| PipelineError::SigningFailed(format!("invalid signature: {}", e)))?;

    if recovered != handle.address() {
        return Err(PipelineError::SigningFailed(format!(
            "signature recovers to {:?}, expected {:?}",
            recovered,
            handle.address()
        )));
    }

    let signed = SignedTransaction {
        raw: typed.rlp_signed(&signature),
    };
    debug!(tx_hash = ?signed.tx_hash(), nonce = tx.nonce, "Signed transaction");

    Ok(signed)
}
