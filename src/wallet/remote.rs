//! Connected wallet reached over JSON-RPC
//!
//! Works with external signers that implement `eth_signTransaction`
//! (Clef, Frame, a browser-wallet bridge). The signer returns the raw signed
//! transaction; only its signature is kept, and the pipeline checks it
//! against the transaction it built.

use super::{ConnectedWallet, SignError};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature};
use ethers::utils::rlp::Rlp;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// EIP-1193 "user rejected request"
const USER_REJECTED: i64 = 4001;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<SignTransactionResult>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct SignTransactionResult {
    raw: Bytes,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// External signer holding the key for `address`
pub struct RemoteWallet {
    url: String,
    address: Address,
    chain_id: u64,
    client: reqwest::Client,
}

impl RemoteWallet {
    pub fn new(url: &str, address: Address, chain_id: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            address,
            chain_id,
            client: reqwest::Client::builder()
                // Leaves time for a human to confirm
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ConnectedWallet for RemoteWallet {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, SignError> {
        let mut tx = tx.clone();
        tx.set_from(self.address);

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_signTransaction",
            "params": [tx],
        });

        debug!(signer = %self.address, "Requesting signature from connected wallet");

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SignError::Backend(format!("wallet request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(SignError::Backend(format!(
                "wallet returned status {}",
                resp.status()
            )));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| SignError::Backend(format!("failed to parse wallet response: {}", e)))?;

        if let Some(error) = body.error {
            let message = error.message.to_lowercase();
            if error.code == USER_REJECTED
                || message.contains("rejected")
                || message.contains("denied")
            {
                return Err(SignError::Rejected(error.message));
            }
            return Err(SignError::Backend(format!(
                "wallet error {}: {}",
                error.code, error.message
            )));
        }

        let raw = body
            .result
            .ok_or_else(|| SignError::Backend("wallet returned no result".to_string()))?
            .raw;

        let (_, signature) = TypedTransaction::decode_signed(&Rlp::new(raw.as_ref()))
            .map_err(|e| SignError::Backend(format!("wallet returned undecodable transaction: {}", e)))?;

        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::LocalKeySigner;
    use crate::wallet::{EnvCredential, TransactionSigner};
    use ethers::types::TransactionRequest;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn dev_signer() -> LocalKeySigner {
        EnvCredential::new(DEV_KEY).into_signer().unwrap()
    }

    fn transfer() -> TypedTransaction {
        TypedTransaction::Legacy(
            TransactionRequest::new()
                .to(Address::repeat_byte(0x01))
                .value(1u64)
                .nonce(0u64)
                .gas(21_000u64)
                .gas_price(1_000_000_000u64)
                .chain_id(5u64),
        )
    }

    #[tokio::test]
    async fn test_returns_signature_of_raw_transaction() {
        let local = dev_signer();
        let tx = transfer();
        let signature = local.sign_transaction(&tx).await.unwrap();
        let raw = tx.rlp_signed(&signature);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "eth_signTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "raw": raw, "tx": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let wallet = RemoteWallet::new(&server.uri(), local.address(), 5);
        let returned = wallet.sign_transaction(&tx).await.unwrap();
        assert_eq!(returned.recover(tx.sighash()).unwrap(), local.address());
    }

    #[tokio::test]
    async fn test_user_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": 4001, "message": "User rejected the request." }
            })))
            .mount(&server)
            .await;

        let wallet = RemoteWallet::new(&server.uri(), Address::repeat_byte(0x02), 5);
        assert!(matches!(
            wallet.sign_transaction(&transfer()).await,
            Err(SignError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_other_wallet_errors_are_backend_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "method not found" }
            })))
            .mount(&server)
            .await;

        let wallet = RemoteWallet::new(&server.uri(), Address::repeat_byte(0x02), 5);
        assert!(matches!(
            wallet.sign_transaction(&transfer()).await,
            Err(SignError::Backend(_))
        ));
    }
}
