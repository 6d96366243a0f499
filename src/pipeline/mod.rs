//! Submission pipeline
//!
//! One attempt runs validate, then key resolution alongside the chain id
//! query, then the per-account guard, fresh context, build, sign and relay.
//! Every attempt ends in exactly one feedback notification.

pub mod guard;
pub mod retry;

pub use guard::SubmissionGuard;
pub use retry::RetryPolicy;

use crate::chain::{ChainContext, ChainContextProvider};
use crate::error::{PipelineError, PipelineResult};
use crate::feedback::{FeedbackKind, FeedbackSink, LogFeedback};
use crate::metrics;
use crate::relay::RelayClient;
use crate::tokens::{NoTokenDirectory, TokenDirectory};
use crate::tx::units::{format_units, NATIVE_DECIMALS};
use crate::tx::{self, GasEstimator, NonceManager, TransactionBuilder};
use crate::validation::{self, FormFields};
use crate::wallet::KeyResolver;

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What the relay accepted for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    /// Correlates the receipt with the attempt's log span
    pub attempt_id: Uuid,
    pub relay_tx_id: String,
    pub tx_hash: H256,
    pub account: Address,
    pub chain_id: u64,
    pub nonce: u64,
    pub accepted_at: DateTime<Utc>,
}

/// Terminal result of one submission attempt
#[derive(Debug)]
pub enum SubmissionOutcome {
    Accepted(SubmissionReceipt),
    Failed(PipelineError),
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            SubmissionOutcome::Accepted(_) => None,
            SubmissionOutcome::Failed(e) => Some(e),
        }
    }
}

/// Turns form input into a signed transaction held by the relay
pub struct SubmissionPipeline {
    keys: KeyResolver,
    context: ChainContextProvider,
    nonces: NonceManager,
    guard: SubmissionGuard,
    builder: TransactionBuilder,
    tokens: Arc<dyn TokenDirectory>,
    relay: RelayClient,
    feedback: Arc<dyn FeedbackSink>,
}

impl SubmissionPipeline {
    pub fn new(
        keys: KeyResolver,
        context: ChainContextProvider,
        builder: TransactionBuilder,
        relay: RelayClient,
    ) -> Self {
        Self {
            keys,
            context,
            nonces: NonceManager::new(),
            guard: SubmissionGuard::new(),
            builder,
            tokens: Arc::new(NoTokenDirectory),
            relay,
            feedback: Arc::new(LogFeedback),
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenDirectory>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    pub fn context(&self) -> &ChainContextProvider {
        &self.context
    }

    pub fn tokens(&self) -> &Arc<dyn TokenDirectory> {
        &self.tokens
    }

    /// Run one attempt to completion
    pub async fn submit(&self, form: &FormFields) -> SubmissionOutcome {
        let attempt_id = Uuid::new_v4();
        let span = info_span!("submission", attempt = %attempt_id);

        async {
            let _in_flight = metrics::InFlight::start();

            match self.run(attempt_id, form).await {
                Ok(receipt) => {
                    info!(
                        relay_tx_id = %receipt.relay_tx_id,
                        tx_hash = ?receipt.tx_hash,
                        nonce = receipt.nonce,
                        "Submission accepted"
                    );
                    metrics::record_submission("accepted");
                    self.feedback.notify(
                        FeedbackKind::Success,
                        &format!(
                            "Transaction {:?} is snoozed with the relay (id {}, nonce {})",
                            receipt.tx_hash, receipt.relay_tx_id, receipt.nonce
                        ),
                    );
                    SubmissionOutcome::Accepted(receipt)
                }
                Err(e) => self.fail(e),
            }
        }
        .instrument(span)
        .await
    }

    /// End an attempt with `error`, including one that never got past decoding
    pub fn fail(&self, error: PipelineError) -> SubmissionOutcome {
        match &error {
            PipelineError::Validation(v) => debug!("Rejected form: {}", v),
            other => warn!(
                kind = other.kind(),
                retryable = other.is_retryable(),
                "Submission failed: {}",
                other
            ),
        }
        metrics::record_submission(error.kind());
        self.feedback.notify(FeedbackKind::Error, &error.to_string());
        SubmissionOutcome::Failed(error)
    }

    async fn run(&self, attempt_id: Uuid, form: &FormFields) -> PipelineResult<SubmissionReceipt> {
        let request = validation::validate(form)?;

        let (handle, chain_id) = futures::join!(self.keys.resolve(), self.context.chain_id());
        let handle = handle?;
        let chain_id = chain_id?;
        let account = handle.address();

        if let Some(wallet_chain) = handle.chain_id() {
            if wallet_chain != chain_id {
                return Err(PipelineError::ChainMismatch {
                    wallet: wallet_chain,
                    network: chain_id,
                });
            }
        }

        let _permit = self.guard.try_acquire(account)?;

        let fetched = self.context.context_on(chain_id, account).await?;
        let reservation = self.nonces.reserve(chain_id, account, fetched.nonce);
        let ctx = ChainContext {
            nonce: reservation.nonce(),
            ..fetched
        };

        let token_decimals = match request.token_address {
            Some(token) => self.token_decimals(account, chain_id, token).await,
            None => None,
        };

        let unsigned = self.builder.build(&request, &ctx, token_decimals)?;
        debug!(
            to = ?unsigned.to,
            nonce = unsigned.nonce,
            gas_limit = %unsigned.gas_limit,
            max_cost_eth = %format_units(
                GasEstimator::calculate_cost(unsigned.gas_limit, &unsigned.fee),
                NATIVE_DECIMALS
            ),
            "Built transaction"
        );

        let started = Instant::now();
        let signed = tx::sign(unsigned, &*handle).await?;
        metrics::record_step_latency("sign", started.elapsed().as_secs_f64());
        drop(handle);

        // From here on the payload may reach the network
        let committed = reservation.commit();

        let started = Instant::now();
        let result = self.relay.submit(signed, &request.max_gas_price_gwei).await;
        metrics::record_step_latency("relay", started.elapsed().as_secs_f64());

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                if let PipelineError::SubmissionFailed {
                    status: Some(400..=499),
                    ..
                } = &e
                {
                    committed.revoke();
                }
                return Err(e);
            }
        };

        Ok(SubmissionReceipt {
            attempt_id,
            relay_tx_id: receipt.relay_tx_id,
            tx_hash: receipt.tx_hash,
            account,
            chain_id,
            nonce: committed.nonce(),
            accepted_at: Utc::now(),
        })
    }

    /// Token precision, or `None` to fall back to the default
    async fn token_decimals(&self, owner: Address, chain_id: u64, token: Address) -> Option<u32> {
        match self.tokens.decimals(owner, chain_id, token).await {
            Ok(Some(decimals)) => Some(decimals),
            Ok(None) => {
                warn!(?token, "Token not listed for account, assuming {} decimals", NATIVE_DECIMALS);
                None
            }
            Err(e) => {
                warn!(?token, "Token lookup failed, assuming {} decimals: {}", NATIVE_DECIMALS, e);
                metrics::record_token_lookup_failure(chain_id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainReader;
    use crate::config::{GasPriceStrategy, RelayConfig};
    use crate::feedback::testing::RecordingSink;
    use crate::tokens::{TokenDirectoryError, TokenInfo};
    use crate::wallet::{ConnectedWallet, SignError};
    use async_trait::async_trait;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::{Signature, U256};
    use ethers::utils::rlp::Rlp;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const DEST: &str = "0xAbC0000000000000000000000000000000000001";
    const TOKEN: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";

    fn form(amount: &str, token: &str, destination: &str) -> FormFields {
        FormFields {
            amount: Some(amount.to_string()),
            token_address: Some(token.to_string()),
            destination_address: Some(destination.to_string()),
            max_gas: Some("20".to_string()),
        }
    }

    fn reader(chain_id: u64, nonce: u64) -> MockChainReader {
        let mut reader = MockChainReader::new();
        reader.expect_chain_id().returning(move || Ok(chain_id));
        reader.expect_pending_nonce().returning(move |_| Ok(nonce));
        reader
    }

    /// Key resolver backed by a per-test environment variable
    fn env_keys(var: &str) -> KeyResolver {
        std::env::set_var(var, DEV_KEY);
        KeyResolver::new(None, Some(var.to_string()))
    }

    fn pipeline(
        keys: KeyResolver,
        reader: MockChainReader,
        relay_url: &str,
        sink: Arc<RecordingSink>,
    ) -> SubmissionPipeline {
        let estimator = GasEstimator::new(GasPriceStrategy::Legacy, "2").unwrap();
        SubmissionPipeline::new(
            keys,
            ChainContextProvider::new(Arc::new(reader), RetryPolicy::new(2, 1, 2)),
            TransactionBuilder::new(estimator),
            RelayClient::new(&RelayConfig {
                url: relay_url.to_string(),
                timeout_ms: 5_000,
            }),
        )
        .with_feedback(sink)
    }

    async fn relay_accepting(id: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "_id": id })))
            .mount(&server)
            .await;
        server
    }

    /// Decode the transactions the relay received, with their thresholds
    async fn relayed(server: &MockServer) -> Vec<(TypedTransaction, String)> {
        let mut out = Vec::new();
        for request in server.received_requests().await.unwrap_or_default() {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let raw = hex::decode(body["signed_tx_hex"].as_str().unwrap().trim_start_matches("0x")).unwrap();
            let (tx, _) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
            out.push((tx, body["gwei_threshold"].as_str().unwrap().to_string()));
        }
        out
    }

    fn account() -> Address {
        DEV_ACCOUNT.parse().unwrap()
    }

    struct TestWallet {
        chain_id: u64,
    }

    #[async_trait]
    impl ConnectedWallet for TestWallet {
        fn address(&self) -> Address {
            Address::repeat_byte(0x99)
        }

        fn chain_id(&self) -> u64 {
            self.chain_id
        }

        async fn sign_transaction(&self, _tx: &TypedTransaction) -> Result<Signature, SignError> {
            Err(SignError::Rejected("User denied transaction signature".into()))
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl TokenDirectory for FailingDirectory {
        async fn list_tokens(
            &self,
            _owner: Address,
            _chain_id: u64,
        ) -> Result<Vec<TokenInfo>, TokenDirectoryError> {
            Err(TokenDirectoryError("rate limited".into()))
        }
    }

    #[tokio::test]
    async fn test_native_transfer_is_relayed() {
        let server = relay_accepting("relay-1").await;
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_NATIVE_PK"),
            reader(11155111, 4),
            &server.uri(),
            sink.clone(),
        );

        let outcome = pipeline.submit(&form("1.5", "native", DEST)).await;

        let receipt = match outcome {
            SubmissionOutcome::Accepted(receipt) => receipt,
            SubmissionOutcome::Failed(e) => panic!("unexpected failure: {}", e),
        };
        assert_eq!(receipt.relay_tx_id, "relay-1");
        assert_eq!(receipt.nonce, 4);
        assert_eq!(receipt.account, account());
        assert_eq!(receipt.chain_id, 11155111);

        let relayed = relayed(&server).await;
        assert_eq!(relayed.len(), 1);
        let (tx, threshold) = &relayed[0];
        assert_eq!(threshold, "20");
        assert_eq!(tx.value(), Some(&U256::from(1_500_000_000_000_000_000u64)));
        assert!(tx.data().map(|d| d.is_empty()).unwrap_or(true));
        assert_eq!(tx.to_addr(), Some(&DEST.parse::<Address>().unwrap()));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, FeedbackKind::Success);
    }

    #[tokio::test]
    async fn test_relay_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tx"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_500_PK"),
            reader(1, 4),
            &server.uri(),
            sink.clone(),
        );

        let outcome = pipeline.submit(&form("1", "native", DEST)).await;
        assert!(matches!(
            outcome.error(),
            Some(PipelineError::SubmissionFailed {
                status: Some(500),
                ..
            })
        ));

        // Delivery is ambiguous, so the nonce stays consumed
        assert_eq!(pipeline.nonces.floor(1, account()), 5);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, FeedbackKind::Error);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_relay_rejection_frees_nonce() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tx"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Signature tx already exists."))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tx"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_400_PK"),
            reader(1, 4),
            &server.uri(),
            sink.clone(),
        );

        let first = pipeline.submit(&form("1", "native", DEST)).await;
        assert!(!first.is_accepted());

        match pipeline.submit(&form("1", "native", DEST)).await {
            SubmissionOutcome::Accepted(receipt) => assert_eq!(receipt.nonce, 4),
            SubmissionOutcome::Failed(e) => panic!("unexpected failure: {}", e),
        }
    }

    #[tokio::test]
    async fn test_invalid_address_makes_no_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        // No expectations: any chain query panics
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_INVALID_PK"),
            MockChainReader::new(),
            &server.uri(),
            sink.clone(),
        );

        let outcome = pipeline.submit(&form("1", "native", "not-an-address")).await;
        assert!(matches!(
            outcome.error(),
            Some(PipelineError::Validation(crate::error::ValidationError::InvalidAddress))
        ));
        assert_eq!(sink.events().len(), 1);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_submission_in_flight_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut reader = MockChainReader::new();
        reader.expect_chain_id().returning(|| Ok(1));
        reader.expect_pending_nonce().never();

        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_GUARD_PK"),
            reader,
            &server.uri(),
            sink.clone(),
        );

        let _held = pipeline.guard.try_acquire(account()).unwrap();
        let outcome = pipeline.submit(&form("1", "native", DEST)).await;

        let err = outcome.error().unwrap();
        assert!(matches!(err, PipelineError::SubmissionInFlight { .. }));
        assert!(err.is_retryable());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_sequential_attempts_use_distinct_nonces() {
        let server = relay_accepting("relay-seq").await;
        let sink = Arc::new(RecordingSink::default());
        // Chain never advances while the relay holds the transactions
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_SEQ_PK"),
            reader(1, 9),
            &server.uri(),
            sink.clone(),
        );

        let mut nonces = Vec::new();
        for _ in 0..3 {
            match pipeline.submit(&form("0.1", "native", DEST)).await {
                SubmissionOutcome::Accepted(receipt) => nonces.push(receipt.nonce),
                SubmissionOutcome::Failed(e) => panic!("unexpected failure: {}", e),
            }
        }
        assert_eq!(nonces, vec![9, 10, 11]);
        assert!(!pipeline.guard.is_active(account()));
    }

    #[tokio::test]
    async fn test_signing_rejection_never_reaches_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let keys = KeyResolver::new(Some(Arc::new(TestWallet { chain_id: 1 })), None);
        let pipeline = pipeline(keys, reader(1, 0), &server.uri(), sink.clone());

        let outcome = pipeline.submit(&form("1", "native", DEST)).await;
        assert!(matches!(outcome.error(), Some(PipelineError::SigningRejected(_))));

        // Nothing was signed, so the nonce is free again
        let wallet = Address::repeat_byte(0x99);
        assert_eq!(pipeline.nonces.reserved_count(1, wallet), 0);
        assert_eq!(pipeline.nonces.floor(1, wallet), 0);
        assert_eq!(sink.events()[0].0, FeedbackKind::Error);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_wallet_on_other_chain_is_mismatch() {
        let mut reader = MockChainReader::new();
        reader.expect_chain_id().returning(|| Ok(1));
        reader.expect_pending_nonce().never();

        let sink = Arc::new(RecordingSink::default());
        let keys = KeyResolver::new(Some(Arc::new(TestWallet { chain_id: 10 })), None);
        let pipeline = pipeline(keys, reader, "http://127.0.0.1:9", sink);

        let outcome = pipeline.submit(&form("1", "native", DEST)).await;
        assert!(matches!(
            outcome.error(),
            Some(PipelineError::ChainMismatch {
                wallet: 10,
                network: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_no_account_is_retryable() {
        let mut reader = MockChainReader::new();
        reader.expect_chain_id().returning(|| Ok(1));
        reader.expect_pending_nonce().never();

        let sink = Arc::new(RecordingSink::default());
        let keys = KeyResolver::new(None, Some("GAS_SNOOZE_TEST_PIPELINE_UNSET_PK".into()));
        let pipeline = pipeline(keys, reader, "http://127.0.0.1:9", sink.clone());

        let outcome = pipeline.submit(&form("1", "native", DEST)).await;
        let err = outcome.error().unwrap();
        assert!(matches!(err, PipelineError::NoActiveAccount));
        assert!(err.is_retryable());
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_network_surfaces_after_retries() {
        let mut reader = MockChainReader::new();
        reader
            .expect_chain_id()
            .times(2)
            .returning(|| Err(PipelineError::NetworkUnavailable("connection refused".into())));

        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_NET_PK"),
            reader,
            "http://127.0.0.1:9",
            sink.clone(),
        );

        let outcome = pipeline.submit(&form("1", "native", DEST)).await;
        assert!(matches!(outcome.error(), Some(PipelineError::NetworkUnavailable(_))));
        assert_eq!(sink.events()[0].0, FeedbackKind::Error);
    }

    #[tokio::test]
    async fn test_token_transfer_survives_directory_failure() {
        let server = relay_accepting("relay-token").await;
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_TOKEN_PK"),
            reader(1, 0),
            &server.uri(),
            sink.clone(),
        )
        .with_tokens(Arc::new(FailingDirectory));

        let outcome = pipeline.submit(&form("2", TOKEN, DEST)).await;
        assert!(outcome.is_accepted());

        let relayed = relayed(&server).await;
        let (tx, _) = &relayed[0];
        assert_eq!(tx.to_addr(), Some(&TOKEN.parse::<Address>().unwrap()));
        let data = tx.data().unwrap();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        // Unknown precision falls back to 18 decimals
        assert_eq!(U256::from_big_endian(&data[36..]), U256::from(2) * U256::exp10(18));
    }

    #[tokio::test]
    async fn test_extreme_max_gas_is_logged_without_overflow() {
        // Debug level so the cost field is actually rendered
        let _logging = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_test_writer()
                .finish(),
        );

        let server = relay_accepting("relay-extreme").await;
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline(
            env_keys("GAS_SNOOZE_TEST_PIPELINE_EXTREME_GAS_PK"),
            reader(1, 0),
            &server.uri(),
            sink.clone(),
        );

        let max_gas = format!("1{}", "0".repeat(67));
        let fields = FormFields {
            max_gas: Some(max_gas.clone()),
            ..form("1", "native", DEST)
        };

        let outcome = pipeline.submit(&fields).await;
        assert!(outcome.is_accepted(), "{:?}", outcome.error());

        let relayed = relayed(&server).await;
        let (tx, threshold) = &relayed[0];
        assert_eq!(threshold, &max_gas);
        assert_eq!(tx.gas_price(), Some(U256::exp10(76)));
        assert_eq!(sink.events()[0].0, FeedbackKind::Success);
    }
}
