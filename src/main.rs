//! Gas Snooze - sign transfers locally and park them with a gas-threshold relay
//!
//! The service validates transfer forms, builds and signs the transaction with
//! the active account, and hands it to a relay that broadcasts once the
//! network gas price falls to the user's threshold.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod error;
mod feedback;
mod metrics;
mod pipeline;
mod relay;
mod tokens;
mod tx;
mod validation;
mod wallet;

use chain::{ChainContextProvider, ChainProvider};
use config::Settings;
use feedback::{Feedback, LogFeedback, TelegramFeedback};
use metrics::MetricsServer;
use pipeline::{RetryPolicy, SubmissionPipeline};
use relay::RelayClient;
use tokens::{AlchemyTokenDirectory, NoTokenDirectory, TokenDirectory};
use tx::{GasEstimator, TransactionBuilder};
use wallet::{ConnectedWallet, KeyResolver, RemoteWallet};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logging(settings.logging.json);

    info!("Starting Gas Snooze v{}", env!("CARGO_PKG_VERSION"));
    for warning in settings.warnings() {
        warn!("{}", warning);
    }
    info!(
        chain_id = settings.chain.chain_id,
        "Loaded configuration for {}", settings.chain.name
    );

    // Initialize chain connection
    let chain = Arc::new(ChainProvider::new(settings.chain.clone())?);
    let retry = RetryPolicy::new(
        settings.pipeline.context_attempts,
        settings.pipeline.retry_base_ms,
        settings.pipeline.retry_max_ms,
    );
    let context = ChainContextProvider::new(chain.clone(), retry);
    info!("Chain connection initialized");

    // Signing credentials
    let wallet: Option<Arc<dyn ConnectedWallet>> = match (
        &settings.wallet.remote_signer_url,
        &settings.wallet.remote_signer_account,
    ) {
        (Some(url), Some(account)) => {
            let address = validation::parse_address(account)
                .context("Invalid wallet.remote_signer_account")?;
            info!(%address, "Using remote signer");
            let remote: Arc<dyn ConnectedWallet> =
                Arc::new(RemoteWallet::new(url, address, settings.chain.chain_id));
            Some(remote)
        }
        _ => None,
    };
    let keys = KeyResolver::new(wallet, settings.wallet.private_key_env.clone());

    // Token discovery
    let tokens: Arc<dyn TokenDirectory> = match (&settings.tokens.api_url, settings.tokens.enabled) {
        (Some(url), true) => Arc::new(AlchemyTokenDirectory::new(url, settings.chain.chain_id)),
        _ => Arc::new(NoTokenDirectory),
    };

    // Feedback sinks
    let mut feedback = Feedback::new().with(Arc::new(LogFeedback));
    if let Some((token, chat)) = settings.notify.telegram() {
        feedback = feedback.with(Arc::new(TelegramFeedback::new(token, chat)));
        info!("Telegram notifications enabled");
    }

    let builder = TransactionBuilder::new(GasEstimator::new(
        settings.chain.gas_price_strategy,
        &settings.chain.priority_fee_gwei,
    )?);

    let pipeline = Arc::new(
        SubmissionPipeline::new(keys, context, builder, RelayClient::new(&settings.relay))
            .with_tokens(tokens)
            .with_feedback(Arc::new(feedback)),
    );
    info!("Submission pipeline initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let pipeline = pipeline.clone();
        async move {
            if let Err(e) = api::run_server(config, pipeline).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let chain = chain.clone();
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;

                if !chain.health_check().await {
                    warn!("Chain {} health check failed", chain.configured_chain_id());
                    chain.failover();
                }
            }
        }
    });

    info!("Gas Snooze is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Gas Snooze stopped");
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gas_snooze=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
