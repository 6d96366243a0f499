//! Error types for the transfer pipeline

use thiserror::Error;

/// User-correctable problems with the submitted form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Amount must be a non-negative decimal number")]
    InvalidAmount,

    #[error("Address must be 0x followed by 40 hex digits")]
    InvalidAddress,

    #[error("Max gas price must be a non-negative number of gwei")]
    InvalidGasPrice,

    #[error("Malformed form: {0}")]
    MalformedForm(String),
}

/// Main error type for a submission attempt
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No active account: connect a wallet or configure a signing key")]
    NoActiveAccount,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Wallet is on chain {wallet} but the network is chain {network}")]
    ChainMismatch { wallet: u64, network: u64 },

    #[error("A submission for {account} is already in flight")]
    SubmissionInFlight { account: String },

    #[error("Amount {amount} does not fit in 256 bits at {decimals} decimals")]
    AmountOverflow { amount: String, decimals: u32 },

    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Submission failed{}: {detail}", http_status(.status))]
    SubmissionFailed { status: Option<u16>, detail: String },
}

impl PipelineError {
    /// Whether the user may simply try again with a fresh attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::NoActiveAccount
            | PipelineError::NetworkUnavailable(_)
            | PipelineError::SubmissionInFlight { .. } => true,
            // Only transport failures; a relay that answered has judged the payload
            PipelineError::SubmissionFailed { status, .. } => status.is_none(),
            _ => false,
        }
    }

    /// Stable short name used for metrics labels and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::NoActiveAccount => "no_active_account",
            PipelineError::NetworkUnavailable(_) => "network_unavailable",
            PipelineError::ChainMismatch { .. } => "chain_mismatch",
            PipelineError::SubmissionInFlight { .. } => "in_flight",
            PipelineError::AmountOverflow { .. } => "invalid_amount",
            PipelineError::SigningRejected(_) => "signing_rejected",
            PipelineError::SigningFailed(_) => "signing_failed",
            PipelineError::SubmissionFailed { .. } => "submission_failed",
        }
    }
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
