//! HTTP API for the transfer form, token choices and health checks

use crate::config::ApiConfig;
use crate::error::{PipelineError, ValidationError};
use crate::metrics;
use crate::pipeline::{SubmissionOutcome, SubmissionPipeline, SubmissionReceipt};
use crate::tokens::TokenInfo;
use crate::validation::FormFields;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/tokens", get(list_tokens))
        .route("/transfers", post(submit_transfer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, pipeline: Arc<SubmissionPipeline>) -> std::io::Result<()> {
    let app = router(AppState { pipeline });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the network answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.context().chain_id().await {
        Ok(chain_id) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                chain_id: Some(chain_id),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                chain_id: None,
            }),
        ),
    }
}

/// Token choices for the active account; empty when discovery is degraded
async fn list_tokens(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = &state.pipeline;

    let (handle, chain_id) =
        futures::join!(pipeline.keys().resolve(), pipeline.context().chain_id());
    let (owner, chain_id) = match (handle, chain_id) {
        (Ok(handle), Ok(chain_id)) => (handle.address(), chain_id),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot list tokens: {}", e);
            return Json(TokensResponse { tokens: Vec::new() });
        }
    };

    let tokens = match pipeline.tokens().list_tokens(owner, chain_id).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(chain_id, "Token discovery failed, offering native asset only: {}", e);
            metrics::record_token_lookup_failure(chain_id);
            Vec::new()
        }
    };

    Json(TokensResponse { tokens })
}

/// Run one submission attempt
async fn submit_transfer(
    State(state): State<AppState>,
    payload: Result<Json<FormFields>, JsonRejection>,
) -> axum::response::Response {
    let outcome = match payload {
        Ok(Json(form)) => state.pipeline.submit(&form).await,
        Err(rejection) => state
            .pipeline
            .fail(ValidationError::MalformedForm(rejection.body_text()).into()),
    };

    match outcome {
        SubmissionOutcome::Accepted(receipt) => (
            StatusCode::OK,
            Json(AcceptedResponse {
                status: "accepted",
                receipt,
            }),
        )
            .into_response(),
        SubmissionOutcome::Failed(e) => (
            status_for(&e),
            Json(ErrorResponse {
                status: "failed",
                error: e.kind(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            }),
        )
            .into_response(),
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Validation(_) | PipelineError::AmountOverflow { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::NoActiveAccount | PipelineError::NetworkUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PipelineError::ChainMismatch { .. } => StatusCode::PRECONDITION_FAILED,
        PipelineError::SubmissionInFlight { .. } => StatusCode::CONFLICT,
        PipelineError::SigningRejected(_) => StatusCode::BAD_REQUEST,
        PipelineError::SigningFailed(_) | PipelineError::SubmissionFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    chain_id: Option<u64>,
}

#[derive(Serialize)]
struct TokensResponse {
    tokens: Vec<TokenInfo>,
}

#[derive(Serialize)]
struct AcceptedResponse {
    status: &'static str,
    #[serde(flatten)]
    receipt: SubmissionReceipt,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: &'static str,
    message: String,
    retryable: bool,
}
