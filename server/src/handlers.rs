//! HTTP handlers for proving and settling usage

use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::config::Config;
use crate::error::BillingError;
use crate::models::*;
use crate::services::ledger::ChargeReceipt;
use crate::services::orchestrator::BillingService;

/// `Json` whose rejections answer with the billing error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(BillingError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for BillingError {
    fn from(rejection: JsonRejection) -> Self {
        BillingError::validation("body", rejection.body_text())
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(config: Config, billing: BillingService) -> Self {
        Self {
            config,
            billing: Arc::new(billing),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Billing endpoints
        .route("/api/zk/prove", post(prove))
        .route("/api/zk/charge", post(charge))
        .route("/api/zk/settle", post(settle))
        // Operator reconciliation
        .route("/api/billing/reconcile", post(reconcile))
        .with_state(state)
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ledger = state.billing.ledger();
    let billing_role = match ledger.billing_role().await {
        Ok(role) => Some(role),
        Err(e) => {
            tracing::warn!("Health check could not reach ledger: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: if billing_role.is_some() { "healthy" } else { "degraded" }.to_string(),
        ledger: ledger.name().to_string(),
        environment: state.config.app_env.clone(),
        billing_role,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Generate a billing proof; token counts stay off the ledger
pub async fn prove(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProveRequest>,
) -> Result<Json<ProveResponse>, BillingError> {
    let proof = state.billing.prove_usage(request.into_domain()?).await?;
    Ok(Json(ProveResponse::from(&proof)))
}

/// Submit a previously generated proof
pub async fn charge(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ChargeBody>,
) -> Result<Json<ChargeReceipt>, BillingError> {
    let receipt = state.billing.submit_charge(body.into_submission()?).await?;
    Ok(Json(receipt))
}

/// Prove and submit in one request
pub async fn settle(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProveRequest>,
) -> Result<Json<SettleResponse>, BillingError> {
    let settlement = state.billing.settle(request.into_domain()?).await?;
    Ok(Json(SettleResponse::from(&settlement)))
}

/// Plaintext charge priced from the ledger registry
pub async fn reconcile(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ReconcileBody>,
) -> Result<Json<ChargeReceipt>, BillingError> {
    let receipt = state.billing.submit(body.into_request()?).await?;
    Ok(Json(receipt))
}
