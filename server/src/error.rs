//! Error types for the billing server

use alloy::primitives::B256;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use harpocrates_circuit::{CircuitError, SignalDiff};
use harpocrates_ledger::LedgerRejection;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `diffs` is `None` when the deployment hides them.
    #[error("Public signals do not match inputs")]
    SignalMismatch { diffs: Option<Vec<SignalDiff>> },

    #[error("{0}")]
    Ledger(#[from] LedgerRejection),

    /// Mined but reverted without a reason the client could decode.
    #[error("Charge transaction reverted: {tx_hash}")]
    Reverted { tx_hash: B256 },

    #[error("Ledger unavailable: {0}")]
    Transient(String),

    #[error("Proof generation failed: {0}")]
    Proving(String),
}

impl BillingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Only network-level failures are worth another attempt; a ledger
    /// rejection is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Transient(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Validation { .. } | BillingError::SignalMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            BillingError::Configuration(_) | BillingError::Proving(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BillingError::Ledger(rejection) => match rejection {
                LedgerRejection::NotBilling | LedgerRejection::NotOwner => StatusCode::FORBIDDEN,
                LedgerRejection::NullifierUsed => StatusCode::CONFLICT,
                LedgerRejection::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
                LedgerRejection::PriceMismatch
                | LedgerRejection::InvalidProof
                | LedgerRejection::Overflow => {
                    StatusCode::BAD_REQUEST
                }
            },
            BillingError::Reverted { .. } => StatusCode::BAD_GATEWAY,
            BillingError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<CircuitError> for BillingError {
    fn from(err: CircuitError) -> Self {
        match err {
            CircuitError::Validation { field, message } => BillingError::Validation { field, message },
            CircuitError::CostOutOfRange => BillingError::validation("costWei", err.to_string()),
            CircuitError::MalformedProof(message) => BillingError::validation("proof", message),
            CircuitError::MissingArtifact(_) | CircuitError::CorruptArtifact { .. } | CircuitError::Io(_) => {
                BillingError::Configuration(err.to_string())
            }
            CircuitError::Proving(message) => BillingError::Proving(message),
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            BillingError::Configuration(_) | BillingError::Proving(_) => {
                tracing::error!("Request failed: {}", self);
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        let mut body = json!({
            "error": message,
            "code": status.as_u16(),
        });
        if let BillingError::SignalMismatch { diffs: Some(diffs) } = &self {
            body["debug"] = json!({ "diffs": diffs });
        }

        (status, Json(body)).into_response()
    }
}
