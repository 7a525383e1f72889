//! Data models for API requests/responses
//!
//! Integers cross the wire as decimal strings, hashes as `0x` bytes32 hex.

use alloy::primitives::{Address, B256};
use harpocrates_circuit::codec::{parse_decimal, parse_field_element, parse_token_count};
use harpocrates_circuit::{
    normalize_model_id, BillingCommitment, BillingProof, PublicSignals, SolidityProof,
};
use harpocrates_ledger::ChargeRequest;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::services::ledger::ChargeReceipt;
use crate::services::orchestrator::{ChargeSubmission, ProveUsageRequest, Settlement};

fn parse_address(field: &'static str, raw: &str) -> Result<Address, BillingError> {
    raw.parse()
        .map_err(|_| BillingError::validation(field, format!("not an address: {raw:?}")))
}

fn parse_bytes32(field: &'static str, raw: &str) -> Result<B256, BillingError> {
    if !raw.starts_with("0x") {
        return Err(BillingError::validation(field, "expected 0x-prefixed bytes32"));
    }
    raw.parse()
        .map_err(|_| BillingError::validation(field, "expected 0x-prefixed bytes32"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProveRequest {
    pub user_address: String,
    pub model_id: String,
    pub input_tokens: String,
    pub output_tokens: String,
    pub nonce: Option<String>,
    pub user_secret: Option<String>,
}

impl ProveRequest {
    pub fn into_domain(self) -> Result<ProveUsageRequest, BillingError> {
        let scalar = |field: &'static str, value: Option<String>| {
            value
                .map(|v| parse_field_element(field, &v))
                .transpose()
        };
        Ok(ProveUsageRequest {
            user: parse_address("userAddress", &self.user_address)?,
            model_id: self.model_id,
            input_tokens: parse_token_count("inputTokens", &self.input_tokens)?,
            output_tokens: parse_token_count("outputTokens", &self.output_tokens)?,
            nonce: scalar("nonce", self.nonce)?,
            user_secret: scalar("userSecret", self.user_secret)?,
        })
    }
}

/// Groth16 proof as decimal strings, `b` in `(c1, c0)` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofPayload {
    pub a: Vec<String>,
    pub b: Vec<Vec<String>>,
    pub c: Vec<String>,
}

impl From<&SolidityProof> for ProofPayload {
    fn from(proof: &SolidityProof) -> Self {
        let (a, b, c) = proof.to_decimal_strings();
        Self { a, b, c }
    }
}

impl ProofPayload {
    fn parse(&self) -> Result<SolidityProof, BillingError> {
        Ok(SolidityProof::from_decimal_strings(&self.a, &self.b, &self.c)?)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProveResponse {
    pub proof: ProofPayload,
    pub public_signals: Vec<String>,
    pub usage_hash: B256,
    pub nullifier: B256,
    pub cost_wei: String,
    pub price_per_token_wei: String,
    pub model_id: B256,
}

impl From<&BillingProof> for ProveResponse {
    fn from(proof: &BillingProof) -> Self {
        Self {
            proof: ProofPayload::from(&proof.proof),
            public_signals: proof.public_signals.to_decimal_strings(),
            usage_hash: proof.usage_hash(),
            nullifier: proof.nullifier(),
            cost_wei: proof.cost_wei().to_string(),
            price_per_token_wei: proof.price_per_token_wei().to_string(),
            model_id: proof.commitment.model_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeBody {
    pub user_address: String,
    pub model_id: String,
    pub usage_hash: String,
    pub nullifier: String,
    pub price_per_token_wei: String,
    pub cost_wei: String,
    pub proof: ProofPayload,
    pub public_signals: Option<Vec<String>>,
}

impl ChargeBody {
    pub fn into_submission(self) -> Result<ChargeSubmission, BillingError> {
        let commitment = BillingCommitment {
            user: parse_address("userAddress", &self.user_address)?,
            model_id: normalize_model_id(&self.model_id),
            price_per_token_wei: parse_decimal("pricePerTokenWei", &self.price_per_token_wei)?,
            cost_wei: parse_decimal("costWei", &self.cost_wei)?,
            usage_hash: parse_bytes32("usageHash", &self.usage_hash)?,
            nullifier: parse_bytes32("nullifier", &self.nullifier)?,
        };
        let public_signals = self
            .public_signals
            .as_deref()
            .map(PublicSignals::from_decimal_strings)
            .transpose()?;

        Ok(ChargeSubmission {
            commitment,
            proof: self.proof.parse()?,
            public_signals,
        })
    }
}

/// Plaintext charge used for operator reconciliation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileBody {
    pub user_address: String,
    pub model_id: String,
    pub input_tokens: String,
    pub output_tokens: String,
    pub usage_hash: String,
}

impl ReconcileBody {
    pub fn into_request(self) -> Result<ChargeRequest, BillingError> {
        Ok(ChargeRequest::Plaintext {
            user: parse_address("userAddress", &self.user_address)?,
            model_id: normalize_model_id(&self.model_id),
            input_tokens: parse_token_count("inputTokens", &self.input_tokens)?,
            output_tokens: parse_token_count("outputTokens", &self.output_tokens)?,
            usage_hash: parse_bytes32("usageHash", &self.usage_hash)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub proof: ProveResponse,
    pub receipt: ChargeReceipt,
}

impl From<&Settlement> for SettleResponse {
    fn from(settlement: &Settlement) -> Self {
        Self {
            proof: ProveResponse::from(&settlement.proof),
            receipt: settlement.receipt.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub ledger: String,
    pub environment: String,
    pub billing_role: Option<Address>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn charge_body(signals: Option<Vec<String>>) -> ChargeBody {
        ChargeBody {
            user_address: "0x1111111111111111111111111111111111111111".to_string(),
            model_id: "llm-secure-7b".to_string(),
            usage_hash: format!("0x{}", "22".repeat(32)),
            nullifier: format!("0x{}", "33".repeat(32)),
            price_per_token_wei: "1000000000".to_string(),
            cost_wei: "30000000000".to_string(),
            proof: ProofPayload {
                a: vec!["1".into(), "2".into()],
                b: vec![vec!["0".into(), "0".into()], vec!["0".into(), "0".into()]],
                c: vec!["0".into(), "0".into()],
            },
            public_signals: signals,
        }
    }

    #[test]
    fn test_prove_request_parses_decimal_strings() {
        let request: ProveRequest = serde_json::from_value(serde_json::json!({
            "userAddress": "0x1111111111111111111111111111111111111111",
            "modelId": "llm-secure-7b",
            "inputTokens": "10",
            "outputTokens": "20",
        }))
        .unwrap();
        let domain = request.into_domain().unwrap();
        assert_eq!((domain.input_tokens, domain.output_tokens), (10, 20));
        assert!(domain.nonce.is_none());
    }

    #[test]
    fn test_prove_request_rejects_bad_input() {
        let bad_tokens: ProveRequest = serde_json::from_value(serde_json::json!({
            "userAddress": "0x1111111111111111111111111111111111111111",
            "modelId": "m",
            "inputTokens": "1e3",
            "outputTokens": "0",
        }))
        .unwrap();
        assert!(matches!(
            bad_tokens.into_domain(),
            Err(BillingError::Validation { field: "inputTokens", .. })
        ));

        let bad_address: ProveRequest = serde_json::from_value(serde_json::json!({
            "userAddress": "0x1234",
            "modelId": "m",
            "inputTokens": "1",
            "outputTokens": "1",
        }))
        .unwrap();
        assert!(matches!(
            bad_address.into_domain(),
            Err(BillingError::Validation { field: "userAddress", .. })
        ));
    }

    #[test]
    fn test_negative_and_fractional_counts_are_validation_errors() {
        for raw in ["-1", "1.5", " 7", ""] {
            let request: ProveRequest = serde_json::from_value(serde_json::json!({
                "userAddress": "0x1111111111111111111111111111111111111111",
                "modelId": "m",
                "inputTokens": "1",
                "outputTokens": raw,
            }))
            .unwrap();
            assert!(matches!(
                request.into_domain(),
                Err(BillingError::Validation { field: "outputTokens", .. })
            ));
        }
    }

    #[test]
    fn test_json_numbers_are_not_accepted() {
        let parsed = serde_json::from_value::<ProveRequest>(serde_json::json!({
            "userAddress": "0x1111111111111111111111111111111111111111",
            "modelId": "m",
            "inputTokens": 10,
            "outputTokens": "20",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_charge_body_parses() {
        let submission = charge_body(None).into_submission().unwrap();
        assert_eq!(submission.commitment.cost_wei, U256::from(30_000_000_000u64));
        assert_eq!(
            submission.commitment.model_id,
            normalize_model_id("llm-secure-7b")
        );
        assert!(submission.public_signals.is_none());
    }

    #[test]
    fn test_wrong_signal_count_is_validation_error() {
        let signals = vec!["0".to_string(); 11];
        assert!(matches!(
            charge_body(Some(signals)).into_submission(),
            Err(BillingError::Validation { .. })
        ));
    }

    #[test]
    fn test_unprefixed_hash_is_rejected() {
        let mut body = charge_body(None);
        body.usage_hash = "22".repeat(32);
        assert!(matches!(
            body.into_submission(),
            Err(BillingError::Validation { field: "usageHash", .. })
        ));
    }
}
