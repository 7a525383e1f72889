//! Billing orchestrator
//!
//! Turns usage into a proof, checks it against the claimed public values and
//! submits it to the ledger. Price lookup and submission are separate ledger
//! calls; a price change in between is rejected by the ledger and the caller
//! has to prove again.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use harpocrates_circuit::{
    normalize_model_id, verify_signals, BillingCommitment, BillingProof, BillingProofInput,
    BillingProver, ProofVerifier, PublicSignals, SolidityProof,
};
use harpocrates_ledger::ChargeRequest;

use crate::error::BillingError;
use crate::services::ledger::{ChargeReceipt, LedgerClient};
use crate::services::retry::{with_retry, RetryConfig};
use crate::services::secrets::{random_scalar, SecretStore};

#[derive(Debug, Clone)]
pub struct ProveUsageRequest {
    pub user: Address,
    /// Model name or a `0x`-prefixed bytes32.
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub nonce: Option<U256>,
    pub user_secret: Option<U256>,
}

#[derive(Debug, Clone)]
pub struct ChargeSubmission {
    pub commitment: BillingCommitment,
    pub proof: SolidityProof,
    /// Signals reported alongside the proof, checked before submission.
    pub public_signals: Option<PublicSignals>,
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub proof: BillingProof,
    pub receipt: ChargeReceipt,
}

pub struct BillingService {
    prover: Arc<BillingProver>,
    verifier: Arc<dyn ProofVerifier>,
    ledger: Arc<dyn LedgerClient>,
    secrets: Arc<dyn SecretStore>,
    retry: RetryConfig,
    verify_signals: bool,
    expose_signal_diffs: bool,
}

impl BillingService {
    pub fn new(
        prover: Arc<BillingProver>,
        verifier: Arc<dyn ProofVerifier>,
        ledger: Arc<dyn LedgerClient>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            prover,
            verifier,
            ledger,
            secrets,
            retry: RetryConfig::default(),
            verify_signals: true,
            expose_signal_diffs: true,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_signal_verification(mut self, enabled: bool) -> Self {
        self.verify_signals = enabled;
        self
    }

    pub fn with_signal_diffs(mut self, expose: bool) -> Self {
        self.expose_signal_diffs = expose;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Reads the price, resolves the user secret and nonce, and proves on the
    /// blocking pool.
    pub async fn prove_usage(&self, request: ProveUsageRequest) -> Result<BillingProof, BillingError> {
        if request.model_id.trim().is_empty() {
            return Err(BillingError::validation("modelId", "must not be empty"));
        }
        let model_id = normalize_model_id(&request.model_id);

        let price = with_retry(&self.retry, "pricePerTokenWei", || {
            self.ledger.price_per_token_wei(model_id)
        })
        .await?;
        if price.is_zero() {
            return Err(BillingError::validation(
                "modelId",
                "Model price not set on-chain",
            ));
        }

        // Secret stores may touch disk, so they run on the blocking pool
        // next to the prover.
        let prover = Arc::clone(&self.prover);
        let secrets = Arc::clone(&self.secrets);
        let nonce = request.nonce.unwrap_or_else(random_scalar);
        let proof = tokio::task::spawn_blocking(move || -> Result<BillingProof, BillingError> {
            let user_secret = match request.user_secret {
                Some(secret) => secret,
                None => secrets.get_or_create(request.user)?,
            };
            let input = BillingProofInput {
                user: request.user,
                model_id,
                input_tokens: request.input_tokens,
                output_tokens: request.output_tokens,
                price_per_token_wei: price,
                nonce,
                user_secret,
            };
            Ok(prover.prove(&input)?)
        })
        .await
        .map_err(|e| BillingError::Proving(format!("prover task failed: {e}")))??;

        tracing::info!(
            "Generated billing proof: user={}, model={}, cost={} wei",
            proof.commitment.user,
            proof.commitment.model_id,
            proof.cost_wei()
        );
        Ok(proof)
    }

    /// Submits a proof-backed charge after confirming the signer holds the
    /// billing role and, when reported, that the signals match the claim.
    pub async fn submit_charge(&self, submission: ChargeSubmission) -> Result<ChargeReceipt, BillingError> {
        self.ensure_billing_role().await?;

        if let (true, Some(reported)) = (self.verify_signals, &submission.public_signals) {
            self.check_signals(&submission, reported)?;
        }

        self.send(ChargeRequest::Proven {
            commitment: submission.commitment,
            proof: submission.proof,
        })
        .await
    }

    /// Proves and submits in one step.
    pub async fn settle(&self, request: ProveUsageRequest) -> Result<Settlement, BillingError> {
        let proof = self.prove_usage(request).await?;
        let receipt = self
            .submit_charge(ChargeSubmission {
                commitment: proof.commitment,
                proof: proof.proof,
                public_signals: Some(proof.public_signals),
            })
            .await?;
        Ok(Settlement { proof, receipt })
    }

    /// Submits either charge variant without the signal checks.
    pub async fn submit(&self, request: ChargeRequest) -> Result<ChargeReceipt, BillingError> {
        self.ensure_billing_role().await?;
        self.send(request).await
    }

    async fn ensure_billing_role(&self) -> Result<(), BillingError> {
        let role = with_retry(&self.retry, "billingRole", || self.ledger.billing_role()).await?;
        let signer = self.ledger.signer();
        if role != signer {
            return Err(BillingError::Configuration(format!(
                "Signer {signer} is not billing role {role}"
            )));
        }
        Ok(())
    }

    fn check_signals(
        &self,
        submission: &ChargeSubmission,
        reported: &PublicSignals,
    ) -> Result<(), BillingError> {
        if let Err(diffs) = verify_signals(&submission.commitment, reported) {
            let summary: Vec<String> = diffs.iter().map(ToString::to_string).collect();
            tracing::error!(
                "Public signal mismatch for user {}: {}",
                submission.commitment.user,
                summary.join("; ")
            );
            return Err(BillingError::SignalMismatch {
                diffs: self.expose_signal_diffs.then_some(diffs),
            });
        }

        if !self.verifier.verify(&submission.proof, reported) {
            tracing::warn!(
                "Off-chain verification failed for user {}",
                submission.commitment.user
            );
            return Err(BillingError::validation(
                "proof",
                "Proof verification failed off-chain",
            ));
        }
        Ok(())
    }

    async fn send(&self, request: ChargeRequest) -> Result<ChargeReceipt, BillingError> {
        let result = with_retry(&self.retry, request.kind(), || self.ledger.submit(&request)).await;
        match &result {
            Ok(receipt) => tracing::info!(
                "Settled {} for {}: tx={}, block={}",
                request.kind(),
                request.user(),
                receipt.tx_hash,
                receipt.block_number
            ),
            Err(e) => tracing::warn!(
                "{} for {} rejected: {}",
                request.kind(),
                request.user(),
                e
            ),
        }
        result
    }
}
