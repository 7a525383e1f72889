//! Ledger client abstraction and the in-process devnet

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use harpocrates_circuit::{normalize_model_id, ProofVerifier};
use harpocrates_ledger::{BillingLedger, ChargeRequest, TxReceipt};
use serde::Serialize;

use crate::config::LocalSettings;
use crate::error::BillingError;

/// Inclusion result of a submitted charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub status: bool,
}

impl From<TxReceipt> for ChargeReceipt {
    fn from(receipt: TxReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            status: true,
        }
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Short label for logs and the health endpoint.
    fn name(&self) -> &'static str;

    /// Address charges are submitted from.
    fn signer(&self) -> Address;

    async fn price_per_token_wei(&self, model_id: B256) -> Result<U256, BillingError>;

    async fn billing_role(&self) -> Result<Address, BillingError>;

    async fn balance_of(&self, user: Address) -> Result<U256, BillingError>;

    async fn nullifier_used(&self, nullifier: B256) -> Result<bool, BillingError>;

    /// Submits a charge from `signer()` and waits for inclusion.
    async fn submit(&self, request: &ChargeRequest) -> Result<ChargeReceipt, BillingError>;
}

/// Runs the billing ledger inside the server process.
pub struct LocalLedger {
    ledger: Arc<BillingLedger>,
    signer: Address,
}

impl LocalLedger {
    pub fn new(ledger: Arc<BillingLedger>, signer: Address) -> Self {
        Self { ledger, signer }
    }

    /// Deploys a fresh devnet ledger where the configured address is owner,
    /// billing role and signer, then seeds prices and balances.
    pub fn deploy(
        settings: &LocalSettings,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self, BillingError> {
        let operator = settings.billing_address;
        let ledger = BillingLedger::new(operator, operator);
        ledger.set_verifier(operator, verifier)?;
        for (model, price) in &settings.model_prices {
            ledger.set_price(operator, normalize_model_id(model), *price)?;
        }
        for (user, amount) in &settings.balances {
            ledger.fund(*user, *amount)?;
        }
        tracing::info!(
            "Local ledger deployed: operator={}, {} priced models, {} funded users",
            operator,
            settings.model_prices.len(),
            settings.balances.len()
        );
        Ok(Self::new(Arc::new(ledger), operator))
    }

}

#[async_trait]
impl LedgerClient for LocalLedger {
    fn name(&self) -> &'static str {
        "local"
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn price_per_token_wei(&self, model_id: B256) -> Result<U256, BillingError> {
        Ok(self.ledger.price_per_token_wei(model_id))
    }

    async fn billing_role(&self) -> Result<Address, BillingError> {
        Ok(self.ledger.billing_role())
    }

    async fn balance_of(&self, user: Address) -> Result<U256, BillingError> {
        Ok(self.ledger.balance_of(user))
    }

    async fn nullifier_used(&self, nullifier: B256) -> Result<bool, BillingError> {
        Ok(self.ledger.nullifier_used(nullifier))
    }

    async fn submit(&self, request: &ChargeRequest) -> Result<ChargeReceipt, BillingError> {
        let receipt = self.ledger.submit(self.signer, request)?;
        Ok(receipt.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harpocrates_circuit::{PublicSignals, SolidityProof};
    use harpocrates_ledger::LedgerRejection;

    struct RejectAll;

    impl ProofVerifier for RejectAll {
        fn verify(&self, _proof: &SolidityProof, _signals: &PublicSignals) -> bool {
            false
        }
    }

    fn settings() -> LocalSettings {
        LocalSettings {
            billing_address: Address::repeat_byte(0xbb),
            model_prices: vec![("llm-secure-7b".to_string(), U256::from(1_000_000_000u64))],
            balances: vec![(Address::repeat_byte(0x01), U256::from(500u64))],
        }
    }

    #[tokio::test]
    async fn test_deploy_seeds_state() {
        let local = LocalLedger::deploy(&settings(), Arc::new(RejectAll)).unwrap();
        assert_eq!(local.signer(), Address::repeat_byte(0xbb));
        assert_eq!(local.billing_role().await.unwrap(), local.signer());
        assert_eq!(
            local
                .price_per_token_wei(normalize_model_id("llm-secure-7b"))
                .await
                .unwrap(),
            U256::from(1_000_000_000u64)
        );
        assert_eq!(
            local.balance_of(Address::repeat_byte(0x01)).await.unwrap(),
            U256::from(500u64)
        );
    }

    #[tokio::test]
    async fn test_plaintext_submit_returns_receipt() {
        let local = LocalLedger::deploy(&settings(), Arc::new(RejectAll)).unwrap();
        let request = ChargeRequest::Plaintext {
            user: Address::repeat_byte(0x01),
            model_id: normalize_model_id("llm-secure-7b"),
            input_tokens: 0,
            output_tokens: 0,
            usage_hash: B256::ZERO,
        };
        let receipt = local.submit(&request).await.unwrap();
        assert!(receipt.status);
        assert!(receipt.block_number > 0);
    }

    #[tokio::test]
    async fn test_rejections_surface_as_ledger_errors() {
        let local = LocalLedger::deploy(&settings(), Arc::new(RejectAll)).unwrap();
        let request = ChargeRequest::Plaintext {
            user: Address::repeat_byte(0x01),
            model_id: normalize_model_id("llm-secure-7b"),
            input_tokens: 1,
            output_tokens: 1,
            usage_hash: B256::ZERO,
        };
        assert!(matches!(
            local.submit(&request).await,
            Err(BillingError::Ledger(LedgerRejection::InsufficientBalance))
        ));
    }
}
