//! Billing contract client over JSON-RPC using Alloy

use alloy::{
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{ProviderBuilder, RootProvider},
    signers::local::PrivateKeySigner,
    sol,
    transports::http::{Client, Http},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use harpocrates_ledger::{ChargeRequest, LedgerRejection};
use std::fmt::Display;
use std::sync::Arc;

use crate::config::RpcSettings;
use crate::error::BillingError;
use crate::services::ledger::{ChargeReceipt, LedgerClient};

sol! {
    #[sol(rpc)]
    interface IHarpocratesBilling {
        function billingRole() external view returns (address);
        function pricePerTokenWei(bytes32 modelId) external view returns (uint256);
        function balances(address user) external view returns (uint256);
        function nullifierUsed(bytes32 nullifier) external view returns (bool);

        function charge(address user, bytes32 modelId, uint256 inputTokens, uint256 outputTokens, bytes32 usageHash) external;
        function chargeWithProof(address user, bytes32 modelId, uint256 price, uint256 cost, bytes32 usageHash, bytes32 nullifier, uint256[2] a, uint256[2][2] b, uint256[2] c) external;
    }
}

/// Known revert reasons are final; everything else is treated as a
/// network-level failure.
fn classify(context: &str, err: impl Display) -> BillingError {
    let message = err.to_string();
    match LedgerRejection::from_revert_message(&message) {
        Some(rejection) => BillingError::Ledger(rejection),
        None => BillingError::Transient(format!("{context}: {message}")),
    }
}

/// A mined transaction that reverted is a failed charge, not a receipt.
fn settled(kind: &str, tx_hash: B256, block_number: u64, status: bool) -> Result<ChargeReceipt, BillingError> {
    if !status {
        tracing::warn!("{} reverted in block {}: tx={}", kind, block_number, tx_hash);
        return Err(BillingError::Reverted { tx_hash });
    }
    Ok(ChargeReceipt {
        tx_hash,
        block_number,
        status,
    })
}

pub struct AlloyLedger {
    provider: Arc<RootProvider<Http<Client>>>,
    rpc_url: String,
    wallet: EthereumWallet,
    signer: Address,
    contract_address: Address,
}

impl AlloyLedger {
    pub fn new(settings: &RpcSettings) -> Result<Self> {
        let contract_address: Address = settings
            .billing_contract
            .parse()
            .context("Invalid BILLING_CONTRACT")?;
        let signer: PrivateKeySigner = settings
            .private_key
            .parse()
            .context("Invalid BILLING_PRIVATE_KEY")?;
        let signer_address = signer.address();

        let provider = ProviderBuilder::new()
            .on_http(settings.rpc_url.parse().context("Invalid RPC_URL")?);

        tracing::info!(
            "Billing contract {} on chain {} via {}",
            contract_address,
            settings.chain_id,
            settings.rpc_url
        );

        Ok(Self {
            provider: Arc::new(provider),
            rpc_url: settings.rpc_url.clone(),
            wallet: EthereumWallet::from(signer),
            signer: signer_address,
            contract_address,
        })
    }
}

#[async_trait]
impl LedgerClient for AlloyLedger {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn price_per_token_wei(&self, model_id: B256) -> Result<U256, BillingError> {
        let contract = IHarpocratesBilling::new(self.contract_address, &*self.provider);
        let price = contract
            .pricePerTokenWei(model_id)
            .call()
            .await
            .map_err(|e| classify("pricePerTokenWei", e))?
            ._0;
        Ok(price)
    }

    async fn billing_role(&self) -> Result<Address, BillingError> {
        let contract = IHarpocratesBilling::new(self.contract_address, &*self.provider);
        let role = contract
            .billingRole()
            .call()
            .await
            .map_err(|e| classify("billingRole", e))?
            ._0;
        Ok(role)
    }

    async fn balance_of(&self, user: Address) -> Result<U256, BillingError> {
        let contract = IHarpocratesBilling::new(self.contract_address, &*self.provider);
        let balance = contract
            .balances(user)
            .call()
            .await
            .map_err(|e| classify("balances", e))?
            ._0;
        Ok(balance)
    }

    async fn nullifier_used(&self, nullifier: B256) -> Result<bool, BillingError> {
        let contract = IHarpocratesBilling::new(self.contract_address, &*self.provider);
        let used = contract
            .nullifierUsed(nullifier)
            .call()
            .await
            .map_err(|e| classify("nullifierUsed", e))?
            ._0;
        Ok(used)
    }

    async fn submit(&self, request: &ChargeRequest) -> Result<ChargeReceipt, BillingError> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet.clone())
            .on_http(
                self.rpc_url
                    .parse()
                    .map_err(|e| BillingError::Configuration(format!("Invalid RPC_URL: {e}")))?,
            );
        let contract = IHarpocratesBilling::new(self.contract_address, &provider);

        let receipt = match request {
            ChargeRequest::Plaintext {
                user,
                model_id,
                input_tokens,
                output_tokens,
                usage_hash,
            } => {
                let call = contract.charge(
                    *user,
                    *model_id,
                    U256::from(*input_tokens),
                    U256::from(*output_tokens),
                    *usage_hash,
                );
                let pending = call.send().await.map_err(|e| classify("charge", e))?;
                tracing::info!("Submitted charge: tx={}", pending.tx_hash());
                pending
                    .get_receipt()
                    .await
                    .map_err(|e| classify("receipt", e))?
            }
            ChargeRequest::Proven { commitment, proof } => {
                let call = contract.chargeWithProof(
                    commitment.user,
                    commitment.model_id,
                    commitment.price_per_token_wei,
                    commitment.cost_wei,
                    commitment.usage_hash,
                    commitment.nullifier,
                    proof.a,
                    proof.b,
                    proof.c,
                );
                let pending = call
                    .send()
                    .await
                    .map_err(|e| classify("chargeWithProof", e))?;
                tracing::info!("Submitted chargeWithProof: tx={}", pending.tx_hash());
                pending
                    .get_receipt()
                    .await
                    .map_err(|e| classify("receipt", e))?
            }
        };

        settled(
            request.kind(),
            receipt.transaction_hash,
            receipt.block_number.unwrap_or_default(),
            receipt.status(),
        )
    }
}
