//! The two ways a charge reaches the ledger

use alloy_primitives::{Address, B256, U256};
use harpocrates_circuit::{BillingCommitment, SolidityProof};

#[derive(Debug, Clone)]
pub enum ChargeRequest {
    /// Token counts in the clear, priced from the registry. Used for operator
    /// reconciliation.
    Plaintext {
        user: Address,
        model_id: B256,
        input_tokens: u64,
        output_tokens: u64,
        usage_hash: B256,
    },

    /// Commitment values plus a Groth16 proof over them.
    Proven {
        commitment: BillingCommitment,
        proof: SolidityProof,
    },
}

impl ChargeRequest {
    pub fn user(&self) -> Address {
        match self {
            ChargeRequest::Plaintext { user, .. } => *user,
            ChargeRequest::Proven { commitment, .. } => commitment.user,
        }
    }

    /// Nullifier consumed by this charge, if any.
    pub fn nullifier(&self) -> Option<B256> {
        match self {
            ChargeRequest::Plaintext { .. } => None,
            ChargeRequest::Proven { commitment, .. } => Some(commitment.nullifier),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChargeRequest::Plaintext { .. } => "charge",
            ChargeRequest::Proven { .. } => "chargeWithProof",
        }
    }

    /// Cost of a plaintext charge at the given price, `None` on overflow.
    pub(crate) fn plaintext_cost(input_tokens: u64, output_tokens: u64, price: U256) -> Option<U256> {
        let tokens = U256::from(input_tokens) + U256::from(output_tokens);
        tokens.checked_mul(price)
    }
}
