//! Prover inputs and the public values derived from them

use alloy_primitives::{Address, B256, U256};
use ark_bn254::Fr;

use crate::codec::{self, address_to_u256, b256_to_u256, fr_to_b256, u256_to_fr};
use crate::error::{CircuitError, Result};
use crate::poseidon;
use crate::signals::BillingCommitment;

/// Everything needed to prove one usage record.
#[derive(Clone, PartialEq, Eq)]
pub struct BillingProofInput {
    pub user: Address,
    /// Already normalized (see [`crate::normalize_model_id`]).
    pub model_id: B256,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub price_per_token_wei: U256,
    pub nonce: U256,
    pub user_secret: U256,
}

// Token counts, nonce and secret stay out of debug output.
impl std::fmt::Debug for BillingProofInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingProofInput")
            .field("user", &self.user)
            .field("model_id", &self.model_id)
            .field("price_per_token_wei", &self.price_per_token_wei)
            .finish_non_exhaustive()
    }
}

impl BillingProofInput {
    /// `(inputTokens + outputTokens) * pricePerTokenWei`, required to be below the field modulus.
    pub fn cost_wei(&self) -> Result<U256> {
        let total = U256::from(self.input_tokens) + U256::from(self.output_tokens);
        let cost = total
            .checked_mul(self.price_per_token_wei)
            .ok_or(CircuitError::CostOutOfRange)?;
        if cost >= codec::field_modulus() {
            return Err(CircuitError::CostOutOfRange);
        }
        Ok(cost)
    }

    /// Checks every precondition and derives the public commitment values.
    pub fn commitment(&self) -> Result<BillingCommitment> {
        let modulus = codec::field_modulus();
        if self.nonce >= modulus {
            return Err(CircuitError::validation("nonce", "not below the field modulus"));
        }
        if self.user_secret >= modulus {
            return Err(CircuitError::validation("userSecret", "not below the field modulus"));
        }

        let cost_wei = self.cost_wei()?;
        let usage = self.usage_hash_field()?;
        let nullifier = poseidon::nullifier(u256_to_fr(self.user_secret), usage)
            .map_err(|e| CircuitError::Proving(e.to_string()))?;

        Ok(BillingCommitment {
            user: self.user,
            model_id: self.model_id,
            price_per_token_wei: self.price_per_token_wei,
            cost_wei,
            usage_hash: fr_to_b256(usage),
            nullifier: fr_to_b256(nullifier),
        })
    }

    pub(crate) fn usage_hash_field(&self) -> Result<Fr> {
        poseidon::usage_hash(
            u256_to_fr(address_to_u256(self.user)),
            u256_to_fr(b256_to_u256(self.model_id)),
            self.input_tokens,
            self.output_tokens,
            u256_to_fr(self.nonce),
        )
        .map_err(|e| CircuitError::Proving(e.to_string()))
    }
}
