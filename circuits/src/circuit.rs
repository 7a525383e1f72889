//! Billing commitment circuit
//!
//! Public inputs (12, in order): user, modelId, price, cost, usageHash and
//! nullifier, each as `(lo, hi)` 128-bit limbs. Private witness: token
//! counts, user secret and nonce.
//!
//! ```text
//! cost       == (inputTokens + outputTokens) * price
//! usageHash  == Poseidon(user, modelId, inputTokens, outputTokens, nonce)
//! nullifier  == Poseidon(userSecret, usageHash)
//! ```

use ark_bn254::Fr;
use ark_ff::{BigInteger, One, PrimeField};
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::codec::{u256_to_fr, LIMB_BITS};
use crate::inputs::BillingProofInput;
use crate::poseidon::PoseidonGadget;
use crate::signals::{PublicSignals, SIGNAL_COUNT};

const TOKEN_BITS: usize = 64;

/// Circuit instance. All fields `None` yields the shape used for key generation.
#[derive(Clone, Default)]
pub struct BillingCircuit {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub user_secret: Option<Fr>,
    pub nonce: Option<Fr>,
    pub signals: Option<PublicSignals>,
}

impl BillingCircuit {
    /// Witness-free instance for circuit-specific setup.
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn with_witness(input: &BillingProofInput, signals: PublicSignals) -> Self {
        Self {
            input_tokens: Some(input.input_tokens),
            output_tokens: Some(input.output_tokens),
            user_secret: Some(u256_to_fr(input.user_secret)),
            nonce: Some(u256_to_fr(input.nonce)),
            signals: Some(signals),
        }
    }
}

impl ConstraintSynthesizer<Fr> for BillingCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Public inputs must be allocated first and in signal order.
        let mut limbs = Vec::with_capacity(SIGNAL_COUNT);
        for i in 0..SIGNAL_COUNT {
            let limb = FpVar::new_input(cs.clone(), || {
                self.signals
                    .as_ref()
                    .map(|s| u256_to_fr(s[i]))
                    .ok_or(SynthesisError::AssignmentMissing)
            })?;
            enforce_bit_width(cs.clone(), &limb, LIMB_BITS)?;
            limbs.push(limb);
        }

        let input_tokens = FpVar::new_witness(cs.clone(), || {
            self.input_tokens.map(Fr::from).ok_or(SynthesisError::AssignmentMissing)
        })?;
        let output_tokens = FpVar::new_witness(cs.clone(), || {
            self.output_tokens.map(Fr::from).ok_or(SynthesisError::AssignmentMissing)
        })?;
        let user_secret = FpVar::new_witness(cs.clone(), || {
            self.user_secret.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nonce = FpVar::new_witness(cs.clone(), || {
            self.nonce.ok_or(SynthesisError::AssignmentMissing)
        })?;

        enforce_bit_width(cs.clone(), &input_tokens, TOKEN_BITS)?;
        enforce_bit_width(cs.clone(), &output_tokens, TOKEN_BITS)?;

        let user = join(&limbs[0], &limbs[1]);
        let model_id = join(&limbs[2], &limbs[3]);
        let price = join(&limbs[4], &limbs[5]);
        let cost = join(&limbs[6], &limbs[7]);
        let usage_hash = join(&limbs[8], &limbs[9]);
        let nullifier = join(&limbs[10], &limbs[11]);

        let total_tokens = &input_tokens + &output_tokens;
        (total_tokens * price).enforce_equal(&cost)?;

        let computed_usage = PoseidonGadget::new(5)?.hash(&[
            user,
            model_id,
            input_tokens,
            output_tokens,
            nonce,
        ])?;
        computed_usage.enforce_equal(&usage_hash)?;

        let computed_nullifier = PoseidonGadget::new(2)?.hash(&[user_secret, usage_hash])?;
        computed_nullifier.enforce_equal(&nullifier)?;

        Ok(())
    }
}

/// `lo + hi * 2^128` as a linear combination.
fn join(lo: &FpVar<Fr>, hi: &FpVar<Fr>) -> FpVar<Fr> {
    lo + hi * FpVar::Constant(two_pow_128())
}

fn two_pow_128() -> Fr {
    Fr::from(u128::MAX) + Fr::one()
}

/// Constrains `var < 2^width` by recomposing it from `width` boolean witnesses.
fn enforce_bit_width(
    cs: ConstraintSystemRef<Fr>,
    var: &FpVar<Fr>,
    width: usize,
) -> Result<(), SynthesisError> {
    let value = var.value().ok();
    let bits = (0..width)
        .map(|i| {
            Boolean::new_witness(cs.clone(), || {
                value
                    .map(|v| v.into_bigint().get_bit(i))
                    .ok_or(SynthesisError::AssignmentMissing)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Boolean::le_bits_to_fp_var(&bits)?.enforce_equal(var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::BillingCommitment;
    use alloy_primitives::{keccak256, Address, U256};
    use ark_relations::r1cs::ConstraintSystem;

    fn input() -> BillingProofInput {
        BillingProofInput {
            user: Address::repeat_byte(0x42),
            model_id: keccak256(b"llm-secure-7b"),
            input_tokens: 10,
            output_tokens: 20,
            price_per_token_wei: U256::from(1_000_000_000u64),
            nonce: U256::from(987654321u64),
            user_secret: U256::from(424242u64),
        }
    }

    fn is_satisfied(input: &BillingProofInput, commitment: &BillingCommitment) -> bool {
        let circuit =
            BillingCircuit::with_witness(input, PublicSignals::from_commitment(commitment));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn test_honest_witness_satisfies() {
        let input = input();
        let commitment = input.commitment().unwrap();
        assert!(is_satisfied(&input, &commitment));
    }

    #[test]
    fn test_wrong_cost_is_unsatisfied() {
        let input = input();
        let mut commitment = input.commitment().unwrap();
        commitment.cost_wei -= U256::from(1u8);
        assert!(!is_satisfied(&input, &commitment));
    }

    #[test]
    fn test_wrong_nullifier_is_unsatisfied() {
        let input = input();
        let mut commitment = input.commitment().unwrap();
        commitment.nullifier = keccak256(b"forged");
        assert!(!is_satisfied(&input, &commitment));
    }

    #[test]
    fn test_different_token_split_is_unsatisfied() {
        // Same total, so the cost identity holds, but usageHash binds the split.
        let honest = input();
        let commitment = honest.commitment().unwrap();
        let mut shifted = honest.clone();
        shifted.input_tokens = 15;
        shifted.output_tokens = 15;
        assert!(!is_satisfied(&shifted, &commitment));
    }

    #[test]
    fn test_public_input_count() {
        let input = input();
        let commitment = input.commitment().unwrap();
        let circuit =
            BillingCircuit::with_witness(&input, PublicSignals::from_commitment(&commitment));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        // One extra instance variable for the constant `1`.
        assert_eq!(cs.num_instance_variables(), SIGNAL_COUNT + 1);
    }
}
