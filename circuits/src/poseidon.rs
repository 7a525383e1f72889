//! circomlib-compatible Poseidon over BN254
//!
//! The native hash comes from `light-poseidon`; the in-circuit gadget replays
//! the same permutation (x^5 S-box, `full/2` full rounds, partial rounds on
//! `state[0]`, `full/2` full rounds) over `FpVar` using the same round
//! constants and MDS matrix, so both sides agree bit-for-bit.

use ark_bn254::Fr;
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::SynthesisError;
use light_poseidon::{
    parameters::bn254_x5::get_poseidon_parameters, Poseidon, PoseidonError, PoseidonHasher,
    PoseidonParameters,
};

/// Native Poseidon hash of `inputs` (state width `inputs.len() + 1`).
pub fn hash(inputs: &[Fr]) -> Result<Fr, PoseidonError> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())?;
    hasher.hash(inputs)
}

/// `usageHash = Poseidon(user, modelId, inputTokens, outputTokens, nonce)`
pub fn usage_hash(
    user: Fr,
    model_id: Fr,
    input_tokens: u64,
    output_tokens: u64,
    nonce: Fr,
) -> Result<Fr, PoseidonError> {
    hash(&[
        user,
        model_id,
        Fr::from(input_tokens),
        Fr::from(output_tokens),
        nonce,
    ])
}

/// `nullifier = Poseidon(userSecret, usageHash)`
pub fn nullifier(user_secret: Fr, usage_hash: Fr) -> Result<Fr, PoseidonError> {
    hash(&[user_secret, usage_hash])
}

/// Poseidon permutation as R1CS constraints.
pub struct PoseidonGadget {
    params: PoseidonParameters<Fr>,
}

impl PoseidonGadget {
    /// Gadget for a fixed number of inputs.
    pub fn new(arity: usize) -> Result<Self, SynthesisError> {
        let width = u8::try_from(arity + 1).map_err(|_| SynthesisError::Unsatisfiable)?;
        let params =
            get_poseidon_parameters::<Fr>(width).map_err(|_| SynthesisError::Unsatisfiable)?;
        Ok(Self { params })
    }

    pub fn hash(&self, inputs: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
        let width = self.params.width;
        if inputs.len() + 1 != width {
            return Err(SynthesisError::Unsatisfiable);
        }

        let mut state: Vec<FpVar<Fr>> = std::iter::once(FpVar::zero())
            .chain(inputs.iter().cloned())
            .collect();

        let half_full = self.params.full_rounds / 2;
        let total = self.params.full_rounds + self.params.partial_rounds;

        for round in 0..total {
            for (i, element) in state.iter_mut().enumerate() {
                *element += FpVar::Constant(self.params.ark[round * width + i]);
            }

            let is_full = round < half_full || round >= half_full + self.params.partial_rounds;
            if is_full {
                for element in state.iter_mut() {
                    *element = sbox(element)?;
                }
            } else {
                state[0] = sbox(&state[0])?;
            }

            state = self.mix(&state);
        }

        Ok(state.swap_remove(0))
    }

    fn mix(&self, state: &[FpVar<Fr>]) -> Vec<FpVar<Fr>> {
        self.params
            .mds
            .iter()
            .map(|row| {
                row.iter()
                    .zip(state)
                    .fold(FpVar::zero(), |acc, (m, s)| acc + s * FpVar::Constant(*m))
            })
            .collect()
    }
}

/// x^5
fn sbox(x: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let x2 = x.square()?;
    let x4 = x2.square()?;
    Ok(x4 * x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_r1cs_std::R1CSVar;
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn test_usage_hash_is_deterministic() {
        let a = usage_hash(Fr::from(1u8), Fr::from(2u8), 10, 20, Fr::from(99u8)).unwrap();
        let b = usage_hash(Fr::from(1u8), Fr::from(2u8), 10, 20, Fr::from(99u8)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_nonce_changes_usage_hash_and_nullifier() {
        let secret = Fr::from(424242u64);
        let h1 = usage_hash(Fr::from(1u8), Fr::from(2u8), 10, 20, Fr::from(1u8)).unwrap();
        let h2 = usage_hash(Fr::from(1u8), Fr::from(2u8), 10, 20, Fr::from(2u8)).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(nullifier(secret, h1).unwrap(), nullifier(secret, h2).unwrap());
    }

    #[test]
    fn test_token_order_matters() {
        let h1 = usage_hash(Fr::from(1u8), Fr::from(2u8), 10, 20, Fr::from(7u8)).unwrap();
        let h2 = usage_hash(Fr::from(1u8), Fr::from(2u8), 20, 10, Fr::from(7u8)).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_gadget_matches_native_five_inputs() {
        let inputs: Vec<Fr> = [11u64, 22, 33, 44, 55].into_iter().map(Fr::from).collect();
        let expected = hash(&inputs).unwrap();

        let cs = ConstraintSystem::<Fr>::new_ref();
        let vars: Vec<FpVar<Fr>> = inputs
            .iter()
            .map(|v| FpVar::new_witness(cs.clone(), || Ok(*v)).unwrap())
            .collect();
        let out = PoseidonGadget::new(5).unwrap().hash(&vars).unwrap();

        assert_eq!(out.value().unwrap(), expected);
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_gadget_matches_native_two_inputs() {
        let inputs = [Fr::from(424242u64), Fr::from(987654321u64)];
        let expected = nullifier(inputs[0], inputs[1]).unwrap();

        let cs = ConstraintSystem::<Fr>::new_ref();
        let vars: Vec<FpVar<Fr>> = inputs
            .iter()
            .map(|v| FpVar::new_witness(cs.clone(), || Ok(*v)).unwrap())
            .collect();
        let out = PoseidonGadget::new(2).unwrap().hash(&vars).unwrap();

        assert_eq!(out.value().unwrap(), expected);
    }

    #[test]
    fn test_gadget_rejects_wrong_arity() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let one = FpVar::new_witness(cs, || Ok(Fr::from(1u8))).unwrap();
        assert!(PoseidonGadget::new(2).unwrap().hash(&[one]).is_err());
    }
}
