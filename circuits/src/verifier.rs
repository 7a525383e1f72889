//! Proof verification gate

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ark_bn254::Bn254;
use ark_groth16::{Groth16, PreparedVerifyingKey, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;

use crate::error::{CircuitError, Result};
use crate::proof::SolidityProof;
use crate::signals::PublicSignals;

/// Anything that can decide whether a billing proof is valid for a signal vector.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &SolidityProof, signals: &PublicSignals) -> bool;
}

/// Groth16 verifier over BN254 with a preprocessed verifying key.
pub struct Groth16Verifier {
    pvk: PreparedVerifyingKey<Bn254>,
}

impl Groth16Verifier {
    pub fn new(vk: &VerifyingKey<Bn254>) -> Result<Self> {
        let pvk = Groth16::<Bn254>::process_vk(vk)
            .map_err(|e| CircuitError::Proving(format!("failed to prepare verifying key: {e}")))?;
        Ok(Self { pvk })
    }

    /// Loads a verifying key written by `harpocrates-setup`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CircuitError::MissingArtifact(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(reader).map_err(|e| {
            CircuitError::CorruptArtifact {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        Self::new(&vk)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, proof: &SolidityProof, signals: &PublicSignals) -> bool {
        let Ok(proof) = proof.to_groth16() else {
            tracing::debug!("rejecting proof with malformed curve points");
            return false;
        };
        let Some(inputs) = signals.to_field_elements() else {
            tracing::debug!("rejecting public signals outside the scalar field");
            return false;
        };
        Groth16::<Bn254>::verify_with_processed_vk(&self.pvk, &inputs, &proof).unwrap_or(false)
    }
}
