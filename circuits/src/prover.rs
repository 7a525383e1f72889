//! Groth16 prover for billing proofs
//!
//! The proving key is loaded once and shared read-only between concurrent
//! requests; `prove` takes `&self` and never mutates it.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use alloy_primitives::{B256, U256};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisMode};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use rand::{rngs::OsRng, CryptoRng, RngCore};

use crate::circuit::BillingCircuit;
use crate::error::{CircuitError, Result};
use crate::inputs::BillingProofInput;
use crate::proof::SolidityProof;
use crate::signals::{BillingCommitment, PublicSignals};

pub const PROVING_KEY_FILE: &str = "billing.pk";
pub const VERIFYING_KEY_FILE: &str = "billing.vk";

/// Locations of the precompiled circuit artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub proving_key: PathBuf,
    pub verifying_key: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            proving_key: dir.join(PROVING_KEY_FILE),
            verifying_key: dir.join(VERIFYING_KEY_FILE),
        }
    }

    /// Fails with the first artifact that is not on disk.
    pub fn ensure(&self) -> Result<()> {
        for path in [&self.proving_key, &self.verifying_key] {
            if !path.exists() {
                return Err(CircuitError::MissingArtifact(path.clone()));
            }
        }
        Ok(())
    }
}

/// Output of one proving run.
#[derive(Debug, Clone)]
pub struct BillingProof {
    pub proof: SolidityProof,
    pub public_signals: PublicSignals,
    pub commitment: BillingCommitment,
}

impl BillingProof {
    pub fn usage_hash(&self) -> B256 {
        self.commitment.usage_hash
    }

    pub fn nullifier(&self) -> B256 {
        self.commitment.nullifier
    }

    pub fn cost_wei(&self) -> U256 {
        self.commitment.cost_wei
    }

    pub fn price_per_token_wei(&self) -> U256 {
        self.commitment.price_per_token_wei
    }
}

pub struct BillingProver {
    pk: ProvingKey<Bn254>,
}

impl BillingProver {
    pub fn new(pk: ProvingKey<Bn254>) -> Self {
        Self { pk }
    }

    /// Reads the proving key. Missing or unreadable artifacts are fatal.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        paths.ensure()?;
        let path = &paths.proving_key;
        let reader = BufReader::new(File::open(path)?);
        let pk = ProvingKey::<Bn254>::deserialize_uncompressed_unchecked(reader).map_err(|e| {
            CircuitError::CorruptArtifact {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        tracing::info!("Loaded proving key from {}", path.display());
        Ok(Self { pk })
    }

    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.pk.vk
    }

    pub fn prove(&self, input: &BillingProofInput) -> Result<BillingProof> {
        self.prove_with_rng(input, &mut OsRng)
    }

    pub fn prove_with_rng<R: RngCore + CryptoRng>(
        &self,
        input: &BillingProofInput,
        rng: &mut R,
    ) -> Result<BillingProof> {
        // All preconditions (cost range, field bounds) are checked here,
        // before any witness is built.
        let commitment = input.commitment()?;
        let public_signals = PublicSignals::from_commitment(&commitment);
        let circuit = BillingCircuit::with_witness(input, public_signals);

        tracing::debug!(
            "Proving usage: user={}, model={}, cost={}",
            commitment.user,
            commitment.model_id,
            commitment.cost_wei
        );

        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, rng)
            .map_err(|e| CircuitError::Proving(e.to_string()))?;

        Ok(BillingProof {
            proof: SolidityProof::from_groth16(&proof),
            public_signals,
            commitment,
        })
    }
}

/// Circuit-specific Groth16 setup.
pub fn generate_keys<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>)> {
    Groth16::<Bn254>::setup(BillingCircuit::blank(), rng)
        .map_err(|e| CircuitError::Proving(format!("setup failed: {e}")))
}

/// Writes both keys; the verifying key compressed, the proving key uncompressed
/// so it loads without point decompression.
pub fn write_artifacts(
    paths: &ArtifactPaths,
    pk: &ProvingKey<Bn254>,
    vk: &VerifyingKey<Bn254>,
) -> Result<()> {
    for path in [&paths.proving_key, &paths.verifying_key] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialize_error = |path: &PathBuf, e: ark_serialize::SerializationError| {
        CircuitError::CorruptArtifact {
            path: path.clone(),
            reason: e.to_string(),
        }
    };

    let writer = BufWriter::new(File::create(&paths.proving_key)?);
    pk.serialize_uncompressed(writer)
        .map_err(|e| serialize_error(&paths.proving_key, e))?;

    let writer = BufWriter::new(File::create(&paths.verifying_key)?);
    vk.serialize_compressed(writer)
        .map_err(|e| serialize_error(&paths.verifying_key, e))?;

    Ok(())
}

/// Number of R1CS constraints of the billing circuit.
pub fn constraint_count() -> Result<usize> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    // The blank circuit carries no assignments.
    cs.set_mode(SynthesisMode::Setup);
    BillingCircuit::blank()
        .generate_constraints(cs.clone())
        .map_err(|e| CircuitError::Proving(e.to_string()))?;
    Ok(cs.num_constraints())
}

/// Result of a completed key generation.
#[derive(Debug, Clone, Copy)]
pub struct SetupSummary {
    pub constraints: usize,
    pub public_inputs: usize,
}

/// Synthesizes the circuit, runs the Groth16 setup and writes both keys.
pub fn setup<R: RngCore + CryptoRng>(paths: &ArtifactPaths, rng: &mut R) -> Result<SetupSummary> {
    let constraints = constraint_count()?;
    tracing::info!("Billing circuit has {} constraints", constraints);

    tracing::info!("Running Groth16 setup...");
    let (pk, vk) = generate_keys(rng)?;
    write_artifacts(paths, &pk, &vk)?;

    Ok(SetupSummary {
        constraints,
        public_inputs: vk.gamma_abc_g1.len().saturating_sub(1),
    })
}
