//! Harpocrates billing circuit
//!
//! Proves, without revealing token counts, that
//! `cost = (inputTokens + outputTokens) * pricePerTokenWei` and binds that
//! cost to a usage commitment and a one-time nullifier:
//!
//! ```text
//! usageHash = Poseidon(user, modelId, inputTokens, outputTokens, nonce)
//! nullifier = Poseidon(userSecret, usageHash)
//! ```
//!
//! Groth16 over BN254. The twelve public inputs are the limb encodings of
//! `user, modelId, price, cost, usageHash, nullifier`.

pub mod circuit;
pub mod codec;
pub mod error;
pub mod inputs;
pub mod model_id;
pub mod poseidon;
pub mod proof;
pub mod prover;
pub mod signals;
pub mod verifier;

pub use circuit::BillingCircuit;
pub use error::CircuitError;
pub use inputs::BillingProofInput;
pub use model_id::normalize_model_id;
pub use proof::SolidityProof;
pub use prover::{ArtifactPaths, BillingProof, BillingProver};
pub use signals::{verify_signals, BillingCommitment, PublicSignals, SignalDiff, SIGNAL_LABELS};
pub use verifier::{Groth16Verifier, ProofVerifier};
