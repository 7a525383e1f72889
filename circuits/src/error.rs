//! Error types for the billing circuit crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CircuitError {
    /// A boundary value could not be interpreted; never reaches the prover.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// `(inputTokens + outputTokens) * price` does not fit below the field modulus.
    #[error("costWei exceeds field modulus")]
    CostOutOfRange,

    #[error("missing circuit artifact {}: run harpocrates-setup first", .0.display())]
    MissingArtifact(PathBuf),

    #[error("unreadable circuit artifact {}: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("proof generation failed: {0}")]
    Proving(String),

    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CircuitError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CircuitError::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T, E = CircuitError> = std::result::Result<T, E>;
