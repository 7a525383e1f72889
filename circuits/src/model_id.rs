//! Canonical 256-bit model identifiers

use alloy_primitives::{keccak256, B256};

/// Normalizes a model identifier to bytes32.
///
/// A `0x`-prefixed 32-byte hex value is taken verbatim; anything else is
/// treated as a human-readable model name and hashed with keccak256.
pub fn normalize_model_id(model_id: &str) -> B256 {
    if model_id.len() == 66 && model_id.starts_with("0x") {
        if let Ok(id) = model_id.parse::<B256>() {
            return id;
        }
    }
    keccak256(model_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_id_passes_through() {
        let hex = "0x24fbb8669f430c88a6fefa469d5966e88bf38858927b8c3d2629d555a3bc5212";
        assert_eq!(normalize_model_id(hex).to_string(), hex);
    }

    #[test]
    fn test_name_is_hashed_deterministically() {
        let a = normalize_model_id("llm-secure-7b");
        let b = normalize_model_id("llm-secure-7b");
        assert_eq!(a, b);
        assert_eq!(a, keccak256(b"llm-secure-7b"));
        assert_ne!(a, normalize_model_id("llm-secure-13b"));
    }

    #[test]
    fn test_short_hex_is_treated_as_name() {
        assert_eq!(normalize_model_id("0x1234"), keccak256(b"0x1234"));
    }
}
