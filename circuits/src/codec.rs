//! Field/limb codec
//!
//! Every public value of the billing circuit is carried as two 128-bit limbs,
//! `value = lo + hi * 2^128`. The same two functions are used by the prover,
//! the off-chain signal verifier and the ledger, so all three reconstruct the
//! public signal vector identically.

use alloy_primitives::{Address, B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInt, BigInteger, PrimeField};

use crate::error::{CircuitError, Result};

/// Width of a single limb in bits.
pub const LIMB_BITS: usize = 128;

/// Two 128-bit limbs of a 256-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limbs {
    pub lo: u128,
    pub hi: u128,
}

/// `lo = v mod 2^128`, `hi = v div 2^128`
pub fn split(value: U256) -> Limbs {
    let words = value.as_limbs();
    Limbs {
        lo: (words[0] as u128) | ((words[1] as u128) << 64),
        hi: (words[2] as u128) | ((words[3] as u128) << 64),
    }
}

/// `lo + hi * 2^128`
pub fn join(limbs: Limbs) -> U256 {
    U256::from(limbs.lo) | (U256::from(limbs.hi) << LIMB_BITS)
}

/// Modulus of the BN254 scalar field.
pub fn field_modulus() -> U256 {
    U256::from_limbs(Fr::MODULUS.0)
}

/// Reduces a 256-bit value into the scalar field.
pub fn u256_to_fr(value: U256) -> Fr {
    Fr::from_be_bytes_mod_order(&value.to_be_bytes::<32>())
}

/// Interprets a value as a field element, rejecting anything not below the modulus.
pub fn u256_to_fr_checked(value: U256) -> Option<Fr> {
    Fr::from_bigint(BigInt::new(*value.as_limbs()))
}

pub fn fr_to_u256(value: Fr) -> U256 {
    U256::from_limbs(value.into_bigint().0)
}

pub fn fr_to_b256(value: Fr) -> B256 {
    B256::from_slice(&value.into_bigint().to_bytes_be())
}

pub fn address_to_u256(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

pub fn b256_to_u256(value: B256) -> U256 {
    U256::from_be_bytes(value.0)
}

pub fn u256_to_b256(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Parses the canonical boundary encoding of an integer: a non-empty string of ASCII digits.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<U256> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CircuitError::validation(
            field,
            format!("expected a decimal integer string, got {raw:?}"),
        ));
    }
    U256::from_str_radix(raw, 10)
        .map_err(|e| CircuitError::validation(field, format!("out of range: {e}")))
}

/// Same encoding as [`parse_decimal`], bounded to 64 bits (token counts).
pub fn parse_token_count(field: &'static str, raw: &str) -> Result<u64> {
    let value = parse_decimal(field, raw)?;
    u64::try_from(value)
        .map_err(|_| CircuitError::validation(field, "token count does not fit in 64 bits"))
}

/// Parses a decimal string that must also be a valid scalar field element.
pub fn parse_field_element(field: &'static str, raw: &str) -> Result<U256> {
    let value = parse_decimal(field, raw)?;
    if value >= field_modulus() {
        return Err(CircuitError::validation(field, "not below the field modulus"));
    }
    Ok(value)
}
