//! Public signal vector and the off-chain signal verifier

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use ark_bn254::Fr;
use serde::Serialize;

use crate::codec::{self, address_to_u256, b256_to_u256, split};
use crate::error::{CircuitError, Result};

/// Number of public inputs of the billing circuit.
pub const SIGNAL_COUNT: usize = 12;

/// Labels in public-input order.
pub const SIGNAL_LABELS: [&str; SIGNAL_COUNT] = [
    "userLo",
    "userHi",
    "modelIdLo",
    "modelIdHi",
    "priceLo",
    "priceHi",
    "costLo",
    "costHi",
    "usageHashLo",
    "usageHashHi",
    "nullifierLo",
    "nullifierHi",
];

/// The six values a billing proof makes public.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCommitment {
    pub user: Address,
    pub model_id: B256,
    pub price_per_token_wei: U256,
    pub cost_wei: U256,
    pub usage_hash: B256,
    pub nullifier: B256,
}

impl BillingCommitment {
    /// Cost, usage hash and nullifier are field elements. The circuit joins
    /// limbs modulo the field, so a value `v + p` proves exactly like `v`;
    /// only values below the modulus are accepted for settlement.
    pub fn is_canonical(&self) -> bool {
        let modulus = codec::field_modulus();
        self.cost_wei < modulus
            && b256_to_u256(self.usage_hash) < modulus
            && b256_to_u256(self.nullifier) < modulus
    }
}

/// The 12 limb-encoded public inputs, in circuit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicSignals([U256; SIGNAL_COUNT]);

impl PublicSignals {
    pub fn new(values: [U256; SIGNAL_COUNT]) -> Self {
        Self(values)
    }

    /// Limb-splits a commitment into the fixed public-input order.
    pub fn from_commitment(commitment: &BillingCommitment) -> Self {
        let values = [
            address_to_u256(commitment.user),
            b256_to_u256(commitment.model_id),
            commitment.price_per_token_wei,
            commitment.cost_wei,
            b256_to_u256(commitment.usage_hash),
            b256_to_u256(commitment.nullifier),
        ];

        let mut signals = [U256::ZERO; SIGNAL_COUNT];
        for (i, value) in values.into_iter().enumerate() {
            let limbs = split(value);
            signals[2 * i] = U256::from(limbs.lo);
            signals[2 * i + 1] = U256::from(limbs.hi);
        }
        Self(signals)
    }

    /// Parses the wire form: exactly 12 canonical decimal strings.
    pub fn from_decimal_strings<S: AsRef<str>>(values: &[S]) -> Result<Self> {
        if values.len() != SIGNAL_COUNT {
            return Err(CircuitError::validation(
                "publicSignals",
                format!("expected {SIGNAL_COUNT} values, got {}", values.len()),
            ));
        }
        let mut signals = [U256::ZERO; SIGNAL_COUNT];
        for (slot, raw) in signals.iter_mut().zip(values) {
            *slot = codec::parse_decimal("publicSignals", raw.as_ref())?;
        }
        Ok(Self(signals))
    }

    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.0.iter().map(|v| v.to_string()).collect()
    }

    pub fn as_slice(&self) -> &[U256] {
        &self.0
    }

    /// Field elements for Groth16; `None` if any signal is not below the modulus.
    pub fn to_field_elements(&self) -> Option<Vec<Fr>> {
        self.0.iter().map(|v| codec::u256_to_fr_checked(*v)).collect()
    }

    /// Element-wise comparison against the signals reported alongside a proof.
    pub fn diff(&self, reported: &PublicSignals) -> Vec<SignalDiff> {
        self.0
            .iter()
            .zip(reported.0.iter())
            .enumerate()
            .filter(|(_, (expected, received))| expected != received)
            .map(|(index, (expected, received))| SignalDiff {
                index,
                label: SIGNAL_LABELS[index],
                expected: *expected,
                received: *received,
            })
            .collect()
    }
}

impl std::ops::Index<usize> for PublicSignals {
    type Output = U256;

    fn index(&self, index: usize) -> &U256 {
        &self.0[index]
    }
}

/// One mismatching position of a public signal vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalDiff {
    pub index: usize,
    pub label: &'static str,
    #[serde(serialize_with = "serialize_decimal")]
    pub expected: U256,
    #[serde(serialize_with = "serialize_decimal")]
    pub received: U256,
}

impl fmt::Display for SignalDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: expected {}, received {}",
            self.index, self.label, self.expected, self.received
        )
    }
}

fn serialize_decimal<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Recomputes the expected vector from the claimed public values and compares
/// it to the reported one. Returns every mismatching index.
pub fn verify_signals(
    claimed: &BillingCommitment,
    reported: &PublicSignals,
) -> std::result::Result<(), Vec<SignalDiff>> {
    let diffs = PublicSignals::from_commitment(claimed).diff(reported);
    if diffs.is_empty() {
        Ok(())
    } else {
        Err(diffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    fn commitment() -> BillingCommitment {
        BillingCommitment {
            user: Address::repeat_byte(0x11),
            model_id: keccak256(b"llm-secure-7b"),
            price_per_token_wei: U256::from(1_000_000_000u64),
            cost_wei: U256::from(30_000_000_000u64),
            usage_hash: B256::repeat_byte(0x22),
            nullifier: B256::repeat_byte(0x03),
        }
    }

    #[test]
    fn test_aliased_values_are_not_canonical() {
        assert!(commitment().is_canonical());

        let modulus = codec::field_modulus();
        let mut aliased = commitment();
        aliased.nullifier = codec::u256_to_b256(b256_to_u256(aliased.nullifier) + modulus);
        assert!(!aliased.is_canonical());

        let mut aliased = commitment();
        aliased.cost_wei += modulus;
        assert!(!aliased.is_canonical());

        let mut aliased = commitment();
        aliased.usage_hash = codec::u256_to_b256(modulus);
        assert!(!aliased.is_canonical());
    }

    #[test]
    fn test_signal_order_follows_labels() {
        let c = commitment();
        let signals = PublicSignals::from_commitment(&c);

        assert_eq!(signals[4], U256::from(1_000_000_000u64)); // priceLo
        assert_eq!(signals[5], U256::ZERO); // priceHi
        assert_eq!(signals[6], U256::from(30_000_000_000u64)); // costLo

        let user = codec::join(codec::Limbs {
            lo: signals[0].to::<u128>(),
            hi: signals[1].to::<u128>(),
        });
        assert_eq!(user, address_to_u256(c.user));
    }

    #[test]
    fn test_matching_signals_verify() {
        let c = commitment();
        let reported = PublicSignals::from_commitment(&c);
        assert!(verify_signals(&c, &reported).is_ok());
    }

    #[test]
    fn test_mismatch_is_index_addressable() {
        let c = commitment();
        let mut tampered = c;
        tampered.cost_wei = U256::from(1u8);
        let reported = PublicSignals::from_commitment(&tampered);

        let diffs = verify_signals(&c, &reported).unwrap_err();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].index, 6);
        assert_eq!(diffs[0].label, "costLo");
        assert_eq!(diffs[0].received, U256::from(1u8));
    }

    #[test]
    fn test_decimal_wire_form() {
        let signals = PublicSignals::from_commitment(&commitment());
        let wire = signals.to_decimal_strings();
        assert_eq!(wire.len(), SIGNAL_COUNT);
        assert_eq!(PublicSignals::from_decimal_strings(&wire).unwrap(), signals);

        assert!(PublicSignals::from_decimal_strings(&wire[..11]).is_err());
        let mut bad = wire.clone();
        bad[3] = "0xff".to_string();
        assert!(PublicSignals::from_decimal_strings(&bad).is_err());
    }

    #[test]
    fn test_limbs_are_field_elements() {
        let signals = PublicSignals::from_commitment(&commitment());
        assert_eq!(signals.to_field_elements().unwrap().len(), SIGNAL_COUNT);

        let mut values = [U256::ZERO; SIGNAL_COUNT];
        values[0] = codec::field_modulus();
        assert!(PublicSignals::new(values).to_field_elements().is_none());
    }

    #[test]
    fn test_diff_serializes_decimal() {
        let diff = SignalDiff {
            index: 6,
            label: "costLo",
            expected: U256::from(30u8),
            received: U256::from(1u8),
        };
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(json["expected"], "30");
        assert_eq!(json["label"], "costLo");
    }
}
