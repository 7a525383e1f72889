//! Groth16 proof in the `(a, b, c)` layout consumed by EVM verifiers

use alloy_primitives::U256;
use ark_bn254::{Bn254, Fq, Fq2, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::{BigInt, PrimeField};
use ark_groth16::Proof;

use crate::codec::parse_decimal;
use crate::error::{CircuitError, Result};

/// `b` coordinates are in `(c1, c0)` order, matching the EVM pairing precompile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidityProof {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
}

impl SolidityProof {
    pub fn from_groth16(proof: &Proof<Bn254>) -> Self {
        Self {
            a: g1_coords(&proof.a),
            b: g2_coords(&proof.b),
            c: g1_coords(&proof.c),
        }
    }

    /// Decodes back into curve points, rejecting coordinates off the curve or
    /// outside the prime-order subgroup.
    pub fn to_groth16(&self) -> Result<Proof<Bn254>> {
        Ok(Proof {
            a: g1_point(&self.a)?,
            b: g2_point(&self.b)?,
            c: g1_point(&self.c)?,
        })
    }

    /// Parses the wire form; each array must have exactly the expected shape.
    pub fn from_decimal_strings(a: &[String], b: &[Vec<String>], c: &[String]) -> Result<Self> {
        let shape_error = || CircuitError::validation("proof", "expected a:[2], b:[2][2], c:[2]");
        if a.len() != 2 || c.len() != 2 || b.len() != 2 || b.iter().any(|row| row.len() != 2) {
            return Err(shape_error());
        }
        let pair = |values: &[String]| -> Result<[U256; 2]> {
            Ok([
                parse_decimal("proof", &values[0])?,
                parse_decimal("proof", &values[1])?,
            ])
        };
        Ok(Self {
            a: pair(a)?,
            b: [pair(&b[0])?, pair(&b[1])?],
            c: pair(c)?,
        })
    }

    pub fn to_decimal_strings(&self) -> (Vec<String>, Vec<Vec<String>>, Vec<String>) {
        let pair = |values: &[U256; 2]| values.iter().map(U256::to_string).collect::<Vec<_>>();
        (
            pair(&self.a),
            self.b.iter().map(pair).collect(),
            pair(&self.c),
        )
    }
}

fn fq_to_u256(value: Fq) -> U256 {
    U256::from_limbs(value.into_bigint().0)
}

fn u256_to_fq(value: U256) -> Result<Fq> {
    Fq::from_bigint(BigInt::new(*value.as_limbs()))
        .ok_or_else(|| CircuitError::MalformedProof("coordinate not below base field modulus".into()))
}

fn g1_coords(point: &G1Affine) -> [U256; 2] {
    match point.xy() {
        Some((x, y)) => [fq_to_u256(*x), fq_to_u256(*y)],
        None => [U256::ZERO; 2],
    }
}

fn g2_coords(point: &G2Affine) -> [[U256; 2]; 2] {
    match point.xy() {
        Some((x, y)) => [
            [fq_to_u256(x.c1), fq_to_u256(x.c0)],
            [fq_to_u256(y.c1), fq_to_u256(y.c0)],
        ],
        None => [[U256::ZERO; 2]; 2],
    }
}

fn g1_point(coords: &[U256; 2]) -> Result<G1Affine> {
    if coords.iter().all(|c| c.is_zero()) {
        return Ok(G1Affine::zero());
    }
    let point = G1Affine::new_unchecked(u256_to_fq(coords[0])?, u256_to_fq(coords[1])?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(CircuitError::MalformedProof("G1 point not on curve".into()));
    }
    Ok(point)
}

fn g2_point(coords: &[[U256; 2]; 2]) -> Result<G2Affine> {
    if coords.iter().flatten().all(|c| c.is_zero()) {
        return Ok(G2Affine::zero());
    }
    let x = Fq2::new(u256_to_fq(coords[0][1])?, u256_to_fq(coords[0][0])?);
    let y = Fq2::new(u256_to_fq(coords[1][1])?, u256_to_fq(coords[1][0])?);
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(CircuitError::MalformedProof("G2 point not on curve".into()));
    }
    Ok(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::CurveGroup;
    use ark_ff::UniformRand;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    fn sample_proof() -> Proof<Bn254> {
        let mut rng = StdRng::seed_from_u64(7);
        Proof {
            a: (G1Affine::generator() * ark_bn254::Fr::rand(&mut rng)).into_affine(),
            b: (G2Affine::generator() * ark_bn254::Fr::rand(&mut rng)).into_affine(),
            c: (G1Affine::generator() * ark_bn254::Fr::rand(&mut rng)).into_affine(),
        }
    }

    #[test]
    fn test_groth16_layout_round_trip() {
        let proof = sample_proof();
        let encoded = SolidityProof::from_groth16(&proof);
        assert_eq!(encoded.to_groth16().unwrap(), proof);
    }

    #[test]
    fn test_g2_coordinates_are_swapped() {
        let proof = sample_proof();
        let encoded = SolidityProof::from_groth16(&proof);
        let (x, _) = proof.b.xy().unwrap();
        assert_eq!(encoded.b[0][0], fq_to_u256(x.c1));
        assert_eq!(encoded.b[0][1], fq_to_u256(x.c0));
    }

    #[test]
    fn test_flipped_bit_in_a_is_rejected() {
        let mut encoded = SolidityProof::from_groth16(&sample_proof());
        encoded.a[0] ^= U256::from(1u8);
        assert!(matches!(encoded.to_groth16(), Err(CircuitError::MalformedProof(_))));
    }

    #[test]
    fn test_wire_shape_is_checked() {
        let encoded = SolidityProof::from_groth16(&sample_proof());
        let (a, b, c) = encoded.to_decimal_strings();
        assert_eq!(SolidityProof::from_decimal_strings(&a, &b, &c).unwrap(), encoded);

        assert!(SolidityProof::from_decimal_strings(&a[..1], &b, &c).is_err());
        let ragged = vec![b[0].clone(), b[1][..1].to_vec()];
        assert!(SolidityProof::from_decimal_strings(&a, &ragged, &c).is_err());
    }
}
