//! Public-input commitment.
//!
//! The wrapped proof exposes 32 public inputs, each one byte of a big-endian
//! SHA-256 digest truncated to 253 bits. The wrapper circuit folds them into a
//! single BN254 scalar. The same fold runs natively (to compute the value the
//! caller must declare) and in-circuit (to bind that value to the limbs the
//! inner proof actually committed to).

use ark_bn254::Fr;
use ark_ff::{One, PrimeField, Zero};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::SynthesisError;
use num_bigint::BigUint;

use crate::error::ProverError;

pub const PUBLIC_INPUT_LIMBS: usize = 32;
pub const HASH_BITS: u64 = 253;

/// Fold the limbs into a big-endian integer, rejecting anything that does not
/// fit the commitment field.
pub fn public_input_hash(limbs: &[u64]) -> Result<BigUint, ProverError> {
    if limbs.len() != PUBLIC_INPUT_LIMBS {
        return Err(ProverError::PublicInputCount {
            expected: PUBLIC_INPUT_LIMBS,
            actual: limbs.len(),
        });
    }

    let mut hash = BigUint::zero();
    let mut weight = BigUint::one();
    for i in 0..PUBLIC_INPUT_LIMBS {
        let index = PUBLIC_INPUT_LIMBS - 1 - i;
        let limb = limbs[index];
        if limb > u64::from(u8::MAX) {
            return Err(ProverError::LimbOutOfRange { index, value: limb });
        }
        hash += &weight * limb;
        weight <<= 8;
    }

    if hash.bits() > HASH_BITS {
        return Err(ProverError::HashOutOfRange { bits: hash.bits() });
    }
    Ok(hash)
}

/// Same as [`public_input_hash`], lifted into the scalar field.
pub fn public_input_hash_field(limbs: &[u64]) -> Result<Fr, ProverError> {
    let hash = public_input_hash(limbs)?;
    Ok(Fr::from_le_bytes_mod_order(&hash.to_bytes_le()))
}

/// Inverse of the fold: the 32 big-endian bytes a commitment was built from.
pub fn limbs_from_hash(hash: &BigUint) -> Result<[u8; PUBLIC_INPUT_LIMBS], ProverError> {
    if hash.bits() > HASH_BITS {
        return Err(ProverError::HashOutOfRange { bits: hash.bits() });
    }
    let bytes = hash.to_bytes_be();
    let mut limbs = [0u8; PUBLIC_INPUT_LIMBS];
    limbs[PUBLIC_INPUT_LIMBS - bytes.len()..].copy_from_slice(&bytes);
    Ok(limbs)
}

/// In-circuit fold. `limbs` are already 8-bit constrained by their `UInt8`
/// allocation; the top three bits of the leading limb are forced to zero so
/// the commitment stays below 2^253.
pub fn enforce_public_input_hash(
    limbs: &[UInt8<Fr>],
    expected: &FpVar<Fr>,
) -> Result<(), SynthesisError> {
    if limbs.len() != PUBLIC_INPUT_LIMBS {
        return Err(SynthesisError::Unsatisfiable);
    }

    let leading_bits = limbs[0].to_bits_le()?;
    for bit in &leading_bits[5..] {
        bit.enforce_equal(&Boolean::constant(false))?;
    }

    let radix = Fr::from(256u64);
    let mut weight = Fr::one();
    let mut digest = FpVar::<Fr>::zero();
    for i in 0..PUBLIC_INPUT_LIMBS {
        let bits = limbs[PUBLIC_INPUT_LIMBS - 1 - i].to_bits_le()?;
        let limb = Boolean::le_bits_to_fp_var(&bits)?;
        digest += limb * weight;
        weight *= radix;
    }

    expected.enforce_equal(&digest)
}
