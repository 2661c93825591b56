//! JSON model of the plonky2 artifacts being wrapped.
//!
//! The inner proof is produced with a Poseidon-BN254 hasher, so every Merkle
//! cap element and the circuit digest arrive as decimal strings of BN254
//! scalars. Fields the wrapper never inspects are kept as raw JSON so the
//! documents round-trip untouched.

use std::path::Path;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::PrimeField;
use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProverError;

pub const COMMON_CIRCUIT_DATA_FILE: &str = "common_circuit_data.json";
pub const VERIFIER_ONLY_CIRCUIT_DATA_FILE: &str = "verifier_only_circuit_data.json";
pub const PROOF_WITH_PUBLIC_INPUTS_FILE: &str = "proof_with_public_inputs.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriConfig {
    pub rate_bits: usize,
    pub cap_height: usize,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub num_wires: usize,
    pub num_routed_wires: usize,
    pub fri_config: FriConfig,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriParams {
    pub degree_bits: usize,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Static shape of the inner circuit family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonCircuitData {
    pub config: CircuitConfig,
    pub fri_params: FriParams,
    #[serde(default)]
    pub gates: Vec<String>,
    pub num_public_inputs: usize,
    #[serde(default)]
    pub num_constants: usize,
    #[serde(default)]
    pub num_partial_products: usize,
    #[serde(default)]
    pub quotient_degree_factor: usize,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CommonCircuitData {
    /// Number of entries every Merkle cap of this circuit carries.
    pub fn cap_len(&self) -> usize {
        1usize << self.config.fri_config.cap_height
    }
}

/// Per-instance verifier material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierOnlyCircuitData {
    pub constants_sigmas_cap: Vec<String>,
    pub circuit_digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub wires_cap: Vec<String>,
    pub plonk_zs_partial_products_cap: Vec<String>,
    pub quotient_polys_cap: Vec<String>,
    pub openings: serde_json::Value,
    pub opening_proof: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofWithPublicInputs {
    pub proof: Proof,
    pub public_inputs: Vec<u64>,
}

impl ProofWithPublicInputs {
    /// Check the Merkle caps and public input count against the circuit
    /// shape the wrapper was compiled for.
    pub fn check_shape(&self, common: &CommonCircuitData) -> Result<(), ProverError> {
        let expected = common.cap_len();
        let caps = [
            ("wires_cap", &self.proof.wires_cap),
            (
                "plonk_zs_partial_products_cap",
                &self.proof.plonk_zs_partial_products_cap,
            ),
            ("quotient_polys_cap", &self.proof.quotient_polys_cap),
        ];
        for (name, cap) in caps {
            if cap.len() != expected {
                return Err(ProverError::Witness(format!(
                    "{} has {} entries, circuit expects {}",
                    name,
                    cap.len(),
                    expected
                )));
            }
        }
        if self.public_inputs.len() != common.num_public_inputs {
            return Err(ProverError::Witness(format!(
                "proof carries {} public inputs, circuit expects {}",
                self.public_inputs.len(),
                common.num_public_inputs
            )));
        }
        Ok(())
    }
}

impl VerifierOnlyCircuitData {
    pub fn check_shape(&self, common: &CommonCircuitData) -> Result<(), ProverError> {
        if self.constants_sigmas_cap.len() != common.cap_len() {
            return Err(ProverError::Witness(format!(
                "constants_sigmas_cap has {} entries, circuit expects {}",
                self.constants_sigmas_cap.len(),
                common.cap_len()
            )));
        }
        Ok(())
    }

    pub fn circuit_digest(&self) -> Result<Fr, ProverError> {
        parse_field_element(&self.circuit_digest)
    }
}

/// Parse a canonical decimal BN254 scalar. Values at or above the modulus are
/// rejected instead of being reduced.
pub fn parse_field_element(value: &str) -> Result<Fr, ProverError> {
    let integer = BigUint::from_str(value.trim())
        .map_err(|e| ProverError::Witness(format!("invalid field element {:?}: {}", value, e)))?;
    if integer >= BigUint::from(Fr::MODULUS) {
        return Err(ProverError::Witness(format!(
            "field element {} is not below the BN254 modulus",
            value
        )));
    }
    Ok(Fr::from_le_bytes_mod_order(&integer.to_bytes_le()))
}

pub fn parse_field_elements(values: &[String]) -> Result<Vec<Fr>, ProverError> {
    values.iter().map(|v| parse_field_element(v)).collect()
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProverError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ProverError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| ProverError::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_common_circuit_data_deserialize() {
        let common: CommonCircuitData =
            serde_json::from_value(fixtures::common_circuit_data_json()).unwrap();
        assert_eq!(common.num_public_inputs, 32);
        assert_eq!(common.config.fri_config.cap_height, 1);
        assert_eq!(common.cap_len(), 2);
        assert_eq!(common.fri_params.degree_bits, 12);
    }

    #[test]
    fn test_common_circuit_data_keeps_unknown_fields() {
        let common: CommonCircuitData =
            serde_json::from_value(fixtures::common_circuit_data_json()).unwrap();
        let json = serde_json::to_value(&common).unwrap();
        assert_eq!(json["k_is"], serde_json::json!([1, 7]));
        assert_eq!(json["config"]["security_bits"], 100);
    }

    #[test]
    fn test_proof_with_public_inputs_missing_field() {
        let json = r#"{"proof": {"wires_cap": []}, "public_inputs": []}"#;
        let result: Result<ProofWithPublicInputs, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_shape_accepts_fixture() {
        let common = fixtures::common_circuit_data();
        fixtures::proof_with_public_inputs()
            .check_shape(&common)
            .unwrap();
        fixtures::verifier_only_circuit_data()
            .check_shape(&common)
            .unwrap();
    }

    #[test]
    fn test_check_shape_rejects_short_cap() {
        let common = fixtures::common_circuit_data();
        let mut proof = fixtures::proof_with_public_inputs();
        proof.proof.quotient_polys_cap.pop();
        let err = proof.check_shape(&common).unwrap_err();
        assert!(err.to_string().contains("quotient_polys_cap"));
    }

    #[test]
    fn test_check_shape_rejects_public_input_count() {
        let common = fixtures::common_circuit_data();
        let mut proof = fixtures::proof_with_public_inputs();
        proof.public_inputs.push(0);
        let err = proof.check_shape(&common).unwrap_err();
        assert!(err.to_string().contains("33 public inputs"));
    }

    #[test]
    fn test_parse_field_element() {
        assert_eq!(parse_field_element("42").unwrap(), Fr::from(42u64));
        assert!(parse_field_element("not a number").is_err());
        assert!(parse_field_element("-1").is_err());
    }

    #[test]
    fn test_parse_field_element_rejects_modulus() {
        let modulus = BigUint::from(Fr::MODULUS).to_string();
        assert!(parse_field_element(&modulus).is_err());
        let below = (BigUint::from(Fr::MODULUS) - 1u32).to_string();
        assert!(parse_field_element(&below).is_ok());
    }

    #[test]
    fn test_read_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMMON_CIRCUIT_DATA_FILE);
        std::fs::write(&path, "not valid json").unwrap();
        let err = read_json::<CommonCircuitData>(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
        assert!(err.to_string().contains(COMMON_CIRCUIT_DATA_FILE));

        let missing = read_json::<CommonCircuitData>(&dir.path().join("missing.json"));
        assert!(missing.unwrap_err().to_string().contains("failed to access"));
    }
}
