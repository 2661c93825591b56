//! Shared test data: a small plonky2 circuit description and a cached set of
//! compiled artifacts.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::{json, Value};

use crate::artifacts::Artifacts;
use crate::circuit::{StructuralVerifierChip, WrapperCircuit};
use crate::plonky2::{
    CommonCircuitData, ProofWithPublicInputs, VerifierOnlyCircuitData, COMMON_CIRCUIT_DATA_FILE,
    PROOF_WITH_PUBLIC_INPUTS_FILE, VERIFIER_ONLY_CIRCUIT_DATA_FILE,
};
use crate::srs::{SrsConfig, SRS_CACHE_FILE};

pub const CIRCUIT_DIGEST: &str = "9876543210123456789";

pub fn common_circuit_data_json() -> Value {
    json!({
        "config": {
            "num_wires": 135,
            "num_routed_wires": 80,
            "num_constants": 2,
            "use_base_arithmetic_gate": true,
            "security_bits": 100,
            "num_challenges": 2,
            "zero_knowledge": false,
            "max_quotient_degree_factor": 8,
            "fri_config": {
                "rate_bits": 3,
                "cap_height": 1,
                "proof_of_work_bits": 16,
                "reduction_strategy": { "ConstantArityBits": [4, 5] },
                "num_query_rounds": 28
            }
        },
        "fri_params": {
            "config": { "rate_bits": 3, "cap_height": 1 },
            "hiding": false,
            "degree_bits": 12,
            "reduction_arity_bits": [4, 4]
        },
        "gates": [
            "NoopGate",
            "ConstantGate { num_consts: 2 }",
            "PublicInputGate",
            "PoseidonGate(PhantomData<plonky2_field::goldilocks_field::GoldilocksField>)"
        ],
        "selectors_info": { "selector_indices": [0, 0, 0, 1], "groups": [] },
        "quotient_degree_factor": 8,
        "num_gate_constraints": 123,
        "num_constants": 4,
        "num_public_inputs": 32,
        "k_is": [1, 7],
        "num_partial_products": 9
    })
}

pub fn common_circuit_data() -> CommonCircuitData {
    serde_json::from_value(common_circuit_data_json()).unwrap()
}

pub fn verifier_only_circuit_data() -> VerifierOnlyCircuitData {
    VerifierOnlyCircuitData {
        constants_sigmas_cap: vec![
            "1234567890987654321".to_string(),
            "5555555555555555555".to_string(),
        ],
        circuit_digest: CIRCUIT_DIGEST.to_string(),
    }
}

/// 32 bytes whose big-endian value stays below 2^253.
pub fn public_inputs() -> Vec<u64> {
    let mut limbs: Vec<u64> = (0..32u64).map(|i| (i * 37 + 11) % 256).collect();
    limbs[0] = 0x1a;
    limbs
}

pub fn proof_with_public_inputs() -> ProofWithPublicInputs {
    serde_json::from_value(json!({
        "proof": {
            "wires_cap": ["11", "12"],
            "plonk_zs_partial_products_cap": ["21", "22"],
            "quotient_polys_cap": ["31", "32"],
            "openings": { "constants": [], "plonk_sigmas": [], "wires": [] },
            "opening_proof": { "commit_phase_merkle_caps": [], "pow_witness": 0 }
        },
        "public_inputs": public_inputs()
    }))
    .unwrap()
}

/// Body accepted by `POST /genProof`.
pub fn generate_proof_request_json() -> Value {
    json!({
        "verifier_only_circuit_data": verifier_only_circuit_data(),
        "proof_with_public_inputs": proof_with_public_inputs(),
    })
}

/// Write the three JSON documents plus a local SRS cache into `dir`.
pub fn write_circuit_dir(dir: &Path) {
    std::fs::write(
        dir.join(COMMON_CIRCUIT_DATA_FILE),
        serde_json::to_vec_pretty(&common_circuit_data_json()).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join(VERIFIER_ONLY_CIRCUIT_DATA_FILE),
        serde_json::to_vec_pretty(&verifier_only_circuit_data()).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join(PROOF_WITH_PUBLIC_INPUTS_FILE),
        serde_json::to_vec_pretty(&proof_with_public_inputs()).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.join(SRS_CACHE_FILE), b"test transcript").unwrap();
}

/// SRS config that can never reach the network.
pub fn offline_srs_config() -> SrsConfig {
    SrsConfig {
        url_template: "http://127.0.0.1:9/srs-{k}".to_string(),
        timeout: Duration::from_millis(200),
    }
}

/// Artifacts compiled once per test binary.
pub fn compiled_artifacts() -> Arc<Artifacts> {
    static ARTIFACTS: OnceLock<Arc<Artifacts>> = OnceLock::new();
    ARTIFACTS
        .get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            write_circuit_dir(dir.path());
            Arc::new(
                Artifacts::compile(
                    dir.path(),
                    Arc::new(StructuralVerifierChip),
                    &offline_srs_config(),
                )
                .unwrap(),
            )
        })
        .clone()
}

pub fn request_circuit() -> WrapperCircuit {
    WrapperCircuit::for_request(
        Arc::new(common_circuit_data()),
        Arc::new(StructuralVerifierChip),
        &proof_with_public_inputs(),
        &verifier_only_circuit_data(),
    )
    .unwrap()
}
