use std::path::Path;
use std::sync::Arc;

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::ns;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::binder::{self, PUBLIC_INPUT_LIMBS};
use crate::error::ProverError;
use crate::plonky2::{
    parse_field_elements, read_json, CommonCircuitData, ProofWithPublicInputs,
    VerifierOnlyCircuitData, COMMON_CIRCUIT_DATA_FILE, PROOF_WITH_PUBLIC_INPUTS_FILE,
    VERIFIER_ONLY_CIRCUIT_DATA_FILE,
};

/// In-circuit verifier for the wrapped plonky2 proof.
///
/// Implementations add whatever constraints are needed to show that `proof`
/// verifies against `verifier_data` for a circuit shaped like `common`.
pub trait VerifierChip: Send + Sync {
    fn verify(
        &self,
        cs: ConstraintSystemRef<Fr>,
        common: &CommonCircuitData,
        proof: &ProofWithPublicInputsVar,
        verifier_data: &VerifierOnlyCircuitDataVar,
    ) -> Result<(), SynthesisError>;
}

/// Enforces the shape `CommonCircuitData` prescribes (cap sizes and public
/// input count). It does not re-execute FRI; a full recursive verifier plugs
/// in through the same trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralVerifierChip;

impl VerifierChip for StructuralVerifierChip {
    fn verify(
        &self,
        _cs: ConstraintSystemRef<Fr>,
        common: &CommonCircuitData,
        proof: &ProofWithPublicInputsVar,
        verifier_data: &VerifierOnlyCircuitDataVar,
    ) -> Result<(), SynthesisError> {
        let cap_len = common.cap_len();
        let caps = [
            &proof.wires_cap,
            &proof.plonk_zs_partial_products_cap,
            &proof.quotient_polys_cap,
            &verifier_data.constants_sigmas_cap,
        ];
        if caps.iter().any(|cap| cap.len() != cap_len) {
            return Err(SynthesisError::Unsatisfiable);
        }
        if proof.public_inputs.len() != common.num_public_inputs {
            return Err(SynthesisError::Unsatisfiable);
        }
        Ok(())
    }
}

/// Native values of the wrapped proof, parsed into the scalar field.
#[derive(Clone, Debug)]
pub struct ProofAssignment {
    pub wires_cap: Vec<Fr>,
    pub plonk_zs_partial_products_cap: Vec<Fr>,
    pub quotient_polys_cap: Vec<Fr>,
    pub public_inputs: Vec<u8>,
}

impl TryFrom<&ProofWithPublicInputs> for ProofAssignment {
    type Error = ProverError;

    fn try_from(value: &ProofWithPublicInputs) -> Result<Self, Self::Error> {
        let public_inputs = value
            .public_inputs
            .iter()
            .enumerate()
            .map(|(index, limb)| {
                u8::try_from(*limb).map_err(|_| ProverError::LimbOutOfRange {
                    index,
                    value: *limb,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            wires_cap: parse_field_elements(&value.proof.wires_cap)?,
            plonk_zs_partial_products_cap: parse_field_elements(
                &value.proof.plonk_zs_partial_products_cap,
            )?,
            quotient_polys_cap: parse_field_elements(&value.proof.quotient_polys_cap)?,
            public_inputs,
        })
    }
}

#[derive(Clone, Debug)]
pub struct VerifierDataAssignment {
    pub constants_sigmas_cap: Vec<Fr>,
    pub circuit_digest: Fr,
}

impl TryFrom<&VerifierOnlyCircuitData> for VerifierDataAssignment {
    type Error = ProverError;

    fn try_from(value: &VerifierOnlyCircuitData) -> Result<Self, Self::Error> {
        Ok(Self {
            constants_sigmas_cap: parse_field_elements(&value.constants_sigmas_cap)?,
            circuit_digest: value.circuit_digest()?,
        })
    }
}

pub struct ProofWithPublicInputsVar {
    pub wires_cap: Vec<FpVar<Fr>>,
    pub plonk_zs_partial_products_cap: Vec<FpVar<Fr>>,
    pub quotient_polys_cap: Vec<FpVar<Fr>>,
    pub public_inputs: Vec<UInt8<Fr>>,
}

impl ProofWithPublicInputsVar {
    fn new_witness(
        cs: ConstraintSystemRef<Fr>,
        value: &ProofAssignment,
    ) -> Result<Self, SynthesisError> {
        Ok(Self {
            wires_cap: Vec::new_witness(ns!(cs, "wires_cap"), || {
                Ok(value.wires_cap.as_slice())
            })?,
            plonk_zs_partial_products_cap: Vec::new_witness(
                ns!(cs, "plonk_zs_partial_products_cap"),
                || Ok(value.plonk_zs_partial_products_cap.as_slice()),
            )?,
            quotient_polys_cap: Vec::new_witness(ns!(cs, "quotient_polys_cap"), || {
                Ok(value.quotient_polys_cap.as_slice())
            })?,
            public_inputs: UInt8::new_witness_vec(
                ns!(cs, "public_inputs"),
                &value.public_inputs,
            )?,
        })
    }
}

pub struct VerifierOnlyCircuitDataVar {
    pub constants_sigmas_cap: Vec<FpVar<Fr>>,
    pub circuit_digest: FpVar<Fr>,
}

impl VerifierOnlyCircuitDataVar {
    fn new_witness(
        cs: ConstraintSystemRef<Fr>,
        value: &VerifierDataAssignment,
    ) -> Result<Self, SynthesisError> {
        Ok(Self {
            constants_sigmas_cap: Vec::new_witness(ns!(cs, "constants_sigmas_cap"), || {
                Ok(value.constants_sigmas_cap.as_slice())
            })?,
            circuit_digest: FpVar::new_witness(ns!(cs, "circuit_digest"), || {
                Ok(value.circuit_digest)
            })?,
        })
    }
}

/// The wrapper circuit: verifies the inner proof and binds it to two public
/// values, the inner circuit digest and the public input commitment.
///
/// Public inputs are allocated in a fixed order: verifier digest first, then
/// the public input hash.
#[derive(Clone)]
pub struct WrapperCircuit {
    common: Arc<CommonCircuitData>,
    chip: Arc<dyn VerifierChip>,
    verifier_digest: Option<Fr>,
    public_input_hash: Option<Fr>,
    proof: ProofAssignment,
    verifier_data: VerifierDataAssignment,
}

impl WrapperCircuit {
    /// Circuit used for compilation and setup. Only the shape of the
    /// reference proof matters; public values stay unassigned.
    pub fn for_setup(
        common: Arc<CommonCircuitData>,
        chip: Arc<dyn VerifierChip>,
        proof: &ProofWithPublicInputs,
        verifier_data: &VerifierOnlyCircuitData,
    ) -> Result<Self, ProverError> {
        check_public_input_count(proof)?;
        proof.check_shape(&common)?;
        verifier_data.check_shape(&common)?;
        Ok(Self {
            proof: ProofAssignment::try_from(proof)?,
            verifier_data: VerifierDataAssignment::try_from(verifier_data)?,
            common,
            chip,
            verifier_digest: None,
            public_input_hash: None,
        })
    }

    /// Fully assigned circuit for one proof request. The public values are
    /// derived the same way a verifier would: digest from the verifier data,
    /// hash from the declared public inputs.
    pub fn for_request(
        common: Arc<CommonCircuitData>,
        chip: Arc<dyn VerifierChip>,
        proof: &ProofWithPublicInputs,
        verifier_data: &VerifierOnlyCircuitData,
    ) -> Result<Self, ProverError> {
        let public_input_hash = binder::public_input_hash_field(&proof.public_inputs)?;
        let mut circuit = Self::for_setup(common, chip, proof, verifier_data)?;
        circuit.verifier_digest = Some(circuit.verifier_data.circuit_digest);
        circuit.public_input_hash = Some(public_input_hash);
        Ok(circuit)
    }

    pub fn with_public_values(mut self, verifier_digest: Fr, public_input_hash: Fr) -> Self {
        self.verifier_digest = Some(verifier_digest);
        self.public_input_hash = Some(public_input_hash);
        self
    }

    pub fn public_values(&self) -> Option<[Fr; 2]> {
        Some([self.verifier_digest?, self.public_input_hash?])
    }
}

impl ConstraintSynthesizer<Fr> for WrapperCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let verifier_digest = FpVar::new_input(ns!(cs, "verifier_digest"), || {
            self.verifier_digest.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let public_input_hash = FpVar::new_input(ns!(cs, "public_input_hash"), || {
            self.public_input_hash
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let proof = ProofWithPublicInputsVar::new_witness(cs.clone(), &self.proof)?;
        let verifier_data =
            VerifierOnlyCircuitDataVar::new_witness(cs.clone(), &self.verifier_data)?;

        self.chip
            .verify(cs.clone(), &self.common, &proof, &verifier_data)?;

        if proof.public_inputs.len() != PUBLIC_INPUT_LIMBS {
            return Err(SynthesisError::Unsatisfiable);
        }
        binder::enforce_public_input_hash(&proof.public_inputs, &public_input_hash)?;

        verifier_digest.enforce_equal(&verifier_data.circuit_digest)?;

        Ok(())
    }
}

fn check_public_input_count(proof: &ProofWithPublicInputs) -> Result<(), ProverError> {
    if proof.public_inputs.len() != PUBLIC_INPUT_LIMBS {
        return Err(ProverError::PublicInputCount {
            expected: PUBLIC_INPUT_LIMBS,
            actual: proof.public_inputs.len(),
        });
    }
    Ok(())
}

/// Everything compilation reads from a circuit directory.
#[derive(Debug, Clone)]
pub struct CircuitDescription {
    pub common: CommonCircuitData,
    pub verifier_data: VerifierOnlyCircuitData,
    pub proof: ProofWithPublicInputs,
}

/// Load the three plonky2 JSON documents from `dir`.
///
/// Expected directory structure:
/// ```text
/// circuit_dir/
///   common_circuit_data.json
///   verifier_only_circuit_data.json
///   proof_with_public_inputs.json
/// ```
pub fn load_circuit_description(dir: &Path) -> Result<CircuitDescription, ProverError> {
    tracing::info!("Loading circuit description from {}", dir.display());
    let (verifier_data, proof) = load_proof_inputs(dir)?;
    let common = read_json(&dir.join(COMMON_CIRCUIT_DATA_FILE))?;
    Ok(CircuitDescription {
        common,
        verifier_data,
        proof,
    })
}

/// Load the per-request pair (verifier data, proof) from `dir`.
pub fn load_proof_inputs(
    dir: &Path,
) -> Result<(VerifierOnlyCircuitData, ProofWithPublicInputs), ProverError> {
    let verifier_data = read_json(&dir.join(VERIFIER_ONLY_CIRCUIT_DATA_FILE))?;
    let proof = read_json(&dir.join(PROOF_WITH_PUBLIC_INPUTS_FILE))?;
    Ok((verifier_data, proof))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use ark_ff::One;
    use ark_relations::r1cs::{ConstraintSystem, SynthesisMode};

    fn request_circuit() -> WrapperCircuit {
        WrapperCircuit::for_request(
            Arc::new(fixtures::common_circuit_data()),
            Arc::new(StructuralVerifierChip),
            &fixtures::proof_with_public_inputs(),
            &fixtures::verifier_only_circuit_data(),
        )
        .unwrap()
    }

    fn is_satisfied(circuit: WrapperCircuit) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn test_valid_request_satisfies_circuit() {
        assert!(is_satisfied(request_circuit()));
    }

    #[test]
    fn test_public_values_order() {
        let circuit = request_circuit();
        let [digest, hash] = circuit.public_values().unwrap();
        assert_eq!(
            digest,
            fixtures::verifier_only_circuit_data()
                .circuit_digest()
                .unwrap()
        );
        assert_eq!(
            hash,
            binder::public_input_hash_field(&fixtures::public_inputs()).unwrap()
        );
    }

    #[test]
    fn test_wrong_public_input_hash_is_unsatisfied() {
        let circuit = request_circuit();
        let [digest, hash] = circuit.public_values().unwrap();
        let circuit = circuit.with_public_values(digest, hash + Fr::one());
        assert!(!is_satisfied(circuit));
    }

    #[test]
    fn test_wrong_verifier_digest_is_unsatisfied() {
        let circuit = request_circuit();
        let [digest, hash] = circuit.public_values().unwrap();
        let circuit = circuit.with_public_values(digest + Fr::one(), hash);
        assert!(!is_satisfied(circuit));
    }

    #[test]
    fn test_setup_circuit_has_two_public_inputs() {
        let circuit = WrapperCircuit::for_setup(
            Arc::new(fixtures::common_circuit_data()),
            Arc::new(StructuralVerifierChip),
            &fixtures::proof_with_public_inputs(),
            &fixtures::verifier_only_circuit_data(),
        )
        .unwrap();
        assert!(circuit.public_values().is_none());

        let cs = ConstraintSystem::<Fr>::new_ref();
        cs.set_mode(SynthesisMode::Setup);
        circuit.generate_constraints(cs.clone()).unwrap();
        // The constant one plus the two declared public values.
        assert_eq!(cs.num_instance_variables(), 3);
        assert!(cs.num_constraints() > 256);
    }

    #[test]
    fn test_31_public_inputs_is_structural_error() {
        let mut proof = fixtures::proof_with_public_inputs();
        proof.public_inputs.pop();
        let result = WrapperCircuit::for_request(
            Arc::new(fixtures::common_circuit_data()),
            Arc::new(StructuralVerifierChip),
            &proof,
            &fixtures::verifier_only_circuit_data(),
        );
        match result {
            Err(ProverError::PublicInputCount { expected, actual }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 31);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected a structural error"),
        }
    }

    #[test]
    fn test_malformed_cap_element_is_witness_error() {
        let mut proof = fixtures::proof_with_public_inputs();
        proof.proof.wires_cap[0] = "0xzz".to_string();
        let result = WrapperCircuit::for_request(
            Arc::new(fixtures::common_circuit_data()),
            Arc::new(StructuralVerifierChip),
            &proof,
            &fixtures::verifier_only_circuit_data(),
        );
        assert!(matches!(result, Err(ProverError::Witness(_))));
    }

    struct RejectingChip;

    impl VerifierChip for RejectingChip {
        fn verify(
            &self,
            _cs: ConstraintSystemRef<Fr>,
            _common: &CommonCircuitData,
            _proof: &ProofWithPublicInputsVar,
            _verifier_data: &VerifierOnlyCircuitDataVar,
        ) -> Result<(), SynthesisError> {
            Err(SynthesisError::Unsatisfiable)
        }
    }

    #[test]
    fn test_chip_failure_aborts_synthesis() {
        let circuit = WrapperCircuit::for_request(
            Arc::new(fixtures::common_circuit_data()),
            Arc::new(RejectingChip),
            &fixtures::proof_with_public_inputs(),
            &fixtures::verifier_only_circuit_data(),
        )
        .unwrap();
        let cs = ConstraintSystem::<Fr>::new_ref();
        assert!(circuit.generate_constraints(cs).is_err());
    }

    #[test]
    fn test_load_circuit_description() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_circuit_dir(dir.path());
        let description = load_circuit_description(dir.path()).unwrap();
        assert_eq!(description.common.num_public_inputs, 32);
        assert_eq!(description.proof.public_inputs, fixtures::public_inputs());
        assert_eq!(
            description.verifier_data.circuit_digest,
            fixtures::CIRCUIT_DIGEST
        );
    }

    #[test]
    fn test_load_circuit_description_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_circuit_description(dir.path()).unwrap_err();
        assert!(err.to_string().contains(VERIFIER_ONLY_CIRCUIT_DATA_FILE));
    }
}
