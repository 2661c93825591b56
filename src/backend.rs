//! Groth16 over BN254.
//!
//! The compiled constraint system is kept as explicit R1CS matrices so that
//! proving runs against exactly the matrices produced at compile time (and
//! persisted to `r1cs.bin`), never against a fresh re-synthesis.
//!
//! Setup randomness is derived from the SRS file's digest. That makes setup
//! reproducible for a given transcript, but whoever holds the transcript can
//! recompute the toxic waste: production keys must come from an external
//! ceremony.

use std::io::{Read, Write};
use std::time::Instant;

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::{BigInteger, PrimeField, UniformRand, Zero};
use ark_groth16::{prepare_verifying_key, Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{
    ConstraintMatrices, ConstraintSynthesizer, ConstraintSystem, OptimizationGoal, SynthesisMode,
};
use ark_serialize::{
    CanonicalDeserialize, CanonicalSerialize, Compress, SerializationError, Valid, Validate,
};
use rand::rngs::{OsRng, StdRng};
use rand::SeedableRng;

use crate::circuit::WrapperCircuit;
use crate::error::ProverError;
use crate::srs::Srs;

const WORD: usize = 32;

/// Compiled constraint system: the R1CS matrices of the wrapper circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct R1csShape {
    matrices: ConstraintMatrices<Fr>,
}

impl R1csShape {
    fn new(mut matrices: ConstraintMatrices<Fr>) -> Self {
        matrices.a_num_non_zero = non_zero(&matrices.a);
        matrices.b_num_non_zero = non_zero(&matrices.b);
        matrices.c_num_non_zero = non_zero(&matrices.c);
        Self { matrices }
    }

    pub fn num_instance_variables(&self) -> usize {
        self.matrices.num_instance_variables
    }

    pub fn num_witness_variables(&self) -> usize {
        self.matrices.num_witness_variables
    }

    pub fn num_constraints(&self) -> usize {
        self.matrices.num_constraints
    }

    /// log2 of the evaluation domain the QAP reduction needs.
    pub fn domain_log_size(&self) -> u32 {
        let size = (self.num_constraints() + self.num_instance_variables()).max(2);
        size.next_power_of_two().trailing_zeros()
    }

    /// Index of the first constraint `full_assignment` violates, if any.
    pub fn first_unsatisfied(&self, full_assignment: &[Fr]) -> Option<usize> {
        let eval = |row: &[(Fr, usize)]| -> Fr {
            row.iter()
                .map(|(coeff, index)| *coeff * full_assignment[*index])
                .sum()
        };
        (0..self.num_constraints()).find(|&i| {
            eval(&self.matrices.a[i]) * eval(&self.matrices.b[i]) != eval(&self.matrices.c[i])
        })
    }
}

fn non_zero(matrix: &[Vec<(Fr, usize)>]) -> usize {
    matrix.iter().map(Vec::len).sum()
}

fn serialize_matrix<W: Write>(
    matrix: &[Vec<(Fr, usize)>],
    mut writer: W,
    compress: Compress,
) -> Result<(), SerializationError> {
    (matrix.len() as u64).serialize_with_mode(&mut writer, compress)?;
    for row in matrix {
        (row.len() as u64).serialize_with_mode(&mut writer, compress)?;
        for (coeff, index) in row {
            coeff.serialize_with_mode(&mut writer, compress)?;
            (*index as u64).serialize_with_mode(&mut writer, compress)?;
        }
    }
    Ok(())
}

fn matrix_size(matrix: &[Vec<(Fr, usize)>], compress: Compress) -> usize {
    let entry = Fr::zero().serialized_size(compress) + 8;
    8 + matrix.iter().map(|row| 8 + row.len() * entry).sum::<usize>()
}

fn deserialize_matrix<R: Read>(
    mut reader: R,
    compress: Compress,
    validate: Validate,
    num_variables: usize,
) -> Result<Vec<Vec<(Fr, usize)>>, SerializationError> {
    let rows = u64::deserialize_with_mode(&mut reader, compress, validate)?;
    let mut matrix = Vec::new();
    for _ in 0..rows {
        let len = u64::deserialize_with_mode(&mut reader, compress, validate)?;
        let mut row = Vec::new();
        for _ in 0..len {
            let coeff = Fr::deserialize_with_mode(&mut reader, compress, validate)?;
            let index = u64::deserialize_with_mode(&mut reader, compress, validate)? as usize;
            if index >= num_variables {
                return Err(SerializationError::InvalidData);
            }
            row.push((coeff, index));
        }
        matrix.push(row);
    }
    Ok(matrix)
}

impl CanonicalSerialize for R1csShape {
    fn serialize_with_mode<W: Write>(
        &self,
        mut writer: W,
        compress: Compress,
    ) -> Result<(), SerializationError> {
        let m = &self.matrices;
        for count in [
            m.num_instance_variables,
            m.num_witness_variables,
            m.num_constraints,
        ] {
            (count as u64).serialize_with_mode(&mut writer, compress)?;
        }
        serialize_matrix(&m.a, &mut writer, compress)?;
        serialize_matrix(&m.b, &mut writer, compress)?;
        serialize_matrix(&m.c, &mut writer, compress)
    }

    fn serialized_size(&self, compress: Compress) -> usize {
        let m = &self.matrices;
        24 + matrix_size(&m.a, compress) + matrix_size(&m.b, compress) + matrix_size(&m.c, compress)
    }
}

impl Valid for R1csShape {
    fn check(&self) -> Result<(), SerializationError> {
        let m = &self.matrices;
        if [&m.a, &m.b, &m.c]
            .iter()
            .any(|matrix| matrix.len() != m.num_constraints)
        {
            return Err(SerializationError::InvalidData);
        }
        Ok(())
    }
}

impl CanonicalDeserialize for R1csShape {
    fn deserialize_with_mode<R: Read>(
        mut reader: R,
        compress: Compress,
        validate: Validate,
    ) -> Result<Self, SerializationError> {
        let num_instance_variables =
            u64::deserialize_with_mode(&mut reader, compress, validate)? as usize;
        let num_witness_variables =
            u64::deserialize_with_mode(&mut reader, compress, validate)? as usize;
        let num_constraints = u64::deserialize_with_mode(&mut reader, compress, validate)? as usize;
        let num_variables = num_instance_variables + num_witness_variables;

        let a = deserialize_matrix(&mut reader, compress, validate, num_variables)?;
        let b = deserialize_matrix(&mut reader, compress, validate, num_variables)?;
        let c = deserialize_matrix(&mut reader, compress, validate, num_variables)?;

        let shape = Self::new(ConstraintMatrices {
            num_instance_variables,
            num_witness_variables,
            num_constraints,
            a_num_non_zero: 0,
            b_num_non_zero: 0,
            c_num_non_zero: 0,
            a,
            b,
            c,
        });
        if validate == Validate::Yes {
            shape.check()?;
        }
        Ok(shape)
    }
}

/// Full variable assignment for one request.
#[derive(Debug, Clone)]
pub struct Witness {
    /// Instance assignment, starting with the constant one.
    pub instance: Vec<Fr>,
    pub witness: Vec<Fr>,
}

impl Witness {
    pub fn public(&self) -> PublicWitness {
        PublicWitness(self.instance[1..].to_vec())
    }

    fn full_assignment(&self) -> Vec<Fr> {
        let mut full = self.instance.clone();
        full.extend_from_slice(&self.witness);
        full
    }
}

/// The public values a verifier needs, in circuit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicWitness(pub Vec<Fr>);

impl PublicWitness {
    pub fn values(&self) -> &[Fr] {
        &self.0
    }

    /// 4-byte big-endian count followed by 32-byte big-endian elements.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.0.len() * WORD);
        out.extend_from_slice(&(self.0.len() as u32).to_be_bytes());
        for value in &self.0 {
            out.extend_from_slice(&fr_to_word(value));
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProverError> {
        if bytes.len() < 4 {
            return Err(ProverError::Serialization(
                "public witness is missing its length prefix".to_string(),
            ));
        }
        let (prefix, body) = bytes.split_at(4);
        let count = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if body.len() != count * WORD {
            return Err(ProverError::Serialization(format!(
                "public witness declares {} elements but carries {} bytes",
                count,
                body.len()
            )));
        }
        body.chunks(WORD)
            .map(word_to_fr)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// An opaque Groth16 proof exposing the one encoding external verifiers use.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedProof(Proof<Bn254>);

impl WrappedProof {
    /// Solidity calldata layout: `a.x, a.y, b.x.c1, b.x.c0, b.y.c1, b.y.c0,
    /// c.x, c.y`, each a 32-byte big-endian word.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * WORD);
        let (ax, ay) = g1_coordinates(&self.0.a);
        let (bx, by) = g2_coordinates(&self.0.b);
        let (cx, cy) = g1_coordinates(&self.0.c);
        for coordinate in [ax, ay, bx.c1, bx.c0, by.c1, by.c0, cx, cy] {
            out.extend_from_slice(&fq_to_word(&coordinate));
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProverError> {
        if bytes.len() != 8 * WORD {
            return Err(ProverError::Serialization(format!(
                "encoded proof must be {} bytes, got {}",
                8 * WORD,
                bytes.len()
            )));
        }
        let words = bytes
            .chunks(WORD)
            .map(word_to_fq)
            .collect::<Result<Vec<_>, _>>()?;
        let a = g1_from_coordinates(words[0], words[1])?;
        let b = g2_from_coordinates(
            Fq2::new(words[3], words[2]),
            Fq2::new(words[5], words[4]),
        )?;
        let c = g1_from_coordinates(words[6], words[7])?;
        Ok(Self(Proof { a, b, c }))
    }
}

pub fn fr_to_word(value: &Fr) -> Vec<u8> {
    value.into_bigint().to_bytes_be()
}

fn fq_to_word(value: &Fq) -> Vec<u8> {
    value.into_bigint().to_bytes_be()
}

fn word_to_fr(word: &[u8]) -> Result<Fr, ProverError> {
    let value = Fr::from_be_bytes_mod_order(word);
    if fr_to_word(&value) != word {
        return Err(ProverError::Serialization(
            "scalar is not canonically encoded".to_string(),
        ));
    }
    Ok(value)
}

fn word_to_fq(word: &[u8]) -> Result<Fq, ProverError> {
    let value = Fq::from_be_bytes_mod_order(word);
    if fq_to_word(&value) != word {
        return Err(ProverError::Serialization(
            "base field element is not canonically encoded".to_string(),
        ));
    }
    Ok(value)
}

fn g1_coordinates(point: &G1Affine) -> (Fq, Fq) {
    point.xy().map(|(x, y)| (*x, *y)).unwrap_or_default()
}

fn g2_coordinates(point: &G2Affine) -> (Fq2, Fq2) {
    point.xy().map(|(x, y)| (*x, *y)).unwrap_or_default()
}

fn g1_from_coordinates(x: Fq, y: Fq) -> Result<G1Affine, ProverError> {
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::zero());
    }
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProverError::Serialization(
            "G1 point is not on the curve".to_string(),
        ));
    }
    Ok(point)
}

fn g2_from_coordinates(x: Fq2, y: Fq2) -> Result<G2Affine, ProverError> {
    if x.is_zero() && y.is_zero() {
        return Ok(G2Affine::zero());
    }
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProverError::Serialization(
            "G2 point is not in the prime order subgroup".to_string(),
        ));
    }
    Ok(point)
}

/// Synthesize the circuit in setup mode and extract its R1CS matrices.
pub fn compile(circuit: WrapperCircuit) -> Result<R1csShape, ProverError> {
    let start = Instant::now();
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_optimization_goal(OptimizationGoal::Constraints);
    cs.set_mode(SynthesisMode::Setup);
    circuit
        .generate_constraints(cs.clone())
        .map_err(|e| ProverError::Compile(e.to_string()))?;
    cs.finalize();
    let matrices = cs
        .to_matrices()
        .ok_or_else(|| ProverError::Compile("constraint matrices were not built".to_string()))?;

    tracing::info!(
        "Compiled circuit: constraints={} public={} private={} time={:?}",
        matrices.num_constraints,
        matrices.num_instance_variables - 1,
        matrices.num_witness_variables,
        start.elapsed()
    );
    Ok(R1csShape::new(matrices))
}

/// Circuit-specific Groth16 setup, seeded from the SRS.
pub fn setup(
    shape: &R1csShape,
    circuit: WrapperCircuit,
    srs: &Srs,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ProverError> {
    let start = Instant::now();
    let mut rng = StdRng::from_seed(srs.digest());
    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, &mut rng)
        .map_err(|e| ProverError::Setup(e.to_string()))?;

    if pk.vk.gamma_abc_g1.len() != shape.num_instance_variables() {
        return Err(ProverError::Setup(
            "keys do not match the compiled constraint system".to_string(),
        ));
    }

    tracing::info!("Successfully ran circuit setup, time: {:?}", start.elapsed());
    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Synthesize the assigned circuit and collect the variable assignment.
pub fn generate_witness(shape: &R1csShape, circuit: WrapperCircuit) -> Result<Witness, ProverError> {
    let start = Instant::now();
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_optimization_goal(OptimizationGoal::Constraints);
    cs.set_mode(SynthesisMode::Prove {
        construct_matrices: false,
    });
    circuit
        .generate_constraints(cs.clone())
        .map_err(|e| ProverError::Witness(e.to_string()))?;
    cs.finalize();

    let witness = {
        let cs = cs
            .borrow()
            .ok_or_else(|| ProverError::Witness("constraint system was dropped".to_string()))?;
        Witness {
            instance: cs.instance_assignment.clone(),
            witness: cs.witness_assignment.clone(),
        }
    };

    if witness.instance.len() != shape.num_instance_variables()
        || witness.witness.len() != shape.num_witness_variables()
    {
        return Err(ProverError::Witness(format!(
            "assignment has {}+{} variables, circuit expects {}+{}",
            witness.instance.len(),
            witness.witness.len(),
            shape.num_instance_variables(),
            shape.num_witness_variables()
        )));
    }

    tracing::debug!("Successfully generated witness, time: {:?}", start.elapsed());
    Ok(witness)
}

pub fn prove(
    shape: &R1csShape,
    pk: &ProvingKey<Bn254>,
    witness: &Witness,
) -> Result<WrappedProof, ProverError> {
    let full_assignment = witness.full_assignment();
    if let Some(index) = shape.first_unsatisfied(&full_assignment) {
        return Err(ProverError::Proving(format!(
            "constraint #{} is not satisfied",
            index
        )));
    }

    let start = Instant::now();
    let mut rng = OsRng;
    let r = Fr::rand(&mut rng);
    let s = Fr::rand(&mut rng);
    let proof = Groth16::<Bn254>::create_proof_with_reduction_and_matrices(
        pk,
        r,
        s,
        &shape.matrices,
        shape.num_instance_variables(),
        shape.num_constraints(),
        &full_assignment,
    )
    .map_err(|e| ProverError::Proving(e.to_string()))?;

    tracing::info!("Successfully created proof, time: {:?}", start.elapsed());
    Ok(WrappedProof(proof))
}

pub fn verify(
    proof: &WrappedProof,
    vk: &VerifyingKey<Bn254>,
    public_witness: &PublicWitness,
) -> Result<(), ProverError> {
    if public_witness.values().len() + 1 != vk.gamma_abc_g1.len() {
        return Err(ProverError::Verification(format!(
            "expected {} public values, got {}",
            vk.gamma_abc_g1.len() - 1,
            public_witness.values().len()
        )));
    }
    let pvk = prepare_verifying_key(vk);
    let valid = Groth16::<Bn254>::verify_proof(&pvk, &proof.0, public_witness.values())
        .map_err(|e| ProverError::Verification(e.to_string()))?;
    if !valid {
        return Err(ProverError::Verification(
            "pairing check failed".to_string(),
        ));
    }
    Ok(())
}
