use std::path::Path;
use std::sync::Arc;

use crate::artifacts::Artifacts;
use crate::backend::{self, PublicWitness, WrappedProof};
use crate::circuit::{load_proof_inputs, VerifierChip, WrapperCircuit};
use crate::error::ProverError;
use crate::plonky2::{ProofWithPublicInputs, VerifierOnlyCircuitData};
use crate::queue::ProofQueue;

pub const PROOF_FILE: &str = "solidity_bytes.bin";
pub const PUBLIC_WITNESS_FILE: &str = "public_witness.bin";

/// One proof request: the wrapped proof and the verifier data it claims to
/// verify against.
#[derive(Debug, Clone)]
pub struct ProofRequest {
    pub verifier_data: VerifierOnlyCircuitData,
    pub proof: ProofWithPublicInputs,
}

impl ProofRequest {
    /// Read the verifier data and proof JSON from a circuit directory.
    pub fn from_dir(dir: &Path) -> Result<Self, ProverError> {
        let (verifier_data, proof) = load_proof_inputs(dir)?;
        Ok(Self {
            verifier_data,
            proof,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProofOutput {
    pub proof: WrappedProof,
    pub public_witness: PublicWitness,
}

impl ProofOutput {
    /// Write `solidity_bytes.bin` and `public_witness.bin` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<(), ProverError> {
        for (name, bytes) in [
            (PROOF_FILE, self.proof.encode()),
            (PUBLIC_WITNESS_FILE, self.public_witness.encode()),
        ] {
            let path = dir.join(name);
            std::fs::write(&path, bytes).map_err(|e| ProverError::io(&path, e))?;
        }
        Ok(())
    }

    pub fn proof_hex(&self) -> String {
        format!("0x{}", hex::encode(self.proof.encode()))
    }
}

/// Synchronous prove/verify against one set of artifacts.
pub struct ProvingPipeline {
    artifacts: Arc<Artifacts>,
    chip: Arc<dyn VerifierChip>,
}

impl ProvingPipeline {
    pub fn new(artifacts: Arc<Artifacts>, chip: Arc<dyn VerifierChip>) -> Self {
        Self { artifacts, chip }
    }

    pub fn artifacts(&self) -> &Arc<Artifacts> {
        &self.artifacts
    }

    pub fn prove(&self, request: &ProofRequest) -> Result<ProofOutput, ProverError> {
        tracing::info!(
            "Generating proof for circuit_digest={}",
            request.verifier_data.circuit_digest
        );

        // Binder and shape checks run before anything touches the backend.
        let circuit = WrapperCircuit::for_request(
            self.artifacts.common().clone(),
            self.chip.clone(),
            &request.proof,
            &request.verifier_data,
        )?;

        let shape = self.artifacts.constraint_system();
        let witness = backend::generate_witness(shape, circuit)?;
        let proof = backend::prove(shape, self.artifacts.proving_key(), &witness)?;

        Ok(ProofOutput {
            proof,
            public_witness: witness.public(),
        })
    }

    pub fn verify(
        &self,
        proof: &WrappedProof,
        public_witness: &PublicWitness,
    ) -> Result<(), ProverError> {
        backend::verify(proof, self.artifacts.verifying_key(), public_witness)?;
        tracing::info!("Proof verified");
        Ok(())
    }
}

/// Async front of the pipeline. Every proof goes through the FIFO queue so
/// at most one runs at a time.
#[derive(Clone)]
pub struct Prover {
    pipeline: Arc<ProvingPipeline>,
    queue: ProofQueue,
}

impl Prover {
    pub fn new(pipeline: ProvingPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            queue: ProofQueue::new(),
        }
    }

    pub fn pipeline(&self) -> &ProvingPipeline {
        &self.pipeline
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub async fn prove(&self, request: ProofRequest) -> Result<ProofOutput, ProverError> {
        let pipeline = self.pipeline.clone();
        self.queue
            .submit(move || pipeline.prove(&request))
            .await
            .map_err(|e| ProverError::Internal(format!("proof task failed: {}", e)))?
            .map_err(|e| ProverError::Internal(format!("proof job panicked: {}", e)))?
    }
}
