//! Compiled artifact triple and its lifecycle.
//!
//! ```text
//! Uncompiled --compile--> Compiled --persist--> Persisted
//! Uncompiled --load-----> Loaded
//! ```
//!
//! Data directory layout:
//! ```text
//! data_dir/
//!   r1cs.bin                   constraint matrices
//!   pk.bin                     proving key
//!   vk.bin                     verifying key
//!   common_circuit_data.json   circuit shape, needed to rebuild witnesses
//!   manifest.json              SHA-256 of each file plus circuit identity
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ark_bn254::Bn254;
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::{self, R1csShape};
use crate::circuit::{load_circuit_description, VerifierChip, WrapperCircuit};
use crate::error::ProverError;
use crate::plonky2::{read_json, CommonCircuitData, COMMON_CIRCUIT_DATA_FILE};
use crate::srs::SrsConfig;

pub const R1CS_FILE: &str = "r1cs.bin";
pub const PROVING_KEY_FILE: &str = "pk.bin";
pub const VERIFYING_KEY_FILE: &str = "vk.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub circuit_identity: String,
    /// File name to hex SHA-256.
    pub files: BTreeMap<String, String>,
}

/// The matched triple plus the circuit shape it was compiled for.
///
/// Only constructed by [`Artifacts::compile`] or [`Artifacts::load`], and
/// shared read-only afterwards.
pub struct Artifacts {
    common: Arc<CommonCircuitData>,
    constraint_system: R1csShape,
    proving_key: ProvingKey<Bn254>,
    verifying_key: VerifyingKey<Bn254>,
    identity: String,
}

impl std::fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifacts")
            .field("identity", &self.identity)
            .field("constraints", &self.constraint_system.num_constraints())
            .finish()
    }
}

impl Artifacts {
    /// Build the circuit from the JSON documents in `circuit_dir`, compile
    /// it and run setup.
    pub fn compile(
        circuit_dir: &Path,
        chip: Arc<dyn VerifierChip>,
        srs: &SrsConfig,
    ) -> Result<Self, ProverError> {
        let description = load_circuit_description(circuit_dir)?;
        let common = Arc::new(description.common);
        let circuit = WrapperCircuit::for_setup(
            common.clone(),
            chip,
            &description.proof,
            &description.verifier_data,
        )?;

        let constraint_system = backend::compile(circuit.clone())?;
        let srs = srs.fetch_or_download(circuit_dir, constraint_system.domain_log_size())?;
        let (proving_key, verifying_key) = backend::setup(&constraint_system, circuit, &srs)?;
        let identity = circuit_identity(&serialize(&constraint_system)?);

        tracing::info!("Circuit identity: {}", identity);
        Ok(Self {
            common,
            constraint_system,
            proving_key,
            verifying_key,
            identity,
        })
    }

    /// Write every artifact file, then the manifest. A failed write fails
    /// the whole operation; files already written are left in place.
    pub fn persist(&self, data_dir: &Path) -> Result<(), ProverError> {
        let start = Instant::now();
        std::fs::create_dir_all(data_dir).map_err(|e| ProverError::io(data_dir, e))?;

        let r1cs = serialize(&self.constraint_system)?;
        let pk = serialize(&self.proving_key)?;
        let vk = serialize(&self.verifying_key)?;
        let common = serde_json::to_vec_pretty(self.common.as_ref())
            .map_err(|e| ProverError::json(data_dir.join(COMMON_CIRCUIT_DATA_FILE), e))?;

        let mut files = BTreeMap::new();
        for (name, bytes) in [
            (R1CS_FILE, &r1cs),
            (PROVING_KEY_FILE, &pk),
            (VERIFYING_KEY_FILE, &vk),
            (COMMON_CIRCUIT_DATA_FILE, &common),
        ] {
            write_file(&data_dir.join(name), bytes)?;
            files.insert(name.to_string(), sha256_hex(bytes));
        }

        let manifest = Manifest {
            circuit_identity: self.identity.clone(),
            files,
        };
        let manifest_path = data_dir.join(MANIFEST_FILE);
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ProverError::json(&manifest_path, e))?;
        write_file(&manifest_path, &manifest_bytes)?;

        tracing::info!(
            "Persisted artifacts to {} ({} bytes proving key), time: {:?}",
            data_dir.display(),
            pk.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Read the triple back, checking every file against the manifest.
    pub fn load(data_dir: &Path) -> Result<Self, ProverError> {
        let start = Instant::now();
        let manifest: Manifest = read_json(&data_dir.join(MANIFEST_FILE))?;

        let r1cs = read_checked(data_dir, R1CS_FILE, &manifest)?;
        let identity = circuit_identity(&r1cs);
        if identity != manifest.circuit_identity {
            return Err(ProverError::ArtifactMismatch(format!(
                "constraint system identity {} does not match manifest {}",
                identity, manifest.circuit_identity
            )));
        }
        let constraint_system = R1csShape::deserialize_uncompressed_unchecked(r1cs.as_slice())?;
        tracing::info!("Loaded {} ({} bytes)", R1CS_FILE, r1cs.len());

        let pk = read_checked(data_dir, PROVING_KEY_FILE, &manifest)?;
        let proving_key = ProvingKey::<Bn254>::deserialize_uncompressed_unchecked(pk.as_slice())?;
        tracing::info!("Loaded {} ({} bytes)", PROVING_KEY_FILE, pk.len());

        let vk = read_checked(data_dir, VERIFYING_KEY_FILE, &manifest)?;
        let verifying_key = VerifyingKey::<Bn254>::deserialize_uncompressed(vk.as_slice())?;
        tracing::info!("Loaded {} ({} bytes)", VERIFYING_KEY_FILE, vk.len());

        let common_bytes = read_checked(data_dir, COMMON_CIRCUIT_DATA_FILE, &manifest)?;
        let common: CommonCircuitData = serde_json::from_slice(&common_bytes)
            .map_err(|e| ProverError::json(data_dir.join(COMMON_CIRCUIT_DATA_FILE), e))?;

        if verifying_key.gamma_abc_g1.len() != constraint_system.num_instance_variables() {
            return Err(ProverError::ArtifactMismatch(format!(
                "verifying key expects {} inputs, constraint system has {}",
                verifying_key.gamma_abc_g1.len(),
                constraint_system.num_instance_variables()
            )));
        }
        if proving_key.vk != verifying_key {
            return Err(ProverError::ArtifactMismatch(
                "proving key and verifying key come from different setups".to_string(),
            ));
        }

        tracing::info!(
            "Loaded artifacts from {}, time: {:?}",
            data_dir.display(),
            start.elapsed()
        );
        Ok(Self {
            common: Arc::new(common),
            constraint_system,
            proving_key,
            verifying_key,
            identity,
        })
    }

    pub fn common(&self) -> &Arc<CommonCircuitData> {
        &self.common
    }

    pub fn constraint_system(&self) -> &R1csShape {
        &self.constraint_system
    }

    pub fn proving_key(&self) -> &ProvingKey<Bn254> {
        &self.proving_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.verifying_key
    }

    /// Hex SHA-256 of the serialized constraint system.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

fn serialize<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>, ProverError> {
    let mut bytes = Vec::with_capacity(value.uncompressed_size());
    value.serialize_uncompressed(&mut bytes)?;
    Ok(bytes)
}

fn circuit_identity(r1cs: &[u8]) -> String {
    sha256_hex(r1cs)
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ProverError> {
    std::fs::write(path, bytes).map_err(|e| ProverError::io(path, e))
}

fn read_checked(dir: &Path, name: &str, manifest: &Manifest) -> Result<Vec<u8>, ProverError> {
    let path = dir.join(name);
    let bytes = std::fs::read(&path).map_err(|e| ProverError::io(&path, e))?;
    let expected = manifest.files.get(name).ok_or_else(|| {
        ProverError::ArtifactMismatch(format!("{} is not listed in {}", name, MANIFEST_FILE))
    })?;
    let actual = sha256_hex(&bytes);
    if &actual != expected {
        return Err(ProverError::ArtifactMismatch(format!(
            "{} has digest {}, manifest records {}",
            name, actual, expected
        )));
    }
    Ok(bytes)
}

#[derive(Debug, Clone)]
pub enum ArtifactState {
    Uncompiled,
    Compiled(Arc<Artifacts>),
    Persisted(Arc<Artifacts>),
    Loaded(Arc<Artifacts>),
}

impl ArtifactState {
    pub fn artifacts(&self) -> Option<&Arc<Artifacts>> {
        match self {
            Self::Uncompiled => None,
            Self::Compiled(a) | Self::Persisted(a) | Self::Loaded(a) => Some(a),
        }
    }
}

/// Drives the artifact lifecycle for one circuit directory / data directory
/// pair.
pub struct ArtifactManager {
    circuit_dir: PathBuf,
    data_dir: PathBuf,
    srs: SrsConfig,
    chip: Arc<dyn VerifierChip>,
    state: ArtifactState,
}

impl ArtifactManager {
    pub fn new(
        circuit_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        srs: SrsConfig,
        chip: Arc<dyn VerifierChip>,
    ) -> Self {
        Self {
            circuit_dir: circuit_dir.into(),
            data_dir: data_dir.into(),
            srs,
            chip,
            state: ArtifactState::Uncompiled,
        }
    }

    pub fn state(&self) -> &ArtifactState {
        &self.state
    }

    pub fn chip(&self) -> Arc<dyn VerifierChip> {
        self.chip.clone()
    }

    pub fn circuit_dir(&self) -> &Path {
        &self.circuit_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn compile(&mut self) -> Result<Arc<Artifacts>, ProverError> {
        tracing::info!("Compiling circuit from {}", self.circuit_dir.display());
        let artifacts = Arc::new(Artifacts::compile(
            &self.circuit_dir,
            self.chip.clone(),
            &self.srs,
        )?);
        self.state = ArtifactState::Compiled(artifacts.clone());
        Ok(artifacts)
    }

    pub fn persist(&mut self) -> Result<(), ProverError> {
        let artifacts = match &self.state {
            ArtifactState::Compiled(a) | ArtifactState::Persisted(a) => a.clone(),
            ArtifactState::Uncompiled | ArtifactState::Loaded(_) => {
                return Err(ProverError::InvalidState("persist requires compiled artifacts"))
            }
        };
        artifacts.persist(&self.data_dir)?;
        self.state = ArtifactState::Persisted(artifacts);
        Ok(())
    }

    pub fn load(&mut self) -> Result<Arc<Artifacts>, ProverError> {
        tracing::info!("Loading artifacts from {}", self.data_dir.display());
        let artifacts = Arc::new(Artifacts::load(&self.data_dir)?);
        self.state = ArtifactState::Loaded(artifacts.clone());
        Ok(artifacts)
    }

    /// The artifacts if any stage has produced them.
    pub fn ready(&self) -> Option<Arc<Artifacts>> {
        self.state.artifacts().cloned()
    }
}
