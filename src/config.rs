use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::error::ProverError;
use crate::srs::{SrsConfig, DEFAULT_SRS_URL};

#[derive(Debug, Parser)]
#[command(name = "wrapper-prover")]
#[command(about = "Wraps plonky2 proofs in a BN254 Groth16 proof")]
pub struct Cli {
    /// Directory holding the plonky2 circuit description and proof
    #[arg(long, env = "CIRCUIT_DIR")]
    pub circuit: Option<PathBuf>,

    /// Directory for compiled artifacts and the exported contract
    #[arg(long, env = "DATA_DIR")]
    pub data: Option<PathBuf>,

    /// Compile the wrapper circuit and run setup
    #[arg(long)]
    pub compile: bool,

    /// Persist compiled artifacts to the data directory
    #[arg(long)]
    pub savepk: bool,

    /// Load artifacts from the data directory
    #[arg(long)]
    pub loadpk: bool,

    /// Prove the proof found in the circuit directory
    #[arg(long)]
    pub proof: bool,

    /// Export the Solidity verifier contract
    #[arg(long)]
    pub contract: bool,

    /// Serve proof requests over HTTP
    #[arg(long)]
    pub server: bool,

    #[arg(long, env = "PORT", default_value_t = 3333)]
    pub port: u16,

    /// SRS download URL; `{k}` is replaced by the log2 circuit size
    #[arg(long, env = "SRS_URL", default_value = DEFAULT_SRS_URL)]
    pub srs_url: String,

    /// SRS download timeout in seconds
    #[arg(long, env = "SRS_TIMEOUT_SECS", default_value_t = 600)]
    pub srs_timeout_secs: u64,
}

impl Cli {
    pub fn any_stage(&self) -> bool {
        self.compile || self.savepk || self.loadpk || self.proof || self.contract || self.server
    }

    pub fn circuit_dir(&self) -> Result<&Path, ProverError> {
        self.circuit
            .as_deref()
            .ok_or(ProverError::InvalidState("--circuit is required"))
    }

    pub fn data_dir(&self) -> Result<&Path, ProverError> {
        self.data
            .as_deref()
            .ok_or(ProverError::InvalidState("--data is required"))
    }

    /// Fail early when a requested stage has no directory to work with.
    pub fn validate(&self) -> Result<(), ProverError> {
        if self.compile || self.proof {
            self.circuit_dir()?;
        }
        if self.savepk || self.loadpk || self.contract {
            self.data_dir()?;
        }
        Ok(())
    }

    pub fn srs_config(&self) -> SrsConfig {
        SrsConfig {
            url_template: self.srs_url.clone(),
            timeout: Duration::from_secs(self.srs_timeout_secs),
        }
    }
}
