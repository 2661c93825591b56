//! Structured reference string: cached under the circuit directory, fetched
//! once over HTTP when missing.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::ProverError;

pub const SRS_CACHE_FILE: &str = "srs_setup";

pub const DEFAULT_SRS_URL: &str =
    "https://trusted-setup-halo2kzg.s3.eu-central-1.amazonaws.com/perpetual-powers-of-tau-raw-{k}";

#[derive(Debug, Clone)]
pub struct SrsConfig {
    /// Download URL; `{k}` is replaced with the log2 of the circuit domain.
    pub url_template: String,
    pub timeout: Duration,
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_SRS_URL.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl SrsConfig {
    pub fn url_for(&self, k: u32) -> String {
        self.url_template.replace("{k}", &k.to_string())
    }

    pub fn cache_path(circuit_dir: &Path) -> PathBuf {
        circuit_dir.join(SRS_CACHE_FILE)
    }

    /// Read `srs_setup` from `circuit_dir`, downloading it first if absent.
    ///
    /// Uses a blocking HTTP client; call from a blocking context.
    pub fn fetch_or_download(&self, circuit_dir: &Path, k: u32) -> Result<Srs, ProverError> {
        let path = Self::cache_path(circuit_dir);
        let start = Instant::now();

        if path.exists() {
            tracing::info!("Loading SRS from {}", path.display());
        } else {
            let url = self.url_for(k);
            tracing::info!("SRS not found at {}, downloading {}", path.display(), url);
            let bytes = self.download(&url)?;
            write_atomically(&path, &bytes)?;
            tracing::info!("Downloaded SRS ({} bytes)", bytes.len());
        }

        let bytes = std::fs::read(&path).map_err(|e| ProverError::io(&path, e))?;
        let srs = Srs::from_bytes(bytes)?;
        tracing::info!("SRS ready, time: {:?}", start.elapsed());
        Ok(srs)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ProverError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProverError::SrsDownload(e.to_string()))?;
        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProverError::SrsDownload(e.to_string()))?;
        let bytes = response
            .bytes()
            .map_err(|e| ProverError::SrsDownload(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ProverError> {
    let partial = path.with_extension("partial");
    std::fs::write(&partial, bytes).map_err(|e| ProverError::io(&partial, e))?;
    std::fs::rename(&partial, path).map_err(|e| ProverError::io(path, e))
}

/// Raw SRS transcript.
pub struct Srs {
    bytes: Vec<u8>,
}

impl Srs {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ProverError> {
        if bytes.is_empty() {
            return Err(ProverError::Setup("SRS file is empty".to_string()));
        }
        Ok(Self { bytes })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// SHA-256 of the transcript; seeds circuit setup.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.bytes).into()
    }
}
