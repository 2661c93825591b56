use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used for exit decisions and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Range,
    Backend,
    Io,
}

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("expected {expected} public inputs, got {actual}")]
    PublicInputCount { expected: usize, actual: usize },

    #[error("Error while parsing request body: {0}")]
    MalformedRequest(String),

    #[error("invalid artifact state: {0}")]
    InvalidState(&'static str),

    #[error("public input {index} is not a byte: {value}")]
    LimbOutOfRange { index: usize, value: u64 },

    #[error("hash exceeds 253 bits ({bits} bits)")]
    HashOutOfRange { bits: u64 },

    #[error("failed to compile circuit: {0}")]
    Compile(String),

    #[error("circuit setup failed: {0}")]
    Setup(String),

    #[error("failed to generate witness: {0}")]
    Witness(String),

    #[error("failed to create proof: {0}")]
    Proving(String),

    #[error("failed to verify proof: {0}")]
    Verification(String),

    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("SRS download failed: {0}")]
    SrsDownload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PublicInputCount { .. } | Self::MalformedRequest(_) | Self::InvalidState(_) => {
                ErrorKind::Structural
            }
            Self::LimbOutOfRange { .. } | Self::HashOutOfRange { .. } => ErrorKind::Range,
            Self::Io { .. } | Self::Json { .. } | Self::SrsDownload(_) => ErrorKind::Io,
            Self::Compile(_)
            | Self::Setup(_)
            | Self::Witness(_)
            | Self::Proving(_)
            | Self::Verification(_)
            | Self::ArtifactMismatch(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Backend,
        }
    }
}

impl From<ark_serialize::SerializationError> for ProverError {
    fn from(e: ark_serialize::SerializationError) -> Self {
        Self::Serialization(e.to_string())
    }
}
