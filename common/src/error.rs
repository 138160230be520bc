use thiserror::Error;

use crate::attestation::AttestationError;
use crate::beacon::BeaconError;
use crate::transport::TransportError;

/// Errors that can occur anywhere in the ceremony engine.
///
/// Every variant is terminal: the ceremony has no retry-and-continue paths,
/// and a failed invariant means the process exits non-zero without emitting
/// a final attestation.
#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("Attestation failure: {0}")]
    Attestation(#[from] AttestationError),

    #[error("Beacon failure: {0}")]
    Beacon(#[from] BeaconError),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("PTAU parameter failure: {0}")]
    Ptau(String),

    #[error("Circuit failure: {0}")]
    Circuit(String),

    #[error("External tool failure: {0}")]
    Tool(String),

    #[error("Hardware RNG gate failure: {0}")]
    RngGate(String),

    #[error("Manifest failure: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for CeremonyError {
    fn from(err: std::io::Error) -> Self {
        CeremonyError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CeremonyError {
    fn from(err: serde_json::Error) -> Self {
        CeremonyError::Serialization(err.to_string())
    }
}

/// Common result type for the ceremony engine.
pub type Result<T> = std::result::Result<T, CeremonyError>;
