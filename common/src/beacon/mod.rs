//! drand beacon types, round timing, and signature verification.
//!
//! The scheme is always taken from the pinned [`ChainInfo`], never from the
//! beacon payload: a beacon that self-describes a weaker scheme must not be
//! able to downgrade verification.

mod bls;

pub mod mock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use thiserror::Error;

/// Beacon verification errors. All are terminal.
#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Unrecognized beacon scheme: {id}")]
    UnknownScheme { id: String },

    #[error("Beacon round mismatch: expected {expected}, got {actual}")]
    WrongRound { expected: u64, actual: u64 },

    #[error("Beacon randomness is not SHA-256 of the signature")]
    RandomnessMismatch,

    #[error("Chained scheme requires previous_signature")]
    MissingPreviousSignature,

    #[error("Malformed beacon field {field}: {reason}")]
    MalformedField {
        field: &'static str,
        reason: String,
    },

    #[error("Point decoding failed: {0}")]
    InvalidPoint(String),

    #[error("Hash-to-curve failed: {0}")]
    HashToCurve(String),

    #[error("BLS signature verification failed")]
    SignatureInvalid,

    #[error("Beacon JSON malformed: {0}")]
    Json(String),
}

/// One emission of the randomness network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub round: u64,
    /// Hex-encoded group element.
    pub signature: String,
    /// Hex SHA-256 of the signature bytes.
    pub randomness: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_signature: Option<String>,
}

impl Beacon {
    /// Parse the canonical byte representation received from the oracle.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, BeaconError> {
        serde_json::from_slice(bytes).map_err(|e| BeaconError::Json(e.to_string()))
    }
}

/// Pinned parameters of one drand chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    /// Hex-encoded group public key.
    pub public_key: String,
    /// Seconds between rounds.
    pub period: u64,
    /// UNIX seconds of round 1.
    pub genesis_time: u64,
    pub hash: String,
    pub group_hash: String,
    pub scheme_id: String,
}

/// The five recognized beacon encodings, keyed by chain `schemeID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `pedersen-bls-chained`: G2 signatures over SHA-256(prev ‖ round).
    ChainedG2,
    /// `pedersen-bls-unchained`: G2 signatures over SHA-256(round).
    UnchainedG2,
    /// `bls-unchained-on-g1`: G1 signatures under the historical G2 domain.
    SwappedG1,
    /// `bls-unchained-g1-rfc9380`: G1 signatures under the RFC 9380 domain.
    Rfc9380G1,
    /// `bls-bn254-unchained-on-g1`: short BN254 G1 signatures, keccak message.
    Bn254G1,
}

impl Scheme {
    pub fn from_id(id: &str) -> Result<Self, BeaconError> {
        match id {
            "pedersen-bls-chained" => Ok(Scheme::ChainedG2),
            "pedersen-bls-unchained" => Ok(Scheme::UnchainedG2),
            "bls-unchained-on-g1" => Ok(Scheme::SwappedG1),
            "bls-unchained-g1-rfc9380" => Ok(Scheme::Rfc9380G1),
            "bls-bn254-unchained-on-g1" => Ok(Scheme::Bn254G1),
            other => Err(BeaconError::UnknownScheme {
                id: other.to_string(),
            }),
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Scheme::ChainedG2 => "pedersen-bls-chained",
            Scheme::UnchainedG2 => "pedersen-bls-unchained",
            Scheme::SwappedG1 => "bls-unchained-on-g1",
            Scheme::Rfc9380G1 => "bls-unchained-g1-rfc9380",
            Scheme::Bn254G1 => "bls-bn254-unchained-on-g1",
        }
    }

    pub fn is_chained(self) -> bool {
        matches!(self, Scheme::ChainedG2)
    }
}

/// Round in progress at wall-clock time `t_ms` (milliseconds since epoch).
pub fn round_at(chain: &ChainInfo, t_ms: u64) -> u64 {
    let t_secs = t_ms / 1000;
    if chain.period == 0 || t_secs < chain.genesis_time {
        return 1;
    }
    (t_secs - chain.genesis_time) / chain.period + 1
}

/// UNIX seconds at which round `r` is emitted.
pub fn round_time(chain: &ChainInfo, round: u64) -> u64 {
    chain.genesis_time + round.saturating_sub(1) * chain.period
}

/// The message that was signed for this beacon, per the chain's scheme.
pub fn beacon_message(scheme: Scheme, beacon: &Beacon) -> Result<Vec<u8>, BeaconError> {
    let round_be = beacon.round.to_be_bytes();
    match scheme {
        Scheme::ChainedG2 => {
            let prev = beacon
                .previous_signature
                .as_deref()
                .ok_or(BeaconError::MissingPreviousSignature)?;
            let prev = decode_hex_field(prev, "previous_signature")?;
            let mut hasher = Sha256::new();
            hasher.update(&prev);
            hasher.update(round_be);
            Ok(hasher.finalize().to_vec())
        }
        Scheme::UnchainedG2 | Scheme::SwappedG1 | Scheme::Rfc9380G1 => {
            Ok(Sha256::digest(round_be).to_vec())
        }
        Scheme::Bn254G1 => Ok(Keccak256::digest(round_be).to_vec()),
    }
}

/// Verify a beacon against the pinned chain: randomness binding plus the
/// scheme-appropriate pairing check.
pub fn verify_beacon(chain: &ChainInfo, beacon: &Beacon) -> Result<(), BeaconError> {
    let scheme = Scheme::from_id(&chain.scheme_id)?;

    let signature = decode_hex_field(&beacon.signature, "signature")?;
    let randomness = decode_hex_field(&beacon.randomness, "randomness")?;
    if Sha256::digest(&signature).as_slice() != randomness.as_slice() {
        return Err(BeaconError::RandomnessMismatch);
    }

    let message = beacon_message(scheme, beacon)?;
    let public_key = decode_hex_field(&chain.public_key, "public_key")?;

    match scheme {
        Scheme::ChainedG2 | Scheme::UnchainedG2 => {
            bls::verify_bls12_381_g2(&public_key, &signature, &message)
        }
        Scheme::SwappedG1 => {
            bls::verify_bls12_381_g1(&public_key, &signature, &message, bls::DST_G2)
        }
        Scheme::Rfc9380G1 => {
            bls::verify_bls12_381_g1(&public_key, &signature, &message, bls::DST_G1)
        }
        Scheme::Bn254G1 => bls::verify_bn254_g1(&public_key, &signature, &message),
    }
}

/// [`verify_beacon`] plus the round binding the enclave derives from the
/// sealed time-attestation.
pub fn verify_beacon_at(
    chain: &ChainInfo,
    beacon: &Beacon,
    expected_round: u64,
) -> Result<(), BeaconError> {
    if beacon.round != expected_round {
        return Err(BeaconError::WrongRound {
            expected: expected_round,
            actual: beacon.round,
        });
    }
    verify_beacon(chain, beacon)
}

fn decode_hex_field(hex_str: &str, field: &'static str) -> Result<Vec<u8>, BeaconError> {
    hex::decode(hex_str).map_err(|e| BeaconError::MalformedField {
        field,
        reason: e.to_string(),
    })
}
