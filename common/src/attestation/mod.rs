//! Attestation document codec and verifier.
//!
//! The TEE's attestation issuer emits a COSE_Sign1 envelope (optionally
//! wrapped in CBOR tag 18) whose payload is a CBOR map binding platform
//! measurements, a timestamp, and the caller-supplied nonce/user_data.
//! `parse_document` performs the structural decode; [`AttestationVerifier`]
//! additionally walks the certificate chain to the pinned root and checks
//! the ECDSA-P384 envelope signature.

mod verify;

pub mod mock;

pub use verify::AttestationVerifier;

use std::collections::BTreeMap;

use coset::{CborSerializable, CoseSign1, TaggedCborSerializable};
use thiserror::Error;

/// Maximum sizes for the optional payload fields, per the issuer contract.
pub const MAX_NONCE_LEN: usize = 64;
pub const MAX_USER_DATA_LEN: usize = 512;
pub const MAX_PUBLIC_KEY_LEN: usize = 1024;
/// Certificates (leaf and bundle entries) are 1..=1024 bytes of DER.
pub const MAX_CERT_LEN: usize = 1024;

/// Attestation parsing and verification errors.
#[derive(Error, Debug)]
pub enum AttestationError {
    #[error("COSE envelope malformed: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Attestation payload malformed: {reason}")]
    MalformedPayload { reason: String },

    #[error("Unexpected signing algorithm (want ECDSA-P384-SHA384)")]
    WrongAlgorithm,

    #[error("Certificate chain invalid: {reason}")]
    InvalidCertificateChain { reason: String },

    #[error("Envelope signature verification failed")]
    SignatureMismatch,

    #[error("Nonce mismatch: expected {expected}, got {actual}")]
    NonceMismatch { expected: String, actual: String },

    #[error("User data mismatch: expected {expected}, got {actual}")]
    UserDataMismatch { expected: String, actual: String },

    #[error("Crypto backend error: {0}")]
    Crypto(String),
}

impl From<openssl::error::ErrorStack> for AttestationError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        AttestationError::Crypto(err.to_string())
    }
}

/// Parsed form of an attestation document payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationDoc {
    pub module_id: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// Digest family used for the PCR bank; always `"SHA384"`.
    pub digest: String,
    /// PCR index (0..32) to measurement bytes (32, 48 or 64 bytes).
    pub pcrs: BTreeMap<u8, Vec<u8>>,
    /// DER of the signing (leaf) certificate.
    pub certificate: Vec<u8>,
    /// DER certificates, root first, as emitted by the issuer.
    pub cabundle: Vec<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    pub user_data: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
}

/// Decode the COSE_Sign1 envelope, unwrapping CBOR tag 18 when present.
pub(crate) fn decode_envelope(raw: &[u8]) -> Result<CoseSign1, AttestationError> {
    CoseSign1::from_tagged_slice(raw)
        .or_else(|_| CoseSign1::from_slice(raw))
        .map_err(|e| AttestationError::MalformedEnvelope {
            reason: format!("{:?}", e),
        })
}

/// Structurally parse an attestation document: COSE envelope plus payload
/// shape validation. No cryptographic checks are performed here.
pub fn parse_document(raw: &[u8]) -> Result<AttestationDoc, AttestationError> {
    let envelope = decode_envelope(raw)?;
    let payload = envelope
        .payload
        .as_deref()
        .ok_or_else(|| AttestationError::MalformedEnvelope {
            reason: "payload missing".to_string(),
        })?;
    parse_payload(payload)
}

/// Parse and validate the CBOR payload map per the document shape rules.
pub(crate) fn parse_payload(payload: &[u8]) -> Result<AttestationDoc, AttestationError> {
    let value: serde_cbor::Value =
        serde_cbor::from_slice(payload).map_err(|e| AttestationError::MalformedPayload {
            reason: format!("payload is not CBOR: {}", e),
        })?;

    let map = as_map(&value).ok_or_else(|| malformed("payload is not a map"))?;

    let module_id = get_text(map, "module_id")?;
    if module_id.is_empty() {
        return Err(malformed("module_id is empty"));
    }

    let timestamp = get_int(map, "timestamp")?;
    if timestamp <= 0 {
        return Err(malformed("timestamp must be positive"));
    }
    let timestamp_ms = u64::try_from(timestamp).map_err(|_| malformed("timestamp out of range"))?;

    let digest = get_text(map, "digest")?;
    if digest != "SHA384" {
        return Err(malformed(&format!("unsupported digest {:?}", digest)));
    }

    let pcrs = parse_pcrs(get_field(map, "pcrs")?)?;

    let certificate = get_bytes(map, "certificate")?;
    if certificate.is_empty() || certificate.len() > MAX_CERT_LEN {
        return Err(malformed("certificate size out of bounds"));
    }

    let cabundle = parse_cabundle(get_field(map, "cabundle")?)?;

    let public_key = get_opt_bytes(map, "public_key")?;
    if let Some(ref pk) = public_key {
        if pk.len() > MAX_PUBLIC_KEY_LEN {
            return Err(malformed("public_key exceeds 1024 bytes"));
        }
    }
    let user_data = get_opt_bytes(map, "user_data")?;
    if let Some(ref ud) = user_data {
        if ud.len() > MAX_USER_DATA_LEN {
            return Err(malformed("user_data exceeds 512 bytes"));
        }
    }
    let nonce = get_opt_bytes(map, "nonce")?;
    if let Some(ref n) = nonce {
        if n.len() > MAX_NONCE_LEN {
            return Err(malformed("nonce exceeds 64 bytes"));
        }
    }

    Ok(AttestationDoc {
        module_id,
        timestamp_ms,
        digest,
        pcrs,
        certificate,
        cabundle,
        public_key,
        user_data,
        nonce,
    })
}

/// The PCR bank arrives as a CBOR map keyed either by integers or by the
/// decimal text rendering of the index; both encodings are normalized to an
/// integer-indexed map.
fn parse_pcrs(value: &serde_cbor::Value) -> Result<BTreeMap<u8, Vec<u8>>, AttestationError> {
    let map = as_map(value).ok_or_else(|| malformed("pcrs is not a map"))?;
    if map.is_empty() {
        return Err(malformed("pcrs map is empty"));
    }

    let mut pcrs = BTreeMap::new();
    for (key, val) in map {
        let index: u8 = match key {
            serde_cbor::Value::Integer(i) => {
                u8::try_from(*i).map_err(|_| malformed("pcr index out of range"))?
            }
            serde_cbor::Value::Text(t) => t
                .parse::<u8>()
                .map_err(|_| malformed("pcr index is not a number"))?,
            _ => return Err(malformed("pcr key is neither integer nor text")),
        };
        if index >= 32 {
            return Err(malformed("pcr index must be in [0,32)"));
        }
        let bytes = match val {
            serde_cbor::Value::Bytes(b) => b.clone(),
            _ => return Err(malformed("pcr value is not a byte string")),
        };
        if !matches!(bytes.len(), 32 | 48 | 64) {
            return Err(malformed("pcr length must be 32, 48 or 64"));
        }
        pcrs.insert(index, bytes);
    }
    Ok(pcrs)
}

fn parse_cabundle(value: &serde_cbor::Value) -> Result<Vec<Vec<u8>>, AttestationError> {
    let entries = match value {
        serde_cbor::Value::Array(arr) => arr,
        _ => return Err(malformed("cabundle is not an array")),
    };
    if entries.is_empty() {
        return Err(malformed("cabundle is empty"));
    }
    let mut bundle = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            serde_cbor::Value::Bytes(b) if !b.is_empty() && b.len() <= MAX_CERT_LEN => {
                bundle.push(b.clone());
            }
            serde_cbor::Value::Bytes(_) => {
                return Err(malformed("cabundle entry size out of bounds"));
            }
            _ => return Err(malformed("cabundle entry is not bytes")),
        }
    }
    Ok(bundle)
}

fn malformed(reason: &str) -> AttestationError {
    AttestationError::MalformedPayload {
        reason: reason.to_string(),
    }
}

// CBOR map helpers in the BTreeMap-walking style used across the codebase.

type CborMap = BTreeMap<serde_cbor::Value, serde_cbor::Value>;

fn as_map(value: &serde_cbor::Value) -> Option<&CborMap> {
    match value {
        serde_cbor::Value::Map(m) => Some(m),
        _ => None,
    }
}

fn get_field<'a>(map: &'a CborMap, key: &str) -> Result<&'a serde_cbor::Value, AttestationError> {
    map.get(&serde_cbor::Value::Text(key.to_string()))
        .ok_or_else(|| malformed(&format!("missing field {}", key)))
}

fn get_text(map: &CborMap, key: &str) -> Result<String, AttestationError> {
    match get_field(map, key)? {
        serde_cbor::Value::Text(s) => Ok(s.clone()),
        _ => Err(malformed(&format!("field {} is not text", key))),
    }
}

fn get_int(map: &CborMap, key: &str) -> Result<i128, AttestationError> {
    match get_field(map, key)? {
        serde_cbor::Value::Integer(i) => Ok(*i),
        _ => Err(malformed(&format!("field {} is not an integer", key))),
    }
}

fn get_bytes(map: &CborMap, key: &str) -> Result<Vec<u8>, AttestationError> {
    match get_field(map, key)? {
        serde_cbor::Value::Bytes(b) => Ok(b.clone()),
        _ => Err(malformed(&format!("field {} is not bytes", key))),
    }
}

fn get_opt_bytes(map: &CborMap, key: &str) -> Result<Option<Vec<u8>>, AttestationError> {
    match map.get(&serde_cbor::Value::Text(key.to_string())) {
        None | Some(serde_cbor::Value::Null) => Ok(None),
        Some(serde_cbor::Value::Bytes(b)) => Ok(Some(b.clone())),
        Some(_) => Err(malformed(&format!("field {} is not bytes", key))),
    }
}
