//! Hash-of-hashes manifest binding every ceremony artifact.
//!
//! The manifest lists `(path, SHA-256)` for each committed artifact in a
//! compile-time-fixed order. Its derived values seal the final attestation:
//! the nonce is the SHA-256 of the concatenated hex digests, and the
//! user_data is the SHA-256 of the rendered manifest text. Reordering a
//! single pair or appending a byte to the rendering is a breaking change.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{CeremonyError, Result};

/// Committed artifacts, in manifest order.
pub const MANIFEST_ORDER: [&str; 11] = [
    "circuit.circom",
    "powersOfTau.ptau",
    "circuit_0000.zkey",
    "circuit.r1cs",
    "circuit.wasm",
    "time-attestation.cbor",
    "drand-beacon.json",
    "circuit_final.zkey",
    "verifier.sol",
    "verifier_creation.hex",
    "verifier_runtime_keccak.hex",
];

/// Artifacts shipped back to the host after the final attestation, in send
/// order. The host already holds the circuit source, the PTAU file and the
/// initial key it produced itself.
pub const SHIP_ORDER: [&str; 9] = [
    "circuit.r1cs",
    "circuit.wasm",
    "drand-beacon.json",
    "circuit_final.zkey",
    "verifier.sol",
    "verifier_creation.hex",
    "verifier_runtime_keccak.hex",
    "manifest.txt",
    "final-attestation.cbor",
];

pub const MANIFEST_FILE_NAME: &str = "manifest.txt";
pub const FINAL_ATTESTATION_FILE_NAME: &str = "final-attestation.cbor";
pub const TIME_ATTESTATION_FILE_NAME: &str = "time-attestation.cbor";
pub const BEACON_FILE_NAME: &str = "drand-beacon.json";

/// Ordered list of `(path, hex digest)` pairs plus the derived commitments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, String)>,
}

impl Manifest {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Hash every artifact of [`MANIFEST_ORDER`] found under `dir`.
    pub fn from_workdir(dir: &Path) -> Result<Self> {
        let mut entries = Vec::with_capacity(MANIFEST_ORDER.len());
        for name in MANIFEST_ORDER {
            let bytes = std::fs::read(dir.join(name)).map_err(|e| {
                CeremonyError::Manifest(format!("cannot read artifact {}: {}", name, e))
            })?;
            let digest = Sha256::digest(&bytes);
            entries.push((name.to_string(), hex::encode(digest)));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Concatenation of all hex digests in listed order.
    pub fn concatenated(&self) -> String {
        self.entries
            .iter()
            .map(|(_, digest)| digest.as_str())
            .collect()
    }

    /// SHA-256 over the UTF-8 bytes of [`Manifest::concatenated`].
    pub fn final_attestation_nonce(&self) -> [u8; 32] {
        Sha256::digest(self.concatenated().as_bytes()).into()
    }

    /// The plain-text rendering. One `path: digest` line per artifact, a
    /// blank line, then the two derived values. Every line ends in `\n`.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for (path, digest) in &self.entries {
            text.push_str(path);
            text.push_str(": ");
            text.push_str(digest);
            text.push('\n');
        }
        text.push('\n');
        text.push_str("concatenated: ");
        text.push_str(&self.concatenated());
        text.push('\n');
        text.push_str("finalAttestationNonce: ");
        text.push_str(&hex::encode(self.final_attestation_nonce()));
        text.push('\n');
        text
    }

    /// SHA-256 of the rendered manifest text; the final attestation's
    /// user_data.
    pub fn hash_of_hashes(&self) -> [u8; 32] {
        Sha256::digest(self.render().as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest::new(vec![
            ("one".to_string(), "aa11".to_string()),
            ("two".to_string(), "bb22".to_string()),
            ("three".to_string(), "cc33".to_string()),
            ("four".to_string(), "dd44".to_string()),
        ])
    }

    #[test]
    fn nonce_is_sha256_of_concatenated_digests() {
        let manifest = sample();
        assert_eq!(manifest.concatenated(), "aa11bb22cc33dd44");
        let expected: [u8; 32] = Sha256::digest(b"aa11bb22cc33dd44").into();
        assert_eq!(manifest.final_attestation_nonce(), expected);
    }

    #[test]
    fn reordering_any_pair_changes_the_nonce() {
        let manifest = sample();
        let mut entries = manifest.entries().to_vec();
        entries.swap(1, 2);
        let reordered = Manifest::new(entries);
        assert_ne!(
            manifest.final_attestation_nonce(),
            reordered.final_attestation_nonce()
        );
        assert_ne!(manifest.hash_of_hashes(), reordered.hash_of_hashes());
    }

    #[test]
    fn rendering_is_byte_exact() {
        let manifest = Manifest::new(vec![
            ("a.bin".to_string(), "00ff".to_string()),
            ("b.bin".to_string(), "11ee".to_string()),
        ]);
        let nonce_hex = hex::encode(manifest.final_attestation_nonce());
        let expected = format!(
            "a.bin: 00ff\nb.bin: 11ee\n\nconcatenated: 00ff11ee\nfinalAttestationNonce: {}\n",
            nonce_hex
        );
        assert_eq!(manifest.render(), expected);

        // A trailing newline is a breaking change.
        let mut padded = manifest.render();
        padded.push('\n');
        let altered: [u8; 32] = Sha256::digest(padded.as_bytes()).into();
        assert_ne!(manifest.hash_of_hashes(), altered);
    }

    #[test]
    fn from_workdir_hashes_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        for (i, name) in MANIFEST_ORDER.iter().enumerate() {
            std::fs::write(dir.path().join(name), format!("artifact-{}", i)).unwrap();
        }
        let manifest = Manifest::from_workdir(dir.path()).unwrap();
        assert_eq!(manifest.entries().len(), MANIFEST_ORDER.len());
        for ((path, digest), name) in manifest.entries().iter().zip(MANIFEST_ORDER) {
            assert_eq!(path, name);
            assert_eq!(digest.len(), 64);
        }
    }

    #[test]
    fn from_workdir_fails_on_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::from_workdir(dir.path()).is_err());
    }
}
