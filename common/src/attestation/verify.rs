use std::cmp::Ordering;

use coset::iana;
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::MessageDigest;
use openssl::sign::Verifier;
use openssl::x509::{X509Ref, X509VerifyResult, X509};

use super::{decode_envelope, parse_payload, AttestationDoc, AttestationError};
use crate::constants::NITRO_ROOT_CA_DER;

/// Verifies attestation envelopes against a pinned root certificate.
///
/// The verification order is fixed: algorithm check, chain construction and
/// walk (with the pinned root as the only trust anchor), then the COSE
/// signature under the leaf key. Any failure is terminal.
pub struct AttestationVerifier {
    root_der: Vec<u8>,
}

impl AttestationVerifier {
    /// Verifier pinned to the compiled-in TEE vendor root.
    pub fn pinned() -> Self {
        Self {
            root_der: NITRO_ROOT_CA_DER.to_vec(),
        }
    }

    /// Verifier with an explicit root (tests, alternate deployments).
    pub fn with_root_der(root_der: Vec<u8>) -> Self {
        Self { root_der }
    }

    /// Fully verify a raw attestation document and return its parsed payload.
    pub fn verify(&self, raw: &[u8]) -> Result<AttestationDoc, AttestationError> {
        let envelope = decode_envelope(raw)?;

        // 1. The protected header must pin ECDSA-P384-SHA384.
        if envelope.protected.header.alg
            != Some(coset::Algorithm::Assigned(iana::Algorithm::ES384))
        {
            return Err(AttestationError::WrongAlgorithm);
        }

        let payload = envelope
            .payload
            .as_deref()
            .ok_or_else(|| AttestationError::MalformedEnvelope {
                reason: "payload missing".to_string(),
            })?;
        let doc = parse_payload(payload)?;

        // 2–4. Chain: leaf first, then the bundle reversed, so every element
        // is followed by its issuer and the anchor sits last. The anchor must
        // byte-equal the pinned root; the bundle itself is attacker-supplied
        // and is never trusted to choose the anchor.
        let mut chain_der: Vec<&[u8]> = Vec::with_capacity(1 + doc.cabundle.len());
        chain_der.push(&doc.certificate);
        for cert in doc.cabundle.iter().rev() {
            chain_der.push(cert);
        }
        if *chain_der.last().expect("chain is non-empty") != self.root_der.as_slice() {
            return Err(AttestationError::InvalidCertificateChain {
                reason: "chain does not terminate at the pinned root".to_string(),
            });
        }

        let certs: Vec<X509> = chain_der
            .iter()
            .map(|der| {
                X509::from_der(der).map_err(|e| AttestationError::InvalidCertificateChain {
                    reason: format!("certificate DER: {}", e),
                })
            })
            .collect::<Result<_, _>>()?;

        let now = Asn1Time::days_from_now(0)?;
        for pair in certs.windows(2) {
            let (child, issuer) = (&pair[0], &pair[1]);
            if issuer.issued(child) != X509VerifyResult::OK {
                return Err(AttestationError::InvalidCertificateChain {
                    reason: "issuer/subject mismatch".to_string(),
                });
            }
            check_validity_window(child, &now)?;
            let issuer_key = issuer.public_key()?;
            if !child.verify(&issuer_key)? {
                return Err(AttestationError::InvalidCertificateChain {
                    reason: "certificate signature invalid".to_string(),
                });
            }
        }
        check_validity_window(certs.last().expect("chain is non-empty"), &now)?;

        // 5. COSE signature over the reconstructed Sig_structure, under the
        // leaf key. COSE carries the ECDSA signature as raw r||s; OpenSSL
        // wants ASN.1 DER.
        let leaf_key = certs[0].public_key()?;
        envelope.verify_signature(&[], |sig, tbs_data| {
            let der_sig = ecdsa_raw_to_der(sig)?;
            let mut verifier = Verifier::new(MessageDigest::sha384(), &leaf_key)?;
            verifier.update(tbs_data)?;
            if verifier.verify(&der_sig)? {
                Ok(())
            } else {
                Err(AttestationError::SignatureMismatch)
            }
        })?;

        Ok(doc)
    }

    /// Verify a document and additionally require exact nonce / user_data
    /// values. Used by the enclave to re-check what the issuer sealed.
    pub fn verify_expecting(
        &self,
        raw: &[u8],
        expected_nonce: &[u8],
        expected_user_data: Option<&[u8]>,
    ) -> Result<AttestationDoc, AttestationError> {
        let doc = self.verify(raw)?;

        if doc.nonce.as_deref() != Some(expected_nonce) {
            return Err(AttestationError::NonceMismatch {
                expected: hex::encode(expected_nonce),
                actual: doc.nonce.as_deref().map(hex::encode).unwrap_or_default(),
            });
        }
        if doc.user_data.as_deref() != expected_user_data {
            return Err(AttestationError::UserDataMismatch {
                expected: expected_user_data.map(hex::encode).unwrap_or_default(),
                actual: doc
                    .user_data
                    .as_deref()
                    .map(hex::encode)
                    .unwrap_or_default(),
            });
        }
        Ok(doc)
    }
}

fn check_validity_window(cert: &X509Ref, now: &Asn1TimeRef) -> Result<(), AttestationError> {
    let not_yet_valid = cert.not_before().compare(now)? == Ordering::Greater;
    let expired = cert.not_after().compare(now)? == Ordering::Less;
    if not_yet_valid || expired {
        return Err(AttestationError::InvalidCertificateChain {
            reason: "certificate outside its validity window".to_string(),
        });
    }
    Ok(())
}

/// Convert a COSE raw `r || s` ECDSA signature into ASN.1 DER: two INTEGERs,
/// leading zeros stripped, one zero byte re-prepended when the high bit of
/// the remaining integer is set.
fn ecdsa_raw_to_der(raw: &[u8]) -> Result<Vec<u8>, AttestationError> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(AttestationError::MalformedEnvelope {
            reason: format!("ECDSA signature length {} is not even", raw.len()),
        });
    }

    fn encode_integer(bytes: &[u8]) -> Vec<u8> {
        let stripped = match bytes.iter().position(|&b| b != 0) {
            Some(pos) => &bytes[pos..],
            None => &[0u8][..],
        };
        let mut out = if stripped[0] & 0x80 != 0 {
            let mut v = vec![0x02, (stripped.len() + 1) as u8, 0x00];
            v.reserve(stripped.len());
            v
        } else {
            vec![0x02, stripped.len() as u8]
        };
        out.extend_from_slice(stripped);
        out
    }

    let half = raw.len() / 2;
    let r = encode_integer(&raw[..half]);
    let s = encode_integer(&raw[half..]);

    let body_len = r.len() + s.len();
    let mut der = vec![0x30];
    if body_len < 128 {
        der.push(body_len as u8);
    } else {
        der.push(0x81);
        der.push(body_len as u8);
    }
    der.extend_from_slice(&r);
    der.extend_from_slice(&s);
    Ok(der)
}
