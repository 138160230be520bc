//! Mock attestation issuer for tests.
//!
//! Generates a throwaway P-384 root and leaf, then issues COSE_Sign1
//! documents with the same shape the platform issuer emits. Verifiers under
//! test are pointed at [`MockIssuer::root_der`] instead of the pinned root.

use std::collections::BTreeMap;

use coset::{
    iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder, TaggedCborSerializable,
};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use super::decode_envelope;

const DEFAULT_TIMESTAMP_MS: i128 = 1_700_000_000_000;

pub struct MockIssuer {
    root_der: Vec<u8>,
    leaf_der: Vec<u8>,
    leaf_key: EcKey<Private>,
    timestamp_ms: i128,
}

impl MockIssuer {
    /// Generate a fresh root + leaf pair.
    pub fn generate() -> Self {
        let group =
            EcGroup::from_curve_name(Nid::SECP384R1).expect("P-384 group");
        let root_key = EcKey::generate(&group).expect("root key");
        let leaf_key = EcKey::generate(&group).expect("leaf key");

        let root = build_cert(&root_key, &root_key, "mock.nitro-root", "mock.nitro-root", 1);
        let leaf = build_cert(&leaf_key, &root_key, "mock.nitro-leaf", "mock.nitro-root", 2);

        Self {
            root_der: root.to_der().expect("root DER"),
            leaf_der: leaf.to_der().expect("leaf DER"),
            leaf_key,
            timestamp_ms: DEFAULT_TIMESTAMP_MS,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms as i128;
        self
    }

    pub fn root_der(&self) -> &[u8] {
        &self.root_der
    }

    /// Issue an untagged COSE_Sign1 document.
    pub fn issue(&self, nonce: Option<&[u8]>, user_data: Option<&[u8]>) -> Vec<u8> {
        self.sign_envelope(self.payload(nonce, user_data, false, None))
            .to_vec()
            .expect("serialize envelope")
    }

    /// Issue a tag-18-wrapped document.
    pub fn issue_tagged(&self, nonce: Option<&[u8]>, user_data: Option<&[u8]>) -> Vec<u8> {
        self.sign_envelope(self.payload(nonce, user_data, false, None))
            .to_tagged_vec()
            .expect("serialize tagged envelope")
    }

    /// Issue with the PCR map keyed by decimal text instead of integers.
    pub fn issue_with_text_pcr_keys(&self, nonce: Option<&[u8]>) -> Vec<u8> {
        self.sign_envelope(self.payload(nonce, None, true, None))
            .to_vec()
            .expect("serialize envelope")
    }

    /// Issue with one PCR entry overridden (for shape-violation tests).
    pub fn issue_with_pcr(&self, index: u8, value: Vec<u8>) -> Vec<u8> {
        self.sign_envelope(self.payload(None, None, false, Some((index, value))))
            .to_vec()
            .expect("serialize envelope")
    }

    /// Issue under a different protected-header algorithm.
    pub fn issue_with_algorithm(&self, alg: iana::Algorithm, nonce: Option<&[u8]>) -> Vec<u8> {
        let payload = self.payload(nonce, None, false, None);
        let envelope = CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(alg).build())
            .payload(payload)
            .create_signature(&[], |tbs| self.sign_p384(tbs))
            .build();
        envelope.to_vec().expect("serialize envelope")
    }

    /// Rewrite payload fields after signing; the stale signature is kept so
    /// verification must fail.
    pub fn tamper_payload<F>(raw: &[u8], mutate: F) -> Vec<u8>
    where
        F: FnOnce(&mut BTreeMap<serde_cbor::Value, serde_cbor::Value>),
    {
        let mut envelope: CoseSign1 = decode_envelope(raw).expect("decode envelope");
        let payload = envelope.payload.take().expect("payload present");
        let mut value: serde_cbor::Value =
            serde_cbor::from_slice(&payload).expect("payload CBOR");
        if let serde_cbor::Value::Map(ref mut map) = value {
            mutate(map);
        }
        envelope.payload = Some(serde_cbor::to_vec(&value).expect("re-encode payload"));
        envelope.to_vec().expect("serialize envelope")
    }

    /// Flip a byte inside the raw signature.
    pub fn corrupt_signature(raw: &[u8]) -> Vec<u8> {
        let mut envelope: CoseSign1 = decode_envelope(raw).expect("decode envelope");
        let last = envelope.signature.len() - 1;
        envelope.signature[last] ^= 0x01;
        envelope.to_vec().expect("serialize envelope")
    }

    fn payload(
        &self,
        nonce: Option<&[u8]>,
        user_data: Option<&[u8]>,
        text_pcr_keys: bool,
        pcr_override: Option<(u8, Vec<u8>)>,
    ) -> Vec<u8> {
        use serde_cbor::Value;

        let mut pcrs: BTreeMap<Value, Value> = BTreeMap::new();
        for idx in 0u8..3 {
            let key = if text_pcr_keys {
                Value::Text(idx.to_string())
            } else {
                Value::Integer(idx as i128)
            };
            pcrs.insert(key, Value::Bytes(vec![idx + 1; 48]));
        }
        if let Some((idx, bytes)) = pcr_override {
            pcrs.insert(Value::Integer(idx as i128), Value::Bytes(bytes));
        }

        let mut map: BTreeMap<Value, Value> = BTreeMap::new();
        map.insert(
            Value::Text("module_id".into()),
            Value::Text("i-0f7a1b2c3d4e5f678-enc0123456789abcdef".into()),
        );
        map.insert(Value::Text("digest".into()), Value::Text("SHA384".into()));
        map.insert(
            Value::Text("timestamp".into()),
            Value::Integer(self.timestamp_ms),
        );
        map.insert(Value::Text("pcrs".into()), Value::Map(pcrs));
        map.insert(
            Value::Text("certificate".into()),
            Value::Bytes(self.leaf_der.clone()),
        );
        map.insert(
            Value::Text("cabundle".into()),
            Value::Array(vec![Value::Bytes(self.root_der.clone())]),
        );
        if let Some(n) = nonce {
            map.insert(Value::Text("nonce".into()), Value::Bytes(n.to_vec()));
        }
        if let Some(ud) = user_data {
            map.insert(Value::Text("user_data".into()), Value::Bytes(ud.to_vec()));
        }

        serde_cbor::to_vec(&Value::Map(map)).expect("encode payload")
    }

    fn sign_envelope(&self, payload: Vec<u8>) -> CoseSign1 {
        CoseSign1Builder::new()
            .protected(
                HeaderBuilder::new()
                    .algorithm(iana::Algorithm::ES384)
                    .build(),
            )
            .payload(payload)
            .create_signature(&[], |tbs| self.sign_p384(tbs))
            .build()
    }

    /// Raw `r || s` P-384 signature over SHA-384(tbs), each half padded to
    /// 48 bytes.
    fn sign_p384(&self, tbs: &[u8]) -> Vec<u8> {
        let digest = hash(MessageDigest::sha384(), tbs).expect("sha384");
        let sig = EcdsaSig::sign(&digest, &self.leaf_key).expect("ecdsa sign");
        let mut out = vec![0u8; 96];
        let r = sig.r().to_vec();
        let s = sig.s().to_vec();
        out[48 - r.len()..48].copy_from_slice(&r);
        out[96 - s.len()..].copy_from_slice(&s);
        out
    }
}

fn build_cert(
    subject_key: &EcKey<Private>,
    signer_key: &EcKey<Private>,
    subject_cn: &str,
    issuer_cn: &str,
    serial: u32,
) -> X509 {
    let mut builder = X509Builder::new().expect("x509 builder");
    builder.set_version(2).expect("version");

    let serial = BigNum::from_u32(serial)
        .and_then(|bn| bn.to_asn1_integer())
        .expect("serial");
    builder.set_serial_number(&serial).expect("serial number");

    let mut subject = X509NameBuilder::new().expect("name builder");
    subject
        .append_entry_by_text("CN", subject_cn)
        .expect("subject CN");
    let subject = subject.build();
    builder.set_subject_name(&subject).expect("subject");

    let mut issuer = X509NameBuilder::new().expect("name builder");
    issuer
        .append_entry_by_text("CN", issuer_cn)
        .expect("issuer CN");
    let issuer = issuer.build();
    builder.set_issuer_name(&issuer).expect("issuer");

    let not_before = Asn1Time::days_from_now(0).expect("not_before");
    let not_after = Asn1Time::days_from_now(365).expect("not_after");
    builder.set_not_before(&not_before).expect("not_before");
    builder.set_not_after(&not_after).expect("not_after");

    let subject_pkey = PKey::from_ec_key(subject_key.clone()).expect("subject pkey");
    builder.set_pubkey(&subject_pkey).expect("pubkey");

    let signer_pkey = PKey::from_ec_key(signer_key.clone()).expect("signer pkey");
    builder
        .sign(&signer_pkey, MessageDigest::sha384())
        .expect("cert sign");

    builder.build()
}
