//! Mock randomness chain for tests: a throwaway secret per scheme, with
//! beacons signed exactly the way the network signs them.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::UniformRand;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::bls;
use super::{beacon_message, Beacon, ChainInfo, Scheme};

enum SecretKey {
    Bls(ark_bls12_381::Fr),
    Bn254(ark_bn254::Fr),
}

pub struct MockChain {
    scheme: Scheme,
    secret: SecretKey,
    info: ChainInfo,
}

impl MockChain {
    pub fn generate(scheme: Scheme) -> Self {
        Self::with_timing(scheme, 1_595_431_050, 30)
    }

    /// Mock chain with explicit genesis/period (for timing-sensitive tests).
    pub fn with_timing(scheme: Scheme, genesis_time: u64, period: u64) -> Self {
        let secret = match scheme {
            Scheme::Bn254G1 => SecretKey::Bn254(ark_bn254::Fr::rand(&mut OsRng)),
            _ => SecretKey::Bls(ark_bls12_381::Fr::rand(&mut OsRng)),
        };

        let public_key = match (&secret, scheme) {
            (SecretKey::Bls(x), Scheme::ChainedG2 | Scheme::UnchainedG2) => {
                let pk = (ark_bls12_381::G1Affine::generator() * *x).into_affine();
                bls::g1_to_compressed(&pk)
            }
            (SecretKey::Bls(x), _) => {
                let pk = (ark_bls12_381::G2Affine::generator() * *x).into_affine();
                bls::g2_to_compressed(&pk)
            }
            (SecretKey::Bn254(x), _) => {
                let pk = (ark_bn254::G2Affine::generator() * *x).into_affine();
                bls::bn_g2_to_bytes(&pk)
            }
        };

        let info = ChainInfo {
            public_key: hex::encode(public_key),
            period,
            genesis_time,
            hash: hex::encode(Sha256::digest(b"mock-chain")),
            group_hash: hex::encode(Sha256::digest(b"mock-group")),
            scheme_id: scheme.id().to_string(),
        };

        Self {
            scheme,
            secret,
            info,
        }
    }

    pub fn info(&self) -> &ChainInfo {
        &self.info
    }

    /// Sign and emit the beacon for `round`.
    pub fn emit(&self, round: u64) -> Beacon {
        let previous_signature = if self.scheme.is_chained() {
            Some(hex::encode(previous_signature_bytes(round)))
        } else {
            None
        };

        let shell = Beacon {
            round,
            signature: String::new(),
            randomness: String::new(),
            previous_signature: previous_signature.clone(),
        };
        let message = beacon_message(self.scheme, &shell).expect("mock message");

        let signature = match (&self.secret, self.scheme) {
            (SecretKey::Bls(x), Scheme::ChainedG2 | Scheme::UnchainedG2) => {
                let hm = bls::hash_to_g2(&message, bls::DST_G2).expect("hash to G2");
                bls::g2_to_compressed(&(hm * *x).into_affine())
            }
            (SecretKey::Bls(x), Scheme::SwappedG1) => {
                let hm = bls::hash_to_g1(&message, bls::DST_G2).expect("hash to G1");
                bls::g1_to_compressed(&(hm * *x).into_affine())
            }
            (SecretKey::Bls(x), _) => {
                let hm = bls::hash_to_g1(&message, bls::DST_G1).expect("hash to G1");
                bls::g1_to_compressed(&(hm * *x).into_affine())
            }
            (SecretKey::Bn254(x), _) => {
                let hm = bls::hash_to_bn254_g1(&message).expect("hash to BN254 G1");
                bls::bn_g1_to_bytes(&(hm * *x).into_affine())
            }
        };

        Beacon {
            round,
            randomness: hex::encode(Sha256::digest(&signature)),
            signature: hex::encode(signature),
            previous_signature,
        }
    }

    /// Emit the beacon serialized as oracle JSON bytes.
    pub fn emit_json(&self, round: u64) -> Vec<u8> {
        serde_json::to_vec(&self.emit(round)).expect("beacon JSON")
    }
}

/// Deterministic stand-in for the previous round's signature; the chained
/// message construction only needs stable bytes to bind.
fn previous_signature_bytes(round: u64) -> Vec<u8> {
    let seed = Sha256::digest(round.wrapping_sub(1).to_be_bytes());
    let mut out = Vec::with_capacity(96);
    for i in 0u8..3 {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update([i]);
        out.extend_from_slice(&hasher.finalize());
    }
    out
}
