use std::path::PathBuf;

use ceremony_common::beacon::ChainInfo;
use ceremony_common::constants;
use ceremony_common::ptau::{self, PtauDescriptor};

/// Everything the enclave state machine needs, owned explicitly. The
/// defaults are the pinned production constants; tests override the chain,
/// root and RNG gate with their own fixtures.
pub struct EnclaveConfig {
    /// Directory every artifact is produced into.
    pub workdir: PathBuf,
    /// Port the enclave listens on for host batches.
    pub listen_port: u32,
    /// VSOCK CID of the host (the parent instance).
    pub host_cid: u32,
    /// Port the host listens on for enclave batches.
    pub host_port: u32,

    pub issuer_binary: PathBuf,
    pub circom_binary: PathBuf,
    pub snarkjs_binary: PathBuf,
    pub solc_binary: PathBuf,

    /// Chain all beacons are verified against.
    pub chain: ChainInfo,
    /// Powers-of-tau table the received parameters must match.
    pub catalog: &'static [PtauDescriptor],
    /// DER of the attestation root of trust.
    pub root_cert_der: Vec<u8>,
    /// Identifier the hardware RNG gate requires.
    pub expected_rng_source: String,
    /// Where the kernel reports the active hwrng source.
    pub rng_current_path: PathBuf,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("/ceremony"),
            listen_port: 5000,
            host_cid: 3,
            host_port: 5005,
            issuer_binary: PathBuf::from("/app/get-attestation"),
            circom_binary: PathBuf::from("circom"),
            snarkjs_binary: PathBuf::from("snarkjs"),
            solc_binary: PathBuf::from("solc"),
            chain: constants::pinned_chain(),
            catalog: &ptau::CATALOG,
            root_cert_der: constants::NITRO_ROOT_CA_DER.to_vec(),
            expected_rng_source: constants::EXPECTED_RNG_SOURCE.to_string(),
            rng_current_path: PathBuf::from(constants::RNG_CURRENT_PATH),
        }
    }
}
