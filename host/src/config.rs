use std::path::PathBuf;

use ceremony_common::beacon::ChainInfo;
use ceremony_common::constants;
use ceremony_common::ptau::{self, PtauDescriptor};

/// Host-side PCR expectations, compared against the time-attestation as a
/// pre-flight when configured. The enclave's own checks remain
/// authoritative; this only fails the run early on a wrong image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrExpectations {
    pub pcr0: String,
    pub pcr1: String,
    pub pcr2: String,
}

pub struct HostConfig {
    /// Circuit source the ceremony is run for.
    pub circuit_source: PathBuf,
    /// Directory inputs are staged in and artifacts land in.
    pub workdir: PathBuf,
    /// CID the enclave was started under.
    pub enclave_cid: u32,
    /// Port the enclave listens on.
    pub enclave_port: u32,
    /// Port this host listens on for enclave batches.
    pub listen_port: u32,

    pub snarkjs_binary: PathBuf,
    pub circom_binary: PathBuf,

    /// Chain used for the pre-flight beacon verification and timing.
    pub chain: ChainInfo,
    pub catalog: &'static [PtauDescriptor],
    /// Seconds past `round_time(R)` before the oracle is polled.
    pub beacon_grace_secs: u64,
    /// Optional published measurements to compare PCR0–2 against.
    pub pcr_expectations: Option<PcrExpectations>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            circuit_source: PathBuf::from("circuit.circom"),
            workdir: PathBuf::from("ceremony-out"),
            enclave_cid: 16,
            enclave_port: 5000,
            listen_port: 5005,
            snarkjs_binary: PathBuf::from("snarkjs"),
            circom_binary: PathBuf::from("circom"),
            chain: constants::pinned_chain(),
            catalog: &ptau::CATALOG,
            beacon_grace_secs: constants::BEACON_PUBLISH_GRACE_SECS,
            pcr_expectations: None,
        }
    }
}
