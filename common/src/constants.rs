//! Pinned ceremony constants.
//!
//! Everything here is compiled in and never fetched at runtime: the TEE
//! vendor root certificate, the drand chain the deployment is locked to,
//! and the timing parameters that bind the beacon round to the sealed
//! time-attestation.

use crate::beacon::ChainInfo;

/// DER bytes of the pinned TEE vendor root certificate (Nitro root G1).
pub const NITRO_ROOT_CA_DER: &[u8] = include_bytes!("attestation/nitro_root_g1.der");

/// Hardware RNG source the enclave must be wired to before any secret is drawn.
pub const EXPECTED_RNG_SOURCE: &str = "nsm-hwrng";

/// Where the kernel reports the active hwrng source.
pub const RNG_CURRENT_PATH: &str = "/sys/class/misc/hw_random/rng_current";

/// Offset added to the time-attestation timestamp before deriving the
/// beacon round. The round must not have been emitted when the enclave
/// sealed its contribution.
pub const BEACON_DELAY_MS: u64 = 90_000;

/// Grace period after `round_time(R)` before the host polls the oracle.
pub const BEACON_PUBLISH_GRACE_SECS: u64 = 10;

/// Iteration count passed to the Groth16 beacon application.
pub const BEACON_ITERATIONS: u32 = 10;

/// drand mainnet ("default") chain parameters.
pub const DRAND_CHAIN_HASH: &str =
    "8990e7a9aaed2ffed73dbd7092123d6f289930540d7651336225dc172e51b2ce";
pub const DRAND_PUBLIC_KEY: &str =
    "868f005eb8e6e4ca0a47c8a77ceaa5309a47978a7c71bc5cce96366b5d7a569937c529eeda66c7293784a9402801af31";
pub const DRAND_PERIOD_SECS: u64 = 30;
pub const DRAND_GENESIS_TIME: u64 = 1_595_431_050;
pub const DRAND_GROUP_HASH: &str =
    "176f93498eac9ca337150b46d21dd58673ea4e3581185f869672e59fa4cb390a";
pub const DRAND_SCHEME_ID: &str = "pedersen-bls-chained";

/// Base URL of the drand HTTP oracle.
pub const DRAND_API_BASE: &str = "https://api.drand.sh";

/// The chain info every beacon in the deployed ceremony is verified against.
pub fn pinned_chain() -> ChainInfo {
    ChainInfo {
        public_key: DRAND_PUBLIC_KEY.to_string(),
        period: DRAND_PERIOD_SECS,
        genesis_time: DRAND_GENESIS_TIME,
        hash: DRAND_CHAIN_HASH.to_string(),
        group_hash: DRAND_GROUP_HASH.to_string(),
        scheme_id: DRAND_SCHEME_ID.to_string(),
    }
}

/// Labels baked into the zkey transcript.
pub const CONTRIBUTION_NAME: &str = "Enclave contribution";
pub const BEACON_NAME: &str = "Final beacon";
