pub mod attestation;
pub mod beacon;
pub mod constants;
pub mod error;
pub mod manifest;
pub mod ptau;
pub mod r1cs;
pub mod tools;
pub mod transport;

// Re-export the types both peers handle constantly.
pub use attestation::{AttestationDoc, AttestationError, AttestationVerifier};
pub use beacon::{round_at, round_time, Beacon, BeaconError, ChainInfo, Scheme};
pub use error::{CeremonyError, Result};
pub use manifest::Manifest;
pub use transport::{FileReceiver, FrameHeader, ReceivedFile, TransportError};

/// Version information for the common crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current UNIX time in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_plausible() {
        // Well past 2020, i.e. the clock is not zeroed.
        assert!(current_timestamp_ms() > 1_577_836_800_000);
    }
}
