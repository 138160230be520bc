//! Hardware RNG gate.
//!
//! The enclave refuses to produce any key material unless the kernel's
//! active hwrng source is the one the TEE platform attests. This runs
//! before the first byte of entropy is drawn.

use std::path::Path;

use ceremony_common::error::{CeremonyError, Result};
use tracing::info;

pub fn check_rng_source(rng_current_path: &Path, expected: &str) -> Result<()> {
    let current = std::fs::read_to_string(rng_current_path).map_err(|e| {
        CeremonyError::RngGate(format!(
            "cannot read {}: {}",
            rng_current_path.display(),
            e
        ))
    })?;
    let current = current.trim();
    if current != expected {
        return Err(CeremonyError::RngGate(format!(
            "hardware RNG source is {:?}, expected {:?}",
            current, expected
        )));
    }
    info!(
        message = "hardware RNG gate passed",
        event = "rng_gate",
        source = current
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_expected_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rng_current");
        std::fs::write(&path, "nsm-hwrng\n").unwrap();
        assert!(check_rng_source(&path, "nsm-hwrng").is_ok());
    }

    #[test]
    fn rejects_a_foreign_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rng_current");
        std::fs::write(&path, "virtio_rng.0\n").unwrap();
        assert!(matches!(
            check_rng_source(&path, "nsm-hwrng"),
            Err(CeremonyError::RngGate(_))
        ));
    }

    #[test]
    fn rejects_a_missing_report() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_rng_source(&dir.path().join("absent"), "nsm-hwrng").is_err());
    }
}
