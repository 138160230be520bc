//! Contribution entropy with deterministic zeroization.
//!
//! The 32 random bytes exist exactly long enough to be handed to the
//! Groth16 contribution, and are overwritten on every exit path, panic
//! included, via the drop guard.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

pub struct ContributionEntropy {
    bytes: Zeroizing<[u8; 32]>,
}

impl ContributionEntropy {
    /// Draw 32 bytes from the operating-system RNG. The hardware RNG gate
    /// must have passed before this is called.
    pub fn draw() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *bytes);
        Self { bytes }
    }

    /// Lowercase hex rendering, itself zeroized on release.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.bytes[..]))
    }
}
