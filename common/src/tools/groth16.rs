use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Result;

/// The opaque Groth16 library, as exercised by the ceremony.
#[async_trait]
pub trait Groth16Backend: Send + Sync {
    /// Build the (unsafe) initial proving key from constraints + parameters.
    async fn new_zkey(&self, r1cs: &Path, ptau: &Path, out_zkey: &Path) -> Result<()>;

    /// Add one participant's contribution. `entropy_hex` is consumed exactly
    /// once; the caller owns its zeroization.
    async fn contribute(
        &self,
        in_zkey: &Path,
        out_zkey: &Path,
        name: &str,
        entropy_hex: &str,
    ) -> Result<()>;

    /// Finalize the key with the public randomness beacon.
    async fn apply_beacon(
        &self,
        in_zkey: &Path,
        out_zkey: &Path,
        beacon_hex: &str,
        iterations: u32,
        name: &str,
    ) -> Result<()>;

    /// Full key verification against constraints + parameters.
    async fn verify_zkey(&self, r1cs: &Path, ptau: &Path, zkey: &Path) -> Result<()>;

    /// Emit the Solidity verifier source for a finalized key.
    async fn export_verifier(&self, zkey: &Path, out_sol: &Path) -> Result<()>;
}

/// The snarkjs CLI baked into the image.
pub struct SnarkjsCli {
    binary: PathBuf,
}

impl SnarkjsCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }
}

impl Default for SnarkjsCli {
    fn default() -> Self {
        Self::new("snarkjs")
    }
}

#[async_trait]
impl Groth16Backend for SnarkjsCli {
    async fn new_zkey(&self, r1cs: &Path, ptau: &Path, out_zkey: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("groth16")
            .arg("setup")
            .arg(r1cs)
            .arg(ptau)
            .arg(out_zkey);
        super::run_tool(cmd, "snarkjs groth16 setup").await?;
        Ok(())
    }

    async fn contribute(
        &self,
        in_zkey: &Path,
        out_zkey: &Path,
        name: &str,
        entropy_hex: &str,
    ) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("zkey")
            .arg("contribute")
            .arg(in_zkey)
            .arg(out_zkey)
            .arg(format!("--name={}", name))
            .arg(format!("-e={}", entropy_hex));
        super::run_tool(cmd, "snarkjs zkey contribute").await?;
        Ok(())
    }

    async fn apply_beacon(
        &self,
        in_zkey: &Path,
        out_zkey: &Path,
        beacon_hex: &str,
        iterations: u32,
        name: &str,
    ) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("zkey")
            .arg("beacon")
            .arg(in_zkey)
            .arg(out_zkey)
            .arg(beacon_hex)
            .arg(iterations.to_string())
            .arg(format!("-n={}", name));
        super::run_tool(cmd, "snarkjs zkey beacon").await?;
        Ok(())
    }

    async fn verify_zkey(&self, r1cs: &Path, ptau: &Path, zkey: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("zkey").arg("verify").arg(r1cs).arg(ptau).arg(zkey);
        super::run_tool(cmd, "snarkjs zkey verify").await?;
        Ok(())
    }

    async fn export_verifier(&self, zkey: &Path, out_sol: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("zkey")
            .arg("export")
            .arg("solidityverifier")
            .arg(zkey)
            .arg(out_sol);
        super::run_tool(cmd, "snarkjs zkey export solidityverifier").await?;
        Ok(())
    }
}
