//! Drivers for the external toolchain the ceremony shells out to: the
//! circuit compiler, the Groth16 library CLI, and the Solidity compiler.
//! Each driver sits behind a trait so tests can substitute mocks.

pub mod circom;
pub mod groth16;
pub mod mock;
pub mod solc;

use tokio::process::Command;

use crate::error::{CeremonyError, Result};

/// Run a tool to completion; non-zero exit is terminal and carries stderr.
pub(crate) async fn run_tool(mut cmd: Command, what: &str) -> Result<Vec<u8>> {
    let output = cmd
        .output()
        .await
        .map_err(|e| CeremonyError::Tool(format!("{} failed to start: {}", what, e)))?;
    if !output.status.success() {
        return Err(CeremonyError::Tool(format!(
            "{} exited with {}: {}",
            what,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}
