use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::{CeremonyError, Result};

/// Outputs of a circuit compilation.
#[derive(Debug, Clone)]
pub struct CompiledCircuit {
    pub r1cs: PathBuf,
    pub wasm: PathBuf,
}

#[async_trait]
pub trait CircuitCompiler: Send + Sync {
    /// Compile `source` into R1CS constraints and a witness-generator wasm
    /// under `out_dir`.
    async fn compile(&self, source: &Path, out_dir: &Path) -> Result<CompiledCircuit>;
}

/// The circom CLI.
pub struct CircomCli {
    binary: PathBuf,
}

impl CircomCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for CircomCli {
    fn default() -> Self {
        Self::new("circom")
    }
}

#[async_trait]
impl CircuitCompiler for CircomCli {
    async fn compile(&self, source: &Path, out_dir: &Path) -> Result<CompiledCircuit> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(source)
            .arg("--r1cs")
            .arg("--wasm")
            .arg("-o")
            .arg(out_dir);
        super::run_tool(cmd, "circom").await?;

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                CeremonyError::Circuit(format!("circuit path has no stem: {}", source.display()))
            })?;
        let r1cs = out_dir.join(format!("{}.r1cs", stem));
        let wasm = out_dir
            .join(format!("{}_js", stem))
            .join(format!("{}.wasm", stem));
        for path in [&r1cs, &wasm] {
            if !path.exists() {
                return Err(CeremonyError::Circuit(format!(
                    "circom did not produce {}",
                    path.display()
                )));
            }
        }

        info!(
            message = "circuit compiled",
            event = "circom_done",
            r1cs = %r1cs.display(),
            wasm = %wasm.display()
        );
        Ok(CompiledCircuit { r1cs, wasm })
    }
}
