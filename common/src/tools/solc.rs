use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use tokio::process::Command;

use crate::error::{CeremonyError, Result};

/// Deterministic compilation outputs for the exported verifier contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledVerifier {
    /// Creation (deploy) bytecode, lowercase hex.
    pub creation_hex: String,
    /// keccak-256 of the runtime bytecode, lowercase hex.
    pub runtime_keccak_hex: String,
}

#[async_trait]
pub trait SolidityCompiler: Send + Sync {
    async fn compile_verifier(&self, source: &Path) -> Result<CompiledVerifier>;
}

/// solc with metadata hashing disabled so the output depends only on the
/// source text and compiler version.
pub struct SolcCli {
    binary: PathBuf,
}

impl SolcCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SolcCli {
    fn default() -> Self {
        Self::new("solc")
    }
}

#[derive(Deserialize)]
struct CombinedJson {
    contracts: std::collections::BTreeMap<String, ContractOutput>,
}

#[derive(Deserialize)]
struct ContractOutput {
    bin: String,
    #[serde(rename = "bin-runtime")]
    bin_runtime: String,
}

#[async_trait]
impl SolidityCompiler for SolcCli {
    async fn compile_verifier(&self, source: &Path) -> Result<CompiledVerifier> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--optimize")
            .arg("--metadata-hash")
            .arg("none")
            .arg("--combined-json")
            .arg("bin,bin-runtime")
            .arg(source);
        let stdout = super::run_tool(cmd, "solc").await?;

        let parsed: CombinedJson = serde_json::from_slice(&stdout)
            .map_err(|e| CeremonyError::Tool(format!("solc output is not JSON: {}", e)))?;

        // The exported source holds a single verifier contract; prefer it by
        // name if solc ever reports more than one unit.
        let contract = parsed
            .contracts
            .iter()
            .find(|(key, _)| key.ends_with("Verifier"))
            .map(|(_, c)| c)
            .or_else(|| parsed.contracts.values().next())
            .ok_or_else(|| CeremonyError::Tool("solc emitted no contracts".to_string()))?;

        if contract.bin.is_empty() || contract.bin_runtime.is_empty() {
            return Err(CeremonyError::Tool(
                "solc emitted empty bytecode".to_string(),
            ));
        }

        let runtime_bytes = hex::decode(&contract.bin_runtime)
            .map_err(|e| CeremonyError::Tool(format!("solc runtime bytecode is not hex: {}", e)))?;

        Ok(CompiledVerifier {
            creation_hex: contract.bin.to_lowercase(),
            runtime_keccak_hex: hex::encode(Keccak256::digest(&runtime_bytes)),
        })
    }
}
