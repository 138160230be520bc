//! Mock tool drivers for tests: deterministic outputs, no external binaries.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use super::circom::{CircuitCompiler, CompiledCircuit};
use super::groth16::Groth16Backend;
use super::solc::{CompiledVerifier, SolidityCompiler};
use crate::error::{CeremonyError, Result};

/// Serialize a minimal R1CS container with the given constraint count.
pub fn synthetic_r1cs(n_constraints: u32) -> Vec<u8> {
    let field_size = 32u32;
    let mut header = Vec::new();
    header.extend_from_slice(&field_size.to_le_bytes());
    header.extend_from_slice(&[0u8; 32]);
    header.extend_from_slice(&(n_constraints * 2).to_le_bytes()); // nWires
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&(n_constraints as u64 * 4).to_le_bytes());
    header.extend_from_slice(&n_constraints.to_le_bytes());

    let mut out = Vec::new();
    out.extend_from_slice(b"r1cs");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(header.len() as u64).to_le_bytes());
    out.extend_from_slice(&header);
    out
}

/// Circuit compiler that emits a synthetic R1CS and wasm without circom.
pub struct MockCircuitCompiler {
    pub n_constraints: u32,
}

impl MockCircuitCompiler {
    pub fn new(n_constraints: u32) -> Self {
        Self { n_constraints }
    }
}

#[async_trait]
impl CircuitCompiler for MockCircuitCompiler {
    async fn compile(&self, source: &Path, out_dir: &Path) -> Result<CompiledCircuit> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CeremonyError::Circuit("circuit path has no stem".to_string()))?;
        let r1cs = out_dir.join(format!("{}.r1cs", stem));
        let js_dir = out_dir.join(format!("{}_js", stem));
        let wasm = js_dir.join(format!("{}.wasm", stem));

        tokio::fs::write(&r1cs, synthetic_r1cs(self.n_constraints)).await?;
        tokio::fs::create_dir_all(&js_dir).await?;
        let source_bytes = tokio::fs::read(source).await?;
        tokio::fs::write(&wasm, Sha256::digest(&source_bytes)).await?;
        Ok(CompiledCircuit { r1cs, wasm })
    }
}

/// Groth16 backend that derives each output key deterministically from its
/// inputs, so tests can assert real data flow without the library.
pub struct MockGroth16 {
    fail_verification: bool,
}

impl MockGroth16 {
    pub fn new() -> Self {
        Self {
            fail_verification: false,
        }
    }

    /// Variant whose key verification always fails.
    pub fn with_failing_verification() -> Self {
        Self {
            fail_verification: true,
        }
    }

    async fn derive(&self, tag: &str, inputs: &[&[u8]]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        for input in inputs {
            hasher.update(input);
        }
        let digest = hasher.finalize();
        let mut out = b"zkey".to_vec();
        out.extend_from_slice(&digest);
        out
    }
}

impl Default for MockGroth16 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Groth16Backend for MockGroth16 {
    async fn new_zkey(&self, r1cs: &Path, ptau: &Path, out_zkey: &Path) -> Result<()> {
        let r1cs_bytes = tokio::fs::read(r1cs).await?;
        let ptau_bytes = tokio::fs::read(ptau).await?;
        let key = self.derive("setup", &[&r1cs_bytes, &ptau_bytes]).await;
        tokio::fs::write(out_zkey, key).await?;
        Ok(())
    }

    async fn contribute(
        &self,
        in_zkey: &Path,
        out_zkey: &Path,
        name: &str,
        entropy_hex: &str,
    ) -> Result<()> {
        let input = tokio::fs::read(in_zkey).await?;
        let key = self
            .derive(
                "contribute",
                &[&input, name.as_bytes(), entropy_hex.as_bytes()],
            )
            .await;
        tokio::fs::write(out_zkey, key).await?;
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
        let input = tokio::fs::read(in_zkey).await?;
        let key = self
            .derive(
                "beacon",
                &[
                    &input,
                    beacon_hex.as_bytes(),
                    &iterations.to_be_bytes(),
                    name.as_bytes(),
                ],
            )
            .await;
        tokio::fs::write(out_zkey, key).await?;
        Ok(())
    }

    async fn verify_zkey(&self, _r1cs: &Path, _ptau: &Path, zkey: &Path) -> Result<()> {
        if self.fail_verification {
            return Err(CeremonyError::Tool(
                "zkey verification failed (mock)".to_string(),
            ));
        }
        let bytes = tokio::fs::read(zkey).await?;
        if bytes.starts_with(b"zkey") {
            Ok(())
        } else {
            Err(CeremonyError::Tool(
                "zkey verification failed: unrecognized key".to_string(),
            ))
        }
    }

    async fn export_verifier(&self, zkey: &Path, out_sol: &Path) -> Result<()> {
        let key = tokio::fs::read(zkey).await?;
        let source = format!(
            "// SPDX-License-Identifier: GPL-3.0\npragma solidity ^0.8.0;\ncontract Groth16Verifier {{\n    bytes32 constant KEY_ID = 0x{};\n}}\n",
            hex::encode(Sha256::digest(&key))
        );
        tokio::fs::write(out_sol, source).await?;
        Ok(())
    }
}

/// Solidity compiler mock: bytecode derived from the source text.
pub struct MockSolidityCompiler;

#[async_trait]
impl SolidityCompiler for MockSolidityCompiler {
    async fn compile_verifier(&self, source: &Path) -> Result<CompiledVerifier> {
        let text = tokio::fs::read(source).await?;
        let runtime = Sha256::digest(&text);
        let mut creation = b"\x60\x80\x60\x40".to_vec();
        creation.extend_from_slice(&runtime);
        Ok(CompiledVerifier {
            creation_hex: hex::encode(creation),
            runtime_keccak_hex: hex::encode(Keccak256::digest(runtime)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_groth16_is_deterministic_and_input_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let r1cs = dir.path().join("c.r1cs");
        let ptau = dir.path().join("p.ptau");
        tokio::fs::write(&r1cs, synthetic_r1cs(100)).await.unwrap();
        tokio::fs::write(&ptau, b"params").await.unwrap();

        let backend = MockGroth16::new();
        let zkey_a = dir.path().join("a.zkey");
        let zkey_b = dir.path().join("b.zkey");
        backend.new_zkey(&r1cs, &ptau, &zkey_a).await.unwrap();
        backend.new_zkey(&r1cs, &ptau, &zkey_b).await.unwrap();
        assert_eq!(
            tokio::fs::read(&zkey_a).await.unwrap(),
            tokio::fs::read(&zkey_b).await.unwrap()
        );

        let c1 = dir.path().join("c1.zkey");
        let c2 = dir.path().join("c2.zkey");
        backend
            .contribute(&zkey_a, &c1, "label", "aa")
            .await
            .unwrap();
        backend
            .contribute(&zkey_a, &c2, "label", "bb")
            .await
            .unwrap();
        assert_ne!(
            tokio::fs::read(&c1).await.unwrap(),
            tokio::fs::read(&c2).await.unwrap()
        );

        backend.verify_zkey(&r1cs, &ptau, &c1).await.unwrap();
        assert!(MockGroth16::with_failing_verification()
            .verify_zkey(&r1cs, &ptau, &c1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn mock_compiler_reports_requested_constraints() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("circuit.circom");
        tokio::fs::write(&source, b"template Main(){}").await.unwrap();

        let compiler = MockCircuitCompiler::new(1_000);
        let outputs = compiler.compile(&source, dir.path()).await.unwrap();
        let info = crate::r1cs::read_info(&outputs.r1cs).unwrap();
        assert_eq!(info.n_constraints, 1_000);
        assert!(outputs.wasm.exists());
    }
}
