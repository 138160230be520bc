//! Client for the attestation issuer CLI.
//!
//! The issuer is a small tool talking to the platform security module. Its
//! contract: two optional positional hex arguments (nonce, then user_data,
//! empty string meaning absent), the raw CBOR document on stdout, errors on
//! stderr with a non-zero exit.

use std::path::PathBuf;

use async_trait::async_trait;
use ceremony_common::error::{CeremonyError, Result};
use tokio::process::Command;

#[async_trait]
pub trait AttestationIssuer: Send + Sync {
    async fn issue(&self, nonce: Option<&[u8]>, user_data: Option<&[u8]>) -> Result<Vec<u8>>;
}

pub struct NsmCliIssuer {
    binary: PathBuf,
}

impl NsmCliIssuer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl AttestationIssuer for NsmCliIssuer {
    async fn issue(&self, nonce: Option<&[u8]>, user_data: Option<&[u8]>) -> Result<Vec<u8>> {
        let nonce_hex = nonce.map(hex::encode).unwrap_or_default();
        let user_data_hex = user_data.map(hex::encode).unwrap_or_default();

        let output = Command::new(&self.binary)
            .arg(nonce_hex)
            .arg(user_data_hex)
            .output()
            .await
            .map_err(|e| {
                CeremonyError::Tool(format!(
                    "attestation issuer {} failed to start: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(CeremonyError::Tool(format!(
                "attestation issuer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CeremonyError::Tool(
                "attestation issuer produced no document".to_string(),
            ));
        }
        Ok(output.stdout)
    }
}
