//! drand HTTP oracle client.
//!
//! The host fetches one beacon per ceremony. The byte string returned by
//! the oracle is canonical: it is forwarded to the enclave exactly as
//! received, and parsing happens only for the local pre-flight check.

use std::time::Duration;

use async_trait::async_trait;
use ceremony_common::error::{CeremonyError, Result};

/// Where beacons come from. Tests substitute a local signer.
#[async_trait]
pub trait BeaconSource: Send + Sync {
    /// Fetch the raw JSON bytes for `round`.
    async fn fetch_round(&self, round: u64) -> Result<Vec<u8>>;
}

pub struct DrandHttpClient {
    base: String,
    chain_hash: String,
    client: reqwest::Client,
}

impl DrandHttpClient {
    pub fn new(base: impl Into<String>, chain_hash: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CeremonyError::Configuration(format!("http client: {}", e)))?;
        Ok(Self {
            base: base.into(),
            chain_hash: chain_hash.into(),
            client,
        })
    }
}

#[async_trait]
impl BeaconSource for DrandHttpClient {
    async fn fetch_round(&self, round: u64) -> Result<Vec<u8>> {
        let url = format!("{}/{}/public/{}", self.base, self.chain_hash, round);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CeremonyError::Beacon(ceremony_common::BeaconError::Json(format!(
                "beacon fetch failed: {}",
                e
            ))))?;
        let response = response.error_for_status().map_err(|e| {
            CeremonyError::Beacon(ceremony_common::BeaconError::Json(format!(
                "beacon oracle rejected the request: {}",
                e
            )))
        })?;
        let bytes = response.bytes().await.map_err(|e| {
            CeremonyError::Beacon(ceremony_common::BeaconError::Json(format!(
                "beacon body read failed: {}",
                e
            )))
        })?;
        Ok(bytes.to_vec())
    }
}
