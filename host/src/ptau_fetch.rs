//! Powers-of-tau acquisition.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ceremony_common::error::{CeremonyError, Result};
use ceremony_common::ptau::{self, PtauDescriptor};
use tracing::info;

/// Where parameter files come from. Tests substitute a local fixture.
#[async_trait]
pub trait ParameterSource: Send + Sync {
    /// Place the descriptor's file at `dest` and verify its digest.
    async fn fetch(&self, descriptor: &PtauDescriptor, dest: &Path) -> Result<()>;
}

pub struct HttpPtauFetcher {
    client: reqwest::Client,
}

impl HttpPtauFetcher {
    pub fn new() -> Result<Self> {
        // Parameter files run to gigabytes; the timeout covers a slow but
        // live mirror, anything else fails loud.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3600))
            .build()
            .map_err(|e| CeremonyError::Configuration(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ParameterSource for HttpPtauFetcher {
    async fn fetch(&self, descriptor: &PtauDescriptor, dest: &Path) -> Result<()> {
        info!(
            message = "fetching powers of tau",
            event = "ptau_fetch",
            power = descriptor.power,
            url = descriptor.url
        );
        let response = self
            .client
            .get(descriptor.url)
            .send()
            .await
            .map_err(|e| CeremonyError::Ptau(format!("fetch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| CeremonyError::Ptau(format!("mirror rejected the request: {}", e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CeremonyError::Ptau(format!("body read failed: {}", e)))?;
        tokio::fs::write(dest, &bytes).await?;

        ptau::verify_file_digest(dest, descriptor)
    }
}
