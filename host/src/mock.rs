//! Mock oracle and parameter sources for tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ceremony_common::beacon::mock::MockChain;
use ceremony_common::error::Result;
use ceremony_common::ptau::{self, PtauDescriptor};

use crate::beacon_client::BeaconSource;
use crate::ptau_fetch::ParameterSource;

/// Beacon oracle backed by a locally generated chain key.
pub struct MockBeaconSource {
    chain: MockChain,
}

impl MockBeaconSource {
    pub fn new(chain: MockChain) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl BeaconSource for MockBeaconSource {
    async fn fetch_round(&self, round: u64) -> Result<Vec<u8>> {
        Ok(self.chain.emit_json(round))
    }
}

/// Parameter source that copies a local fixture instead of downloading,
/// then verifies the digest exactly like the HTTP fetcher.
pub struct MockParameterSource {
    fixture: PathBuf,
}

impl MockParameterSource {
    pub fn new(fixture: impl Into<PathBuf>) -> Self {
        Self {
            fixture: fixture.into(),
        }
    }
}

#[async_trait]
impl ParameterSource for MockParameterSource {
    async fn fetch(&self, descriptor: &PtauDescriptor, dest: &Path) -> Result<()> {
        tokio::fs::copy(&self.fixture, dest).await?;
        ptau::verify_file_digest(dest, descriptor)
    }
}
