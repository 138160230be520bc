//! Mock issuer wiring for tests: the common COSE fixture issuer behind the
//! [`AttestationIssuer`] trait, stamping a caller-chosen timestamp.

use async_trait::async_trait;
use ceremony_common::attestation::mock::MockIssuer;
use ceremony_common::error::Result;

use crate::issuer::AttestationIssuer;

pub struct MockCliIssuer {
    inner: MockIssuer,
}

impl MockCliIssuer {
    pub fn new() -> Self {
        Self {
            inner: MockIssuer::generate(),
        }
    }

    pub fn with_timestamp(timestamp_ms: u64) -> Self {
        Self {
            inner: MockIssuer::generate().with_timestamp(timestamp_ms),
        }
    }

    /// Root to pin the verifier under test against.
    pub fn root_der(&self) -> &[u8] {
        self.inner.root_der()
    }
}

impl Default for MockCliIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttestationIssuer for MockCliIssuer {
    async fn issue(&self, nonce: Option<&[u8]>, user_data: Option<&[u8]>) -> Result<Vec<u8>> {
        Ok(self.inner.issue(nonce, user_data))
    }
}
