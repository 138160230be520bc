//! Host-side ceremony orchestrator.
//!
//! Nothing here is security-critical: every check the host performs is a
//! pre-flight that fails the run early, and the enclave re-verifies
//! authoritatively. What the host does own is beacon timing — deriving the
//! round from the sealed attestation timestamp and sleeping until the
//! network has emitted it.

use std::path::PathBuf;
use std::time::Duration;

use ceremony_common::attestation::{parse_document, AttestationDoc};
use ceremony_common::beacon::{self, Beacon};
use ceremony_common::constants::BEACON_DELAY_MS;
use ceremony_common::current_timestamp_ms;
use ceremony_common::error::{CeremonyError, Result};
use ceremony_common::manifest::{BEACON_FILE_NAME, SHIP_ORDER, TIME_ATTESTATION_FILE_NAME};
use ceremony_common::tools::circom::CircuitCompiler;
use ceremony_common::tools::groth16::Groth16Backend;
use ceremony_common::transport::{finish_batch, send_files, FileReceiver, PeerChannel};
use ceremony_common::{ptau, r1cs};
use tracing::info;

use crate::beacon_client::BeaconSource;
use crate::config::HostConfig;
use crate::ptau_fetch::ParameterSource;

const INPUT_ORDER: [&str; 3] = ["circuit.circom", "powersOfTau.ptau", "circuit_0000.zkey"];

pub struct HostCeremony<C, G, B, P> {
    config: HostConfig,
    compiler: C,
    groth16: G,
    beacons: B,
    parameters: P,
}

impl<C, G, B, P> HostCeremony<C, G, B, P>
where
    C: CircuitCompiler,
    G: Groth16Backend,
    B: BeaconSource,
    P: ParameterSource,
{
    pub fn new(config: HostConfig, compiler: C, groth16: G, beacons: B, parameters: P) -> Self {
        Self {
            config,
            compiler,
            groth16,
            beacons,
            parameters,
        }
    }

    pub async fn run<L: PeerChannel>(&mut self, link: &mut L) -> Result<()> {
        self.prepare_inputs().await?;

        info!(message = "shipping inputs", event = "ship_inputs");
        let mut conn = link.connect().await?;
        let batch: Vec<(String, PathBuf)> = INPUT_ORDER
            .iter()
            .map(|name| (name.to_string(), self.path(name)))
            .collect();
        send_files(&mut conn, &batch).await?;
        finish_batch(conn).await?;

        info!(message = "awaiting time attestation", event = "await_attestation");
        let conn = link.accept().await?;
        let mut receiver = FileReceiver::new(conn);
        let received = receiver.receive_one(&self.config.workdir).await?;
        if received.name != TIME_ATTESTATION_FILE_NAME {
            return Err(CeremonyError::Protocol(format!(
                "expected {}, received {}",
                TIME_ATTESTATION_FILE_NAME, received.name
            )));
        }
        drop(receiver);

        let raw = tokio::fs::read(self.path(TIME_ATTESTATION_FILE_NAME)).await?;
        let doc = parse_document(&raw)?;
        self.check_pcrs(&doc)?;

        let round = beacon::round_at(&self.config.chain, doc.timestamp_ms + BEACON_DELAY_MS);
        info!(
            message = "beacon round derived",
            event = "round_derived",
            timestamp_ms = doc.timestamp_ms,
            round = round
        );
        self.wait_for_round(round).await;

        let bytes = self.beacons.fetch_round(round).await?;
        // Pre-flight verification; the enclave repeats it authoritatively.
        let parsed = Beacon::from_json_bytes(&bytes)?;
        beacon::verify_beacon_at(&self.config.chain, &parsed, round)?;
        tokio::fs::write(self.path(BEACON_FILE_NAME), &bytes).await?;

        info!(message = "forwarding beacon", event = "ship_beacon", round = round);
        let mut conn = link.connect().await?;
        send_files(
            &mut conn,
            &[(BEACON_FILE_NAME.to_string(), self.path(BEACON_FILE_NAME))],
        )
        .await?;
        finish_batch(conn).await?;

        info!(message = "awaiting artifacts", event = "await_artifacts");
        let conn = link.accept().await?;
        let mut receiver = FileReceiver::new(conn);
        let artifacts = receiver
            .receive_all(&self.config.workdir, SHIP_ORDER.len())
            .await?;
        for (file, expected) in artifacts.iter().zip(SHIP_ORDER) {
            if file.name != expected {
                return Err(CeremonyError::Protocol(format!(
                    "expected artifact {}, received {}",
                    expected, file.name
                )));
            }
        }

        info!(
            message = "ceremony artifacts received",
            event = "done",
            count = artifacts.len()
        );
        Ok(())
    }

    /// Compile, pick parameters, fetch and pre-verify them, and build the
    /// unsafe initial key.
    async fn prepare_inputs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.workdir).await?;
        let staged_source = self.path("circuit.circom");
        if self.config.circuit_source != staged_source {
            tokio::fs::copy(&self.config.circuit_source, &staged_source).await?;
        }

        let outputs = self
            .compiler
            .compile(&staged_source, &self.config.workdir)
            .await?;
        let info = r1cs::read_info(&outputs.r1cs)?;
        let power = ptau::required_power(info.n_constraints as u64)?;
        let descriptor = self
            .config
            .catalog
            .iter()
            .find(|d| d.power == power)
            .ok_or_else(|| {
                CeremonyError::Ptau(format!("no catalog entry for power {}", power))
            })?;
        info!(
            message = "parameters selected",
            event = "ptau_selected",
            constraints = info.n_constraints,
            power = power,
            url = descriptor.url
        );

        self.parameters
            .fetch(descriptor, &self.path("powersOfTau.ptau"))
            .await?;

        self.groth16
            .new_zkey(
                &outputs.r1cs,
                &self.path("powersOfTau.ptau"),
                &self.path("circuit_0000.zkey"),
            )
            .await?;

        // The staged r1cs must carry the committed name for shipping.
        if outputs.r1cs != self.path("circuit.r1cs") {
            tokio::fs::copy(&outputs.r1cs, self.path("circuit.r1cs")).await?;
        }
        Ok(())
    }

    fn check_pcrs(&self, doc: &AttestationDoc) -> Result<()> {
        let Some(expected) = &self.config.pcr_expectations else {
            return Ok(());
        };
        for (index, want) in [(0u8, &expected.pcr0), (1, &expected.pcr1), (2, &expected.pcr2)] {
            let got = doc
                .pcrs
                .get(&index)
                .map(hex::encode)
                .unwrap_or_default();
            if got != *want {
                return Err(CeremonyError::Protocol(format!(
                    "PCR{} mismatch: expected {}, attested {}",
                    index, want, got
                )));
            }
        }
        info!(message = "PCR pre-flight passed", event = "pcr_check");
        Ok(())
    }

    /// Sleep until the derived round has been emitted and published.
    async fn wait_for_round(&self, round: u64) {
        let available_at =
            beacon::round_time(&self.config.chain, round) + self.config.beacon_grace_secs;
        let now = current_timestamp_ms() / 1000;
        if available_at > now {
            let wait = available_at - now;
            info!(
                message = "waiting for beacon round",
                event = "beacon_wait",
                round = round,
                seconds = wait
            );
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.config.workdir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PcrExpectations;
    use crate::mock::{MockBeaconSource, MockParameterSource};
    use ceremony_common::beacon::mock::MockChain;
    use ceremony_common::beacon::Scheme;
    use ceremony_common::tools::mock::{MockCircuitCompiler, MockGroth16};

    fn host_under_test(
        config: HostConfig,
        chain: MockChain,
        ptau_fixture: std::path::PathBuf,
    ) -> HostCeremony<MockCircuitCompiler, MockGroth16, MockBeaconSource, MockParameterSource>
    {
        HostCeremony::new(
            config,
            MockCircuitCompiler::new(1_000),
            MockGroth16::new(),
            MockBeaconSource::new(chain),
            MockParameterSource::new(ptau_fixture),
        )
    }

    #[test]
    fn pcr_preflight_compares_published_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let chain = MockChain::generate(Scheme::UnchainedG2);
        let ptau = dir.path().join("fixture.ptau");
        std::fs::write(&ptau, b"params").unwrap();

        let mut config = HostConfig {
            workdir: dir.path().to_path_buf(),
            chain: chain.info().clone(),
            ..HostConfig::default()
        };
        // The mock issuer fills PCR i with (i + 1) bytes.
        config.pcr_expectations = Some(PcrExpectations {
            pcr0: hex::encode([1u8; 48]),
            pcr1: hex::encode([2u8; 48]),
            pcr2: hex::encode([3u8; 48]),
        });

        let issuer = ceremony_common::attestation::mock::MockIssuer::generate();
        let raw = issuer.issue(Some(&[9u8; 32]), None);
        let doc = parse_document(&raw).unwrap();

        let chain2 = MockChain::generate(Scheme::UnchainedG2);
        let host = host_under_test(config, chain2, ptau.clone());
        assert!(host.check_pcrs(&doc).is_ok());

        let mut wrong = host;
        wrong.config.pcr_expectations = Some(PcrExpectations {
            pcr0: hex::encode([0xAAu8; 48]),
            pcr1: hex::encode([2u8; 48]),
            pcr2: hex::encode([3u8; 48]),
        });
        assert!(matches!(
            wrong.check_pcrs(&doc),
            Err(CeremonyError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn wait_for_round_returns_immediately_for_past_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let chain = MockChain::generate(Scheme::UnchainedG2);
        let ptau = dir.path().join("fixture.ptau");
        std::fs::write(&ptau, b"params").unwrap();

        let config = HostConfig {
            workdir: dir.path().to_path_buf(),
            chain: chain.info().clone(),
            ..HostConfig::default()
        };
        let chain2 = MockChain::generate(Scheme::UnchainedG2);
        let host = host_under_test(config, chain2, ptau);

        let start = std::time::Instant::now();
        host.wait_for_round(1).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
