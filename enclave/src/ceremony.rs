//! Enclave-side ceremony state machine.
//!
//! Strictly sequential, no back-edges: every phase either completes or the
//! process dies without a final attestation, which is the only evidence
//! external verifiers accept. The phases and their order are the security
//! argument — the time-attestation seals the contribution before the beacon
//! round it determines has been emitted, and the final attestation commits
//! to every artifact through the manifest.

use std::path::PathBuf;

use ceremony_common::attestation::AttestationVerifier;
use ceremony_common::beacon::{self, Beacon};
use ceremony_common::constants::{
    BEACON_DELAY_MS, BEACON_ITERATIONS, BEACON_NAME, CONTRIBUTION_NAME,
};
use ceremony_common::error::{CeremonyError, Result};
use ceremony_common::manifest::{
    Manifest, BEACON_FILE_NAME, FINAL_ATTESTATION_FILE_NAME, MANIFEST_FILE_NAME, SHIP_ORDER,
    TIME_ATTESTATION_FILE_NAME,
};
use ceremony_common::tools::circom::CircuitCompiler;
use ceremony_common::tools::groth16::Groth16Backend;
use ceremony_common::tools::solc::SolidityCompiler;
use ceremony_common::transport::{finish_batch, send_files, FileReceiver, PeerChannel};
use ceremony_common::{ptau, r1cs};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::config::EnclaveConfig;
use crate::issuer::AttestationIssuer;
use crate::rng_gate;
use crate::secret::ContributionEntropy;

/// Files the host must deliver, in order.
const INPUT_ORDER: [&str; 3] = ["circuit.circom", "powersOfTau.ptau", "circuit_0000.zkey"];

const INITIAL_ZKEY: &str = "circuit_0000.zkey";
const INTERMEDIATE_ZKEY: &str = "circuit_0001.zkey";
const FINAL_ZKEY: &str = "circuit_final.zkey";

pub struct EnclaveCeremony<C, G, S, I> {
    config: EnclaveConfig,
    compiler: C,
    groth16: G,
    solidity: S,
    issuer: I,
    verifier: AttestationVerifier,

    expected_round: Option<u64>,
    beacon_randomness: Option<String>,
}

impl<C, G, S, I> EnclaveCeremony<C, G, S, I>
where
    C: CircuitCompiler,
    G: Groth16Backend,
    S: SolidityCompiler,
    I: AttestationIssuer,
{
    pub fn new(config: EnclaveConfig, compiler: C, groth16: G, solidity: S, issuer: I) -> Self {
        let verifier = AttestationVerifier::with_root_der(config.root_cert_der.clone());
        Self {
            config,
            compiler,
            groth16,
            solidity,
            issuer,
            verifier,
            expected_round: None,
            beacon_randomness: None,
        }
    }

    /// Drive the full ceremony over `link`. Any error is terminal.
    pub async fn run<P: PeerChannel>(&mut self, link: &mut P) -> Result<()> {
        self.phase("RNG_CHECK");
        rng_gate::check_rng_source(
            &self.config.rng_current_path,
            &self.config.expected_rng_source,
        )?;

        self.phase("AWAIT_INPUTS");
        let inputs = link.accept().await?;
        self.receive_inputs(inputs).await?;

        self.phase("COMPILE");
        self.compile_circuit().await?;

        self.phase("PTAU_CHECK");
        self.check_ptau().await?;

        self.phase("VERIFY_INITIAL");
        self.verify_zkey(INITIAL_ZKEY).await?;

        self.phase("CONTRIBUTE");
        self.contribute().await?;

        self.phase("VERIFY_INTERMEDIATE");
        self.verify_zkey(INTERMEDIATE_ZKEY).await?;

        self.phase("TIME_ATTESTATION");
        self.time_attestation().await?;

        self.phase("SHIP_ATTESTATION");
        let conn = link.connect().await?;
        self.ship_time_attestation(conn).await?;

        self.phase("AWAIT_BEACON");
        let conn = link.accept().await?;
        self.receive_beacon(conn).await?;

        self.phase("VERIFY_BEACON");
        self.verify_beacon().await?;

        self.phase("APPLY_BEACON");
        self.apply_beacon().await?;

        self.phase("VERIFY_FINAL");
        self.verify_zkey(FINAL_ZKEY).await?;

        self.phase("EXPORT_VERIFIER");
        self.export_verifier().await?;

        self.phase("COMMIT");
        let manifest = self.commit().await?;

        self.phase("FINAL_ATTESTATION");
        self.final_attestation(&manifest).await?;

        self.phase("SHIP_ARTIFACTS");
        let conn = link.connect().await?;
        self.ship_artifacts(conn).await?;

        info!(message = "ceremony complete", event = "done");
        Ok(())
    }

    /// Receive exactly the three input files, in order, under their
    /// expected names.
    pub async fn receive_inputs<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut receiver = FileReceiver::new(reader);
        let received = receiver
            .receive_all(&self.config.workdir, INPUT_ORDER.len())
            .await?;
        for (file, expected) in received.iter().zip(INPUT_ORDER) {
            if file.name != expected {
                return Err(CeremonyError::Protocol(format!(
                    "expected input {}, received {}",
                    expected, file.name
                )));
            }
        }
        Ok(())
    }

    async fn compile_circuit(&self) -> Result<()> {
        let source = self.path("circuit.circom");
        let outputs = self
            .compiler
            .compile(&source, &self.config.workdir)
            .await?;
        // Normalize tool output locations to the committed artifact names.
        if outputs.r1cs != self.path("circuit.r1cs") {
            tokio::fs::copy(&outputs.r1cs, self.path("circuit.r1cs")).await?;
        }
        tokio::fs::copy(&outputs.wasm, self.path("circuit.wasm")).await?;
        Ok(())
    }

    /// Derive the required power from the compiled constraints and insist
    /// the received parameters are byte-for-byte the cataloged file.
    async fn check_ptau(&self) -> Result<()> {
        let info = r1cs::read_info(&self.path("circuit.r1cs"))?;
        let power = ptau::required_power(info.n_constraints as u64)?;
        let descriptor = self
            .config
            .catalog
            .iter()
            .find(|d| d.power == power)
            .ok_or_else(|| {
                CeremonyError::Ptau(format!("no catalog entry for power {}", power))
            })?;
        ptau::verify_file_digest(&self.path("powersOfTau.ptau"), descriptor)?;
        info!(
            message = "powers-of-tau verified",
            event = "ptau_check",
            constraints = info.n_constraints,
            power = power
        );
        Ok(())
    }

    async fn verify_zkey(&self, zkey: &str) -> Result<()> {
        self.groth16
            .verify_zkey(
                &self.path("circuit.r1cs"),
                &self.path("powersOfTau.ptau"),
                &self.path(zkey),
            )
            .await
    }

    /// Draw the secret, contribute, and let the drop guards zeroize both the
    /// bytes and the hex rendering on every exit path.
    async fn contribute(&self) -> Result<()> {
        let entropy = ContributionEntropy::draw();
        let entropy_hex = entropy.to_hex();
        self.groth16
            .contribute(
                &self.path(INITIAL_ZKEY),
                &self.path(INTERMEDIATE_ZKEY),
                CONTRIBUTION_NAME,
                &entropy_hex,
            )
            .await
    }

    /// Seal SHA-256 of the intermediate key into an attestation nonce, then
    /// locally re-verify what the issuer produced before trusting its
    /// timestamp.
    async fn time_attestation(&mut self) -> Result<()> {
        let zkey_bytes = tokio::fs::read(self.path(INTERMEDIATE_ZKEY)).await?;
        let nonce: [u8; 32] = Sha256::digest(&zkey_bytes).into();

        let raw = self.issuer.issue(Some(&nonce), None).await?;
        let doc = self.verifier.verify_expecting(&raw, &nonce, None)?;

        tokio::fs::write(self.path(TIME_ATTESTATION_FILE_NAME), &raw).await?;
        self.expected_round = Some(beacon::round_at(
            &self.config.chain,
            doc.timestamp_ms + BEACON_DELAY_MS,
        ));
        info!(
            message = "time attestation sealed",
            event = "time_attestation",
            timestamp_ms = doc.timestamp_ms,
            expected_round = self.expected_round.unwrap_or(0)
        );
        Ok(())
    }

    async fn ship_time_attestation<Io>(&self, mut conn: Io) -> Result<()>
    where
        Io: AsyncRead + AsyncWrite + Unpin + Send,
    {
        send_files(
            &mut conn,
            &[(
                TIME_ATTESTATION_FILE_NAME.to_string(),
                self.path(TIME_ATTESTATION_FILE_NAME),
            )],
        )
        .await?;
        finish_batch(conn).await?;
        Ok(())
    }

    async fn receive_beacon<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut receiver = FileReceiver::new(reader);
        let file = receiver.receive_one(&self.config.workdir).await?;
        if file.name != BEACON_FILE_NAME {
            return Err(CeremonyError::Protocol(format!(
                "expected {}, received {}",
                BEACON_FILE_NAME, file.name
            )));
        }
        Ok(())
    }

    /// Check the beacon against the round derived from the sealed
    /// timestamp, under the pinned chain. The canonical representation is
    /// the byte string received from the oracle.
    async fn verify_beacon(&mut self) -> Result<()> {
        let round = self
            .expected_round
            .ok_or_else(|| CeremonyError::Protocol("no sealed timestamp".to_string()))?;
        let bytes = tokio::fs::read(self.path(BEACON_FILE_NAME)).await?;
        let parsed = Beacon::from_json_bytes(&bytes)?;
        beacon::verify_beacon_at(&self.config.chain, &parsed, round)?;
        info!(
            message = "beacon verified",
            event = "beacon_verified",
            round = parsed.round,
            randomness = %parsed.randomness
        );
        self.beacon_randomness = Some(parsed.randomness);
        Ok(())
    }

    async fn apply_beacon(&self) -> Result<()> {
        let randomness = self
            .beacon_randomness
            .as_deref()
            .ok_or_else(|| CeremonyError::Protocol("no verified beacon".to_string()))?;
        self.groth16
            .apply_beacon(
                &self.path(INTERMEDIATE_ZKEY),
                &self.path(FINAL_ZKEY),
                randomness,
                BEACON_ITERATIONS,
                BEACON_NAME,
            )
            .await?;
        // The intermediate key has served its purpose; nothing secret
        // remains in it, but there is no reason to ship it either.
        let _ = tokio::fs::remove_file(self.path(INTERMEDIATE_ZKEY)).await;
        Ok(())
    }

    async fn export_verifier(&self) -> Result<()> {
        self.groth16
            .export_verifier(&self.path(FINAL_ZKEY), &self.path("verifier.sol"))
            .await?;
        let compiled = self
            .solidity
            .compile_verifier(&self.path("verifier.sol"))
            .await?;
        tokio::fs::write(self.path("verifier_creation.hex"), &compiled.creation_hex).await?;
        tokio::fs::write(
            self.path("verifier_runtime_keccak.hex"),
            &compiled.runtime_keccak_hex,
        )
        .await?;
        Ok(())
    }

    async fn commit(&self) -> Result<Manifest> {
        let manifest = Manifest::from_workdir(&self.config.workdir)?;
        tokio::fs::write(self.path(MANIFEST_FILE_NAME), manifest.render()).await?;
        info!(
            message = "artifacts committed",
            event = "commit",
            nonce = %hex::encode(manifest.final_attestation_nonce()),
            hash_of_hashes = %hex::encode(manifest.hash_of_hashes())
        );
        Ok(manifest)
    }

    async fn final_attestation(&self, manifest: &Manifest) -> Result<()> {
        let nonce = manifest.final_attestation_nonce();
        let hash_of_hashes = manifest.hash_of_hashes();
        let raw = self
            .issuer
            .issue(Some(&nonce), Some(&hash_of_hashes))
            .await?;
        self.verifier
            .verify_expecting(&raw, &nonce, Some(&hash_of_hashes))?;
        tokio::fs::write(self.path(FINAL_ATTESTATION_FILE_NAME), &raw).await?;
        Ok(())
    }

    async fn ship_artifacts<Io>(&self, mut conn: Io) -> Result<()>
    where
        Io: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let batch: Vec<(String, PathBuf)> = SHIP_ORDER
            .iter()
            .map(|name| (name.to_string(), self.path(name)))
            .collect();
        send_files(&mut conn, &batch).await?;
        finish_batch(conn).await?;
        Ok(())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.config.workdir.join(name)
    }

    fn phase(&self, name: &str) {
        info!(message = "entering phase", event = "phase", phase = name);
    }
}
