//! Full-protocol test: a scripted host drives the enclave state machine
//! over in-memory channels, then validates the shipped artifact set the way
//! an external verifier would — from the manifest and the two attestations
//! alone.

use std::collections::VecDeque;
use std::path::Path;

use ceremony_common::attestation::AttestationVerifier;
use ceremony_common::beacon::mock::MockChain;
use ceremony_common::beacon::{round_at, Scheme};
use ceremony_common::manifest::{Manifest, SHIP_ORDER};
use ceremony_common::ptau::{blake2b_hex, PtauDescriptor};
use ceremony_common::tools::groth16::Groth16Backend;
use ceremony_common::tools::mock::{synthetic_r1cs, MockCircuitCompiler, MockGroth16, MockSolidityCompiler};
use ceremony_common::transport::{
    finish_batch, send_files, FileReceiver, PeerChannel, TransportError,
};
use ceremony_enclave::mock::MockCliIssuer;
use ceremony_enclave::{EnclaveCeremony, EnclaveConfig};
use sha2::{Digest, Sha256};
use tokio::io::DuplexStream;

const TIMESTAMP_MS: u64 = 1_700_000_000_000;

/// Channel whose batch connections are handed out from pre-built pipes.
struct ScriptedLink {
    accepts: VecDeque<DuplexStream>,
    connects: VecDeque<DuplexStream>,
}

#[async_trait::async_trait]
impl PeerChannel for ScriptedLink {
    type Io = DuplexStream;

    async fn accept(&mut self) -> Result<Self::Io, TransportError> {
        self.accepts
            .pop_front()
            .ok_or_else(|| TransportError::Io("no scripted accept left".to_string()))
    }

    async fn connect(&mut self) -> Result<Self::Io, TransportError> {
        self.connects
            .pop_front()
            .ok_or_else(|| TransportError::Io("no scripted connect left".to_string()))
    }
}

struct Fixture {
    issuer: MockCliIssuer,
    chain: MockChain,
    catalog: &'static [PtauDescriptor],
    enclave_dir: tempfile::TempDir,
    host_dir: tempfile::TempDir,
    rng_dir: tempfile::TempDir,
}

impl Fixture {
    async fn new(ptau_digest_matches: bool) -> Self {
        let enclave_dir = tempfile::tempdir().unwrap();
        let host_dir = tempfile::tempdir().unwrap();
        let rng_dir = tempfile::tempdir().unwrap();
        std::fs::write(rng_dir.path().join("rng_current"), "nsm-hwrng\n").unwrap();

        // Host-side inputs: circuit source, parameters, initial key.
        let circuit = host_dir.path().join("circuit.circom");
        let ptau = host_dir.path().join("powersOfTau.ptau");
        let zkey0 = host_dir.path().join("circuit_0000.zkey");
        std::fs::write(&circuit, "template Main() { signal input a; }").unwrap();
        std::fs::write(&ptau, b"powers of tau transcript bytes").unwrap();
        let host_r1cs = host_dir.path().join("circuit.r1cs");
        std::fs::write(&host_r1cs, synthetic_r1cs(1_000)).unwrap();
        MockGroth16::new()
            .new_zkey(&host_r1cs, &ptau, &zkey0)
            .await
            .unwrap();
        std::fs::remove_file(&host_r1cs).unwrap();

        let digest = if ptau_digest_matches {
            blake2b_hex(&std::fs::read(&ptau).unwrap())
        } else {
            "00".repeat(64)
        };
        let catalog: &'static [PtauDescriptor] = Box::leak(Box::new([PtauDescriptor {
            power: 10,
            max_constraints: 1 << 10,
            blake2b_hex: Box::leak(digest.into_boxed_str()),
            url: "https://hermez.s3-eu-west-1.amazonaws.com/powersOfTau28_hez_final_10.ptau",
        }]));

        Self {
            issuer: MockCliIssuer::with_timestamp(TIMESTAMP_MS),
            chain: MockChain::generate(Scheme::UnchainedG2),
            catalog,
            enclave_dir,
            host_dir,
            rng_dir,
        }
    }

    fn config(&self) -> EnclaveConfig {
        EnclaveConfig {
            workdir: self.enclave_dir.path().to_path_buf(),
            chain: self.chain.info().clone(),
            catalog: self.catalog,
            root_cert_der: self.issuer.root_der().to_vec(),
            rng_current_path: self.rng_dir.path().join("rng_current"),
            ..EnclaveConfig::default()
        }
    }

    fn ceremony(
        self,
    ) -> (
        EnclaveCeremony<MockCircuitCompiler, MockGroth16, MockSolidityCompiler, MockCliIssuer>,
        MockChain,
        tempfile::TempDir,
        tempfile::TempDir,
        tempfile::TempDir,
    ) {
        let config = self.config();
        let ceremony = EnclaveCeremony::new(
            config,
            MockCircuitCompiler::new(1_000),
            MockGroth16::new(),
            MockSolidityCompiler,
            self.issuer,
        );
        (
            ceremony,
            self.chain,
            self.enclave_dir,
            self.host_dir,
            self.rng_dir,
        )
    }
}

fn input_batch(host_dir: &Path) -> Vec<(String, std::path::PathBuf)> {
    ["circuit.circom", "powersOfTau.ptau", "circuit_0000.zkey"]
        .iter()
        .map(|name| (name.to_string(), host_dir.join(name)))
        .collect()
}

#[tokio::test]
async fn full_ceremony_produces_a_verifiable_artifact_set() {
    let fixture = Fixture::new(true).await;
    let root_der = fixture.issuer.root_der().to_vec();
    let (mut ceremony, chain, _enclave_dir, host_dir, _rng_dir) = fixture.ceremony();

    let (inputs_tx, inputs_rx) = tokio::io::duplex(64 * 1024);
    let (att_tx, att_rx) = tokio::io::duplex(64 * 1024);
    let (beacon_tx, beacon_rx) = tokio::io::duplex(64 * 1024);
    let (artifacts_tx, artifacts_rx) = tokio::io::duplex(64 * 1024);

    let mut link = ScriptedLink {
        accepts: VecDeque::from([inputs_rx, beacon_rx]),
        connects: VecDeque::from([att_tx, artifacts_tx]),
    };

    let enclave = tokio::spawn(async move { ceremony.run(&mut link).await });

    // --- host script ---
    let host_path = host_dir.path().to_path_buf();

    // 1. Ship the three inputs.
    let mut inputs_tx = inputs_tx;
    send_files(&mut inputs_tx, &input_batch(&host_path))
        .await
        .unwrap();
    drop(inputs_tx);

    // 2. Receive the time-attestation.
    let mut receiver = FileReceiver::new(att_rx);
    let att_file = receiver.receive_one(&host_path).await.unwrap();
    assert_eq!(att_file.name, "time-attestation.cbor");
    drop(receiver);

    // 3. The enclave derives its round from the sealed timestamp; emit the
    // matching beacon.
    let expected_round = round_at(chain.info(), TIMESTAMP_MS + 90_000);
    assert_eq!(expected_round, 3_485_635);
    let beacon_path = host_path.join("drand-beacon.json");
    std::fs::write(&beacon_path, chain.emit_json(expected_round)).unwrap();
    let mut beacon_tx = beacon_tx;
    send_files(
        &mut beacon_tx,
        &[("drand-beacon.json".to_string(), beacon_path)],
    )
    .await
    .unwrap();
    drop(beacon_tx);

    // 4. Receive the nine final artifacts, in order.
    let mut receiver = FileReceiver::new(artifacts_rx);
    let artifacts = receiver
        .receive_all(&host_path, SHIP_ORDER.len())
        .await
        .unwrap();
    drop(receiver);

    enclave.await.unwrap().unwrap();

    let names: Vec<&str> = artifacts.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, SHIP_ORDER.to_vec());

    // --- offline verification, the way an external verifier would ---

    // The manifest re-derives byte-for-byte from the artifact set.
    let manifest = Manifest::from_workdir(&host_path).unwrap();
    let manifest_text = std::fs::read_to_string(host_path.join("manifest.txt")).unwrap();
    assert_eq!(manifest.render(), manifest_text);

    // The final attestation chains to the root and commits to the manifest.
    let verifier = AttestationVerifier::with_root_der(root_der);
    let final_att = std::fs::read(host_path.join("final-attestation.cbor")).unwrap();
    let doc = verifier
        .verify_expecting(
            &final_att,
            &manifest.final_attestation_nonce(),
            Some(&manifest.hash_of_hashes()),
        )
        .unwrap();
    assert_eq!(doc.timestamp_ms, TIMESTAMP_MS);

    // The time attestation commits to the intermediate key by hash; its
    // nonce must differ from the final nonce.
    let time_att = std::fs::read(host_path.join("time-attestation.cbor")).unwrap();
    let time_doc = verifier.verify(&time_att).unwrap();
    assert_ne!(
        time_doc.nonce.as_deref().unwrap(),
        &manifest.final_attestation_nonce()[..]
    );
    assert!(time_doc.user_data.is_none());

    // The shipped beacon is the exact bytes the host sent and the committed
    // digest matches.
    let beacon_bytes = std::fs::read(host_path.join("drand-beacon.json")).unwrap();
    let beacon_digest = hex::encode(Sha256::digest(&beacon_bytes));
    let committed = manifest
        .entries()
        .iter()
        .find(|(path, _)| path == "drand-beacon.json")
        .map(|(_, digest)| digest.clone())
        .unwrap();
    assert_eq!(committed, beacon_digest);
}

#[tokio::test]
async fn mismatched_ptau_digest_aborts_before_contribution() {
    let fixture = Fixture::new(false).await;
    let (mut ceremony, _chain, enclave_dir, host_dir, _rng_dir) = fixture.ceremony();

    let (inputs_tx, inputs_rx) = tokio::io::duplex(64 * 1024);
    let mut link = ScriptedLink {
        accepts: VecDeque::from([inputs_rx]),
        connects: VecDeque::new(),
    };

    let enclave = tokio::spawn(async move { ceremony.run(&mut link).await });

    let mut inputs_tx = inputs_tx;
    send_files(&mut inputs_tx, &input_batch(host_dir.path()))
        .await
        .unwrap();
    drop(inputs_tx);

    let err = enclave.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ceremony_common::CeremonyError::Ptau(_)
    ));
    // The ceremony died before any contribution existed.
    assert!(!enclave_dir.path().join("circuit_0001.zkey").exists());
    assert!(!enclave_dir.path().join("final-attestation.cbor").exists());
}

#[tokio::test]
async fn wrong_round_beacon_is_fatal() {
    let fixture = Fixture::new(true).await;
    let (mut ceremony, chain, enclave_dir, host_dir, _rng_dir) = fixture.ceremony();

    let (inputs_tx, inputs_rx) = tokio::io::duplex(64 * 1024);
    let (att_tx, att_rx) = tokio::io::duplex(64 * 1024);
    let (beacon_tx, beacon_rx) = tokio::io::duplex(64 * 1024);

    let mut link = ScriptedLink {
        accepts: VecDeque::from([inputs_rx, beacon_rx]),
        connects: VecDeque::from([att_tx]),
    };

    let enclave = tokio::spawn(async move { ceremony.run(&mut link).await });

    let host_path = host_dir.path().to_path_buf();
    let mut inputs_tx = inputs_tx;
    send_files(&mut inputs_tx, &input_batch(&host_path))
        .await
        .unwrap();
    drop(inputs_tx);

    let mut receiver = FileReceiver::new(att_rx);
    receiver.receive_one(&host_path).await.unwrap();
    drop(receiver);

    // One round early: a beacon the enclave's timestamp does not bind.
    let expected_round = round_at(chain.info(), TIMESTAMP_MS + 90_000);
    let beacon_path = host_path.join("drand-beacon.json");
    std::fs::write(&beacon_path, chain.emit_json(expected_round - 1)).unwrap();
    let mut beacon_tx = beacon_tx;
    send_files(
        &mut beacon_tx,
        &[("drand-beacon.json".to_string(), beacon_path)],
    )
    .await
    .unwrap();
    drop(beacon_tx);

    let err = enclave.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ceremony_common::CeremonyError::Beacon(
            ceremony_common::BeaconError::WrongRound { .. }
        )
    ));
    assert!(!enclave_dir.path().join("final-attestation.cbor").exists());
}

/// finish_batch on the enclave side needs the host to keep the connection
/// open until its reads complete; the scripted drops above model that. This
/// test pins the sanity of that shutdown dance over a real socket pair.
#[tokio::test]
async fn batch_shutdown_handshake_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("artifact.bin");
    tokio::fs::write(&payload, vec![0x5Au8; 4096]).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let recv_dir = tempfile::tempdir().unwrap();
    let receiver_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut receiver = FileReceiver::new(stream);
        receiver.receive_one(recv_dir.path()).await.unwrap()
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    send_files(
        &mut stream,
        &[("artifact.bin".to_string(), payload)],
    )
    .await
    .unwrap();
    finish_batch(stream).await.unwrap();

    let received = receiver_task.await.unwrap();
    assert_eq!(received.size, 4096);
}
