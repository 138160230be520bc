//! Both real state machines, end to end, over TCP loopback with mock
//! external tools. The host drives timing off the mock issuer's timestamp;
//! the enclave re-verifies everything and ships the committed artifact set.

use ceremony_common::attestation::AttestationVerifier;
use ceremony_common::beacon::mock::MockChain;
use ceremony_common::beacon::Scheme;
use ceremony_common::manifest::Manifest;
use ceremony_common::ptau::{blake2b_hex, PtauDescriptor};
use ceremony_common::tools::mock::{MockCircuitCompiler, MockGroth16, MockSolidityCompiler};
use ceremony_common::transport::TcpPeerChannel;
use ceremony_enclave::mock::MockCliIssuer;
use ceremony_enclave::{EnclaveCeremony, EnclaveConfig};
use ceremony_host::mock::{MockBeaconSource, MockParameterSource};
use ceremony_host::{HostCeremony, HostConfig, PcrExpectations};
use sha2::Digest;

const TIMESTAMP_MS: u64 = 1_700_000_000_000;

fn leaked_catalog(ptau_bytes: &[u8]) -> &'static [PtauDescriptor] {
    Box::leak(Box::new([PtauDescriptor {
        power: 10,
        max_constraints: 1 << 10,
        blake2b_hex: Box::leak(blake2b_hex(ptau_bytes).into_boxed_str()),
        url: "https://hermez.s3-eu-west-1.amazonaws.com/powersOfTau28_hez_final_10.ptau",
    }]))
}

#[tokio::test]
async fn two_peer_ceremony_over_tcp_loopback() {
    let enclave_dir = tempfile::tempdir().unwrap();
    let host_dir = tempfile::tempdir().unwrap();
    let fixture_dir = tempfile::tempdir().unwrap();

    // Shared fixtures.
    let rng_path = fixture_dir.path().join("rng_current");
    std::fs::write(&rng_path, "nsm-hwrng\n").unwrap();
    let circuit_source = fixture_dir.path().join("circuit.circom");
    std::fs::write(&circuit_source, "template Main() { signal input a; }").unwrap();
    let ptau_fixture = fixture_dir.path().join("fixture.ptau");
    let ptau_bytes = b"powers of tau transcript bytes".to_vec();
    std::fs::write(&ptau_fixture, &ptau_bytes).unwrap();

    let catalog = leaked_catalog(&ptau_bytes);
    let issuer = MockCliIssuer::with_timestamp(TIMESTAMP_MS);
    let root_der = issuer.root_der().to_vec();
    let chain = MockChain::generate(Scheme::UnchainedG2);
    let chain_info = chain.info().clone();

    // Ephemeral loopback ports for both listeners.
    let enclave_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let enclave_addr = enclave_listener.local_addr().unwrap().to_string();
    let host_addr = host_listener.local_addr().unwrap().to_string();

    let enclave_config = EnclaveConfig {
        workdir: enclave_dir.path().to_path_buf(),
        chain: chain_info.clone(),
        catalog,
        root_cert_der: root_der.clone(),
        rng_current_path: rng_path,
        ..EnclaveConfig::default()
    };
    let mut enclave = EnclaveCeremony::new(
        enclave_config,
        MockCircuitCompiler::new(1_000),
        MockGroth16::new(),
        MockSolidityCompiler,
        issuer,
    );
    let enclave_task = tokio::spawn(async move {
        let mut link = TcpPeerChannel::from_listener(enclave_listener, &host_addr);
        enclave.run(&mut link).await
    });

    let host_config = HostConfig {
        circuit_source,
        workdir: host_dir.path().to_path_buf(),
        chain: chain_info,
        catalog,
        // The mock issuer fills PCR i with (i + 1) bytes; pin them the way
        // a deployment pins published measurements.
        pcr_expectations: Some(PcrExpectations {
            pcr0: hex::encode([1u8; 48]),
            pcr1: hex::encode([2u8; 48]),
            pcr2: hex::encode([3u8; 48]),
        }),
        ..HostConfig::default()
    };
    let mut host = HostCeremony::new(
        host_config,
        MockCircuitCompiler::new(1_000),
        MockGroth16::new(),
        MockBeaconSource::new(chain),
        MockParameterSource::new(&ptau_fixture),
    );
    let host_task = tokio::spawn(async move {
        let mut link = TcpPeerChannel::from_listener(host_listener, &enclave_addr);
        host.run(&mut link).await
    });

    let (enclave_result, host_result) = tokio::join!(enclave_task, host_task);
    enclave_result.unwrap().unwrap();
    host_result.unwrap().unwrap();

    // The host-side output set is self-contained: the manifest re-derives
    // from the artifacts, and the final attestation seals it.
    let manifest = Manifest::from_workdir(host_dir.path()).unwrap();
    let manifest_text = std::fs::read_to_string(host_dir.path().join("manifest.txt")).unwrap();
    assert_eq!(manifest.render(), manifest_text);

    let verifier = AttestationVerifier::with_root_der(root_der);
    let final_att = std::fs::read(host_dir.path().join("final-attestation.cbor")).unwrap();
    verifier
        .verify_expecting(
            &final_att,
            &manifest.final_attestation_nonce(),
            Some(&manifest.hash_of_hashes()),
        )
        .unwrap();

    // Both peers hold identical committed artifacts.
    for (name, digest) in manifest.entries() {
        let enclave_copy = enclave_dir.path().join(name);
        // The intermediate key is gone, but committed artifacts remain.
        let bytes = std::fs::read(&enclave_copy).unwrap();
        assert_eq!(
            hex::encode(sha2::Sha256::digest(&bytes)),
            *digest,
            "artifact {} diverged between peers",
            name
        );
    }
    assert!(!enclave_dir.path().join("circuit_0001.zkey").exists());
}
