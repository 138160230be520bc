use std::path::PathBuf;

use anyhow::{Context, Result};
use ceremony_common::tools::circom::CircomCli;
use ceremony_common::tools::groth16::SnarkjsCli;
use ceremony_common::tools::solc::SolcCli;
use ceremony_enclave::{EnclaveCeremony, EnclaveConfig, NsmCliIssuer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ceremony-enclave", about = "TEE peer of the Groth16 setup ceremony")]
struct Args {
    /// Working directory all artifacts are produced into.
    #[arg(long, default_value = "/ceremony")]
    workdir: PathBuf,

    /// Port this enclave listens on for host batches.
    #[arg(long, default_value_t = 5000)]
    listen_port: u32,

    /// CID of the parent instance.
    #[arg(long, default_value_t = 3)]
    host_cid: u32,

    /// Port the host listens on for enclave batches.
    #[arg(long, default_value_t = 5005)]
    host_port: u32,

    /// Attestation issuer binary.
    #[arg(long, default_value = "/app/get-attestation")]
    issuer: PathBuf,

    #[arg(long, default_value = "circom")]
    circom: PathBuf,

    #[arg(long, default_value = "snarkjs")]
    snarkjs: PathBuf,

    #[arg(long, default_value = "solc")]
    solc: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    info!(
        message = "ceremony-enclave starting",
        event = "startup",
        workdir = %args.workdir.display(),
        listen_port = args.listen_port,
        host_port = args.host_port
    );

    tokio::fs::create_dir_all(&args.workdir)
        .await
        .context("cannot create working directory")?;

    let config = EnclaveConfig {
        workdir: args.workdir,
        listen_port: args.listen_port,
        host_cid: args.host_cid,
        host_port: args.host_port,
        issuer_binary: args.issuer,
        circom_binary: args.circom,
        snarkjs_binary: args.snarkjs,
        solc_binary: args.solc,
        ..EnclaveConfig::default()
    };

    let compiler = CircomCli::new(&config.circom_binary);
    let groth16 = SnarkjsCli::new(&config.snarkjs_binary);
    let solidity = SolcCli::new(&config.solc_binary);
    let issuer = NsmCliIssuer::new(&config.issuer_binary);
    let mut ceremony = EnclaveCeremony::new(config, compiler, groth16, solidity, issuer);

    #[cfg(feature = "production")]
    {
        let mut link = ceremony_enclave::vsock::VsockPeerChannel::bind(
            args.listen_port,
            args.host_cid,
            args.host_port,
        )
        .context("cannot bind VSOCK listener")?;
        ceremony
            .run(&mut link)
            .await
            .context("ceremony failed")?;
    }

    #[cfg(not(feature = "production"))]
    {
        use ceremony_common::transport::TcpPeerChannel;
        let mut link = TcpPeerChannel::bind(
            &format!("127.0.0.1:{}", args.listen_port),
            &format!("127.0.0.1:{}", args.host_port),
        )
        .await
        .context("cannot bind TCP listener")?;
        ceremony
            .run(&mut link)
            .await
            .context("ceremony failed")?;
    }

    Ok(())
}
