use std::path::PathBuf;

use anyhow::{Context, Result};
use ceremony_common::constants::{DRAND_API_BASE, DRAND_CHAIN_HASH};
use ceremony_common::tools::circom::CircomCli;
use ceremony_common::tools::groth16::SnarkjsCli;
use ceremony_host::{DrandHttpClient, HostCeremony, HostConfig, HttpPtauFetcher};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ceremony-host", about = "Untrusted host of the Groth16 setup ceremony")]
struct Args {
    /// Circuit source to run the ceremony for.
    #[arg(long)]
    circuit: PathBuf,

    /// Directory inputs are staged in and artifacts land in.
    #[arg(long, default_value = "ceremony-out")]
    workdir: PathBuf,

    /// CID the enclave was started under.
    #[arg(long, default_value_t = 16)]
    enclave_cid: u32,

    /// Port the enclave listens on.
    #[arg(long, default_value_t = 5000)]
    enclave_port: u32,

    /// Port this host listens on for enclave batches.
    #[arg(long, default_value_t = 5005)]
    listen_port: u32,

    #[arg(long, default_value = "circom")]
    circom: PathBuf,

    #[arg(long, default_value = "snarkjs")]
    snarkjs: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    info!(
        message = "ceremony-host starting",
        event = "startup",
        circuit = %args.circuit.display(),
        workdir = %args.workdir.display()
    );

    let config = HostConfig {
        circuit_source: args.circuit,
        workdir: args.workdir,
        enclave_cid: args.enclave_cid,
        enclave_port: args.enclave_port,
        listen_port: args.listen_port,
        circom_binary: args.circom,
        snarkjs_binary: args.snarkjs,
        ..HostConfig::default()
    };

    let compiler = CircomCli::new(&config.circom_binary);
    let groth16 = SnarkjsCli::new(&config.snarkjs_binary);
    let beacons = DrandHttpClient::new(DRAND_API_BASE, DRAND_CHAIN_HASH)
        .context("cannot build beacon client")?;
    let parameters = HttpPtauFetcher::new().context("cannot build parameter fetcher")?;

    let enclave_cid = config.enclave_cid;
    let enclave_port = config.enclave_port;
    let listen_port = config.listen_port;
    let mut ceremony = HostCeremony::new(config, compiler, groth16, beacons, parameters);

    #[cfg(feature = "production")]
    {
        let mut link =
            ceremony_host::vsock::VsockPeerChannel::bind(listen_port, enclave_cid, enclave_port)
                .context("cannot bind VSOCK listener")?;
        ceremony.run(&mut link).await.context("ceremony failed")?;
    }

    #[cfg(not(feature = "production"))]
    {
        use ceremony_common::transport::TcpPeerChannel;
        let _ = enclave_cid;
        let mut link = TcpPeerChannel::bind(
            &format!("127.0.0.1:{}", listen_port),
            &format!("127.0.0.1:{}", enclave_port),
        )
        .await
        .context("cannot bind TCP listener")?;
        ceremony.run(&mut link).await.context("ceremony failed")?;
    }

    Ok(())
}
