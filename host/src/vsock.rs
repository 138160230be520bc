//! VSOCK peer channel for the production host.

use async_trait::async_trait;
use ceremony_common::transport::{PeerChannel, TransportError};
use tokio_vsock::{VsockListener, VsockStream};
use tracing::info;

const VMADDR_CID_ANY: u32 = 0xFFFF_FFFF;

pub struct VsockPeerChannel {
    listener: VsockListener,
    enclave_cid: u32,
    enclave_port: u32,
}

impl VsockPeerChannel {
    pub fn bind(
        listen_port: u32,
        enclave_cid: u32,
        enclave_port: u32,
    ) -> Result<Self, TransportError> {
        let listener = VsockListener::bind(VMADDR_CID_ANY, listen_port)?;
        info!(
            message = "listening",
            event = "listen",
            transport = "vsock",
            port = listen_port
        );
        Ok(Self {
            listener,
            enclave_cid,
            enclave_port,
        })
    }
}

#[async_trait]
impl PeerChannel for VsockPeerChannel {
    type Io = VsockStream;

    async fn accept(&mut self) -> Result<Self::Io, TransportError> {
        let (stream, addr) = self.listener.accept().await?;
        info!(
            message = "accepted connection",
            event = "accept",
            transport = "vsock",
            cid = addr.cid()
        );
        Ok(stream)
    }

    async fn connect(&mut self) -> Result<Self::Io, TransportError> {
        let mut last_err = None;
        for _ in 0..40 {
            match VsockStream::connect(self.enclave_cid, self.enclave_port).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                }
            }
        }
        Err(TransportError::Io(format!(
            "cannot reach enclave at cid {} port {}: {}",
            self.enclave_cid,
            self.enclave_port,
            last_err.expect("at least one attempt")
        )))
    }
}
