//! Framed file transport between the two ceremony peers.
//!
//! Connection-per-batch, several files per connection, completion by
//! counting. Wire format per file: `size` (u64 little-endian), `name_len`
//! (u16 little-endian), the UTF-8 name, then the body. Both sides know how
//! many files to expect; there is no end-of-stream marker.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

pub const HEADER_LEN: usize = 10;
/// Exclusive upper bound on a file body.
pub const MAX_FILE_SIZE: u64 = 1_000_000_000_000;
/// Inclusive upper bound on a frame name.
pub const MAX_NAME_LEN: u16 = 4096;

/// How many spurious prefix bytes the receiver tolerates while hunting for
/// a sane header. The VSOCK driver occasionally leaks a few; anything more
/// is a desynchronized peer.
const MAX_HEADER_RESYNC: usize = 64;

const BODY_CHUNK: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Frame header out of bounds: size={size}, name_len={name_len}")]
    HeaderOutOfBounds { size: u64, name_len: u16 },

    #[error("No sane frame header within {0} bytes")]
    HeaderDesync(usize),

    #[error("Frame name is not valid: {0}")]
    InvalidName(String),

    #[error("Peer closed the stream mid-frame")]
    Truncated,

    #[error("I/O failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Truncated
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u64,
    pub name_len: u16,
}

impl FrameHeader {
    pub fn sane(size: u64, name_len: u16) -> bool {
        size > 0 && size < MAX_FILE_SIZE && name_len > 0 && name_len <= MAX_NAME_LEN
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&self.size.to_le_bytes());
        out[8..].copy_from_slice(&self.name_len.to_le_bytes());
        out
    }

    /// Decode a header candidate; `None` when the sanity predicate fails.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Option<Self> {
        let size = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let name_len = u16::from_le_bytes(bytes[8..].try_into().expect("2 bytes"));
        Self::sane(size, name_len).then_some(Self { size, name_len })
    }
}

/// One file landed by the receiver.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: [u8; 32],
}

/// Send `files` over `writer`, each as header + name + body, writing every
/// buffer fully. The caller half-closes the stream after the batch.
pub async fn send_files<W>(
    writer: &mut W,
    files: &[(String, PathBuf)],
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    for (name, path) in files {
        let size = tokio::fs::metadata(path).await?.len();
        let name_bytes = name.as_bytes();
        let name_len = u16::try_from(name_bytes.len())
            .ok()
            .filter(|&len| FrameHeader::sane(size, len))
            .ok_or(TransportError::HeaderOutOfBounds {
                size,
                name_len: name_bytes.len().min(u16::MAX as usize) as u16,
            })?;

        let header = FrameHeader { size, name_len };
        writer.write_all(&header.encode()).await?;
        writer.write_all(name_bytes).await?;

        let mut file = tokio::fs::File::open(path).await?;
        let mut remaining = size;
        let mut buf = vec![0u8; BODY_CHUNK];
        while remaining > 0 {
            let want = remaining.min(BODY_CHUNK as u64) as usize;
            let read = file.read(&mut buf[..want]).await?;
            if read == 0 {
                return Err(TransportError::Truncated);
            }
            writer.write_all(&buf[..read]).await?;
            remaining -= read as u64;
        }

        info!(
            message = "file sent",
            event = "frame_sent",
            name = %name,
            size = size
        );
    }
    writer.flush().await?;
    Ok(())
}

/// Byte-driven receiver half of the framed protocol.
pub struct FileReceiver<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FileReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Receive exactly `expected` files into `dir`.
    pub async fn receive_all(
        &mut self,
        dir: &Path,
        expected: usize,
    ) -> Result<Vec<ReceivedFile>, TransportError> {
        let mut files = Vec::with_capacity(expected);
        for _ in 0..expected {
            files.push(self.receive_one(dir).await?);
        }
        Ok(files)
    }

    /// Receive a single file: HEADER → NAME → BODY.
    pub async fn receive_one(&mut self, dir: &Path) -> Result<ReceivedFile, TransportError> {
        let header = self.read_header().await?;

        let mut name_buf = vec![0u8; header.name_len as usize];
        self.reader.read_exact(&mut name_buf).await?;
        let raw_name = String::from_utf8(name_buf)
            .map_err(|_| TransportError::InvalidName("name is not UTF-8".to_string()))?;
        // Basename semantics: a peer must not steer writes outside `dir`.
        let name = Path::new(&raw_name)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| TransportError::InvalidName(raw_name.clone()))?;

        let path = dir.join(&name);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha256::new();
        let mut remaining = header.size;
        let mut buf = vec![0u8; BODY_CHUNK];
        while remaining > 0 {
            let want = remaining.min(BODY_CHUNK as u64) as usize;
            self.reader.read_exact(&mut buf[..want]).await?;
            hasher.update(&buf[..want]);
            file.write_all(&buf[..want]).await?;
            remaining -= want as u64;
        }
        file.flush().await?;

        let sha256: [u8; 32] = hasher.finalize().into();
        info!(
            message = "file received",
            event = "frame_received",
            name = %name,
            size = header.size,
            sha256 = %hex::encode(sha256)
        );

        Ok(ReceivedFile {
            name,
            path,
            size: header.size,
            sha256,
        })
    }

    /// Read the next header, sliding forward one byte at a time past any
    /// spurious prefix until the sanity predicate holds.
    async fn read_header(&mut self) -> Result<FrameHeader, TransportError> {
        let mut window = [0u8; HEADER_LEN];
        self.reader.read_exact(&mut window).await?;
        for _ in 0..MAX_HEADER_RESYNC {
            if let Some(header) = FrameHeader::decode(&window) {
                return Ok(header);
            }
            window.rotate_left(1);
            self.reader
                .read_exact(&mut window[HEADER_LEN - 1..])
                .await?;
        }
        Err(TransportError::HeaderDesync(MAX_HEADER_RESYNC))
    }
}

/// How a peer opens batch connections to the other side. The sender of a
/// batch always dials; the receiver always accepts.
#[async_trait::async_trait]
pub trait PeerChannel: Send {
    type Io: AsyncRead + AsyncWrite + Unpin + Send;

    /// Wait for the peer to open a batch connection.
    async fn accept(&mut self) -> Result<Self::Io, TransportError>;

    /// Open a batch connection to the peer.
    async fn connect(&mut self) -> Result<Self::Io, TransportError>;
}

/// TCP loopback channel used outside the TEE (mock mode and tests).
pub struct TcpPeerChannel {
    listener: tokio::net::TcpListener,
    peer_addr: String,
}

impl TcpPeerChannel {
    pub async fn bind(listen_addr: &str, peer_addr: &str) -> Result<Self, TransportError> {
        let listener = tokio::net::TcpListener::bind(listen_addr).await?;
        Ok(Self {
            listener,
            peer_addr: peer_addr.to_string(),
        })
    }

    /// Wrap an already-bound listener (tests wire ephemeral ports this way).
    pub fn from_listener(listener: tokio::net::TcpListener, peer_addr: &str) -> Self {
        Self {
            listener,
            peer_addr: peer_addr.to_string(),
        }
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait::async_trait]
impl PeerChannel for TcpPeerChannel {
    type Io = tokio::net::TcpStream;

    async fn accept(&mut self) -> Result<Self::Io, TransportError> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    async fn connect(&mut self) -> Result<Self::Io, TransportError> {
        // The peer may still be booting when the first batch is due; dial
        // with a bounded grace window, then fail loud.
        let mut last_err = None;
        for _ in 0..40 {
            match tokio::net::TcpStream::connect(&self.peer_addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                }
            }
        }
        Err(TransportError::Io(format!(
            "cannot reach peer at {}: {}",
            self.peer_addr,
            last_err.expect("at least one attempt")
        )))
    }
}

/// Half-close the stream after a sent batch and wait for the peer to close.
pub async fn finish_batch<S>(mut stream: S) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.shutdown().await?;
    let mut sink = [0u8; 1024];
    loop {
        match stream.read(&mut sink).await {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            // The peer may already be gone once its reads are done.
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                return Ok(())
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_fixture(dir: &Path, name: &str, body: &[u8]) -> (String, PathBuf) {
        let path = dir.join(name);
        tokio::fs::write(&path, body).await.unwrap();
        (name.to_string(), path)
    }

    #[test]
    fn header_encodes_the_documented_layout() {
        let header = FrameHeader {
            size: 5,
            name_len: 4,
        };
        assert_eq!(
            header.encode(),
            [0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00]
        );
        assert_eq!(FrameHeader::decode(&header.encode()), Some(header));
    }

    #[test]
    fn sanity_predicate_enforces_bounds() {
        assert!(!FrameHeader::sane(0, 1));
        assert!(FrameHeader::sane(1, 1));
        assert!(FrameHeader::sane(MAX_FILE_SIZE - 1, 1));
        assert!(!FrameHeader::sane(MAX_FILE_SIZE, 1));
        assert!(!FrameHeader::sane(1, 0));
        assert!(FrameHeader::sane(1, MAX_NAME_LEN));
        assert!(!FrameHeader::sane(1, MAX_NAME_LEN + 1));
    }

    #[tokio::test]
    async fn round_trips_a_batch_of_files() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let body_a = b"hello".to_vec();
        let body_b = vec![0xA7u8; 200_000];
        let files = vec![
            write_fixture(src.path(), "hi.x", &body_a).await,
            write_fixture(src.path(), "big.bin", &body_b).await,
        ];

        let (mut tx, rx) = tokio::io::duplex(16 * 1024);
        let sender = tokio::spawn(async move {
            send_files(&mut tx, &files).await.unwrap();
        });

        let mut receiver = FileReceiver::new(rx);
        let received = receiver.receive_all(dst.path(), 2).await.unwrap();
        sender.await.unwrap();

        assert_eq!(received[0].name, "hi.x");
        assert_eq!(received[0].size, 5);
        assert_eq!(
            tokio::fs::read(&received[0].path).await.unwrap(),
            body_a
        );
        let expected: [u8; 32] = Sha256::digest(&body_a).into();
        assert_eq!(received[0].sha256, expected);

        assert_eq!(received[1].size, body_b.len() as u64);
        assert_eq!(
            tokio::fs::read(&received[1].path).await.unwrap(),
            body_b
        );
    }

    #[tokio::test]
    async fn resynchronizes_past_spurious_prefix_bytes() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let files = vec![write_fixture(src.path(), "ceremony-artifact.bin", b"payload").await];

        let (mut tx, rx) = tokio::io::duplex(4096);
        let sender = tokio::spawn(async move {
            // A few junk bytes ahead of the first frame. Every misaligned
            // candidate fails the sanity predicate (the name_len bytes land
            // on size zeros or on the 21-char name length shifted up), so
            // the slide recovers the true frame boundary.
            tx.write_all(&[0xFF, 0xFF, 0xFF]).await.unwrap();
            send_files(&mut tx, &files).await.unwrap();
        });

        let mut receiver = FileReceiver::new(rx);
        let received = receiver.receive_one(dst.path()).await.unwrap();
        sender.await.unwrap();
        assert_eq!(received.name, "ceremony-artifact.bin");
        assert_eq!(tokio::fs::read(&received.path).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn aborts_on_peer_disconnect_mid_file() {
        let dst = tempfile::tempdir().unwrap();
        let (mut tx, rx) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let header = FrameHeader {
                size: 1000,
                name_len: 5,
            };
            tx.write_all(&header.encode()).await.unwrap();
            tx.write_all(b"trunc").await.unwrap();
            tx.write_all(&[1, 2, 3]).await.unwrap();
            // Dropping tx closes the stream well short of 1000 body bytes.
        });

        let mut receiver = FileReceiver::new(rx);
        assert!(matches!(
            receiver.receive_one(dst.path()).await,
            Err(TransportError::Truncated)
        ));
    }

    #[tokio::test]
    async fn strips_path_components_from_names() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let path = src.path().join("payload.bin");
        tokio::fs::write(&path, b"x").await.unwrap();
        let files = vec![("../../etc/passwd".to_string(), path)];

        let (mut tx, rx) = tokio::io::duplex(4096);
        let sender = tokio::spawn(async move {
            send_files(&mut tx, &files).await.unwrap();
        });

        let mut receiver = FileReceiver::new(rx);
        let received = receiver.receive_one(dst.path()).await.unwrap();
        sender.await.unwrap();
        assert_eq!(received.name, "passwd");
        assert!(received.path.starts_with(dst.path()));
    }

    #[tokio::test]
    async fn rejects_empty_files_on_send() {
        let src = tempfile::tempdir().unwrap();
        let files = vec![write_fixture(src.path(), "empty", b"").await];
        let (mut tx, _rx) = tokio::io::duplex(4096);
        assert!(matches!(
            send_files(&mut tx, &files).await,
            Err(TransportError::HeaderOutOfBounds { .. })
        ));
    }
}
