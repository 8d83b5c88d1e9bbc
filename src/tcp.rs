//! TCP bulk transfer.
//!
//! The TCP path carries no framing beyond the request: the client writes the
//! decimal byte count it wants, newline-terminated, and the server answers
//! with exactly that many raw bytes.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::Result;
use crate::stats::{AggregateStats, Protocol, TransferStats};

const CHUNK_SIZE: usize = 64 * 1024;
const FILLER_BYTE: u8 = b'X';

/// Longest size line a client may send. A u64 is at most 20 digits, so
/// anything past this is garbage and must not buffer unboundedly.
const SIZE_LINE_LIMIT: u64 = 64;

/// Run one client-side TCP transfer: request `file_size` bytes and read
/// until the count is reached or the server closes the stream.
pub async fn run_transfer(
    transfer_id: usize,
    server: IpAddr,
    tcp_port: u16,
    file_size: u64,
    aggregate: Arc<AggregateStats>,
) -> Result<TransferStats> {
    let start = Instant::now();
    let mut stream = TcpStream::connect((server, tcp_port)).await?;
    stream.write_all(format!("{}\n", file_size).as_bytes()).await?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;

    while received < file_size {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            debug!(
                "transfer {}: server closed after {}/{} bytes",
                transfer_id, received, file_size
            );
            break;
        }
        received += n as u64;
        aggregate.add_bytes(n as u64);
    }

    let elapsed = start.elapsed();
    aggregate.add_elapsed(elapsed);

    Ok(TransferStats {
        transfer_id,
        protocol: Protocol::Tcp,
        bytes_received: received,
        elapsed,
        segments_received: 0,
        segments_expected: Some(0),
    })
}

/// Serve one accepted connection: read the size line, stream that many
/// filler bytes back, and close. Returns the byte count sent.
pub async fn handle_request(stream: TcpStream) -> Result<u64> {
    let peer = stream.peer_addr()?;
    let mut stream = BufReader::new(stream);

    let mut line = String::new();
    (&mut stream).take(SIZE_LINE_LIMIT).read_line(&mut line).await?;
    let requested: u64 = line.trim().parse().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad size line from {}: {:?}", peer, line.trim()),
        )
    })?;
    info!("tcp request from {}: {} bytes", peer, requested);

    let chunk = [FILLER_BYTE; CHUNK_SIZE];
    let mut sent = 0u64;
    let stream = stream.get_mut();

    while sent < requested {
        let n = CHUNK_SIZE.min((requested - sent) as usize);
        stream.write_all(&chunk[..n]).await?;
        sent += n as u64;
    }
    stream.shutdown().await?;

    debug!("sent {} bytes to {}", sent, peer);
    Ok(sent)
}
