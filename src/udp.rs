//! Segmented UDP transfer engine.
//!
//! The server answers a request by streaming numbered payload segments at
//! full speed, with no acknowledgment and no retransmission. Loss is the
//! thing being measured, not corrected. The client has no explicit
//! end-of-transfer marker: a receive that idles past the timeout is the
//! termination signal.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::Result;
use crate::net;
use crate::stats::{AggregateStats, Protocol, TransferStats};
use crate::wire::{
    PayloadHeader, RequestPacket, DATAGRAM_SIZE, MAX_SEGMENT_PAYLOAD, PAYLOAD_HEADER_SIZE,
};

/// How long the client waits on an idle socket before declaring the
/// transfer over.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

const FILLER_BYTE: u8 = b'X';

/// Number of segments needed to cover `file_size` bytes.
pub fn total_segments(file_size: u64) -> u64 {
    file_size.div_ceil(MAX_SEGMENT_PAYLOAD as u64)
}

/// Stream all segments for one request to `peer`, in strictly ascending
/// index order. Returns the number of segments handed to the socket.
///
/// Send failures are logged and skipped; datagram sends to distinct peers on
/// the shared server socket do not interfere, so concurrent calls need no
/// coordination.
pub async fn send_segments(socket: &UdpSocket, peer: SocketAddr, file_size: u64) -> Result<u64> {
    let total = total_segments(file_size);
    let mut datagram = [FILLER_BYTE; DATAGRAM_SIZE];
    let mut sent = 0u64;

    for index in 0..total {
        let remaining = file_size - index * MAX_SEGMENT_PAYLOAD as u64;
        let payload_len = (MAX_SEGMENT_PAYLOAD as u64).min(remaining) as usize;

        let header = PayloadHeader {
            total_segments: total,
            segment_index: index,
        };
        header.encode_into(&mut datagram);

        match socket
            .send_to(&datagram[..PAYLOAD_HEADER_SIZE + payload_len], peer)
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => warn!("segment {}/{} to {} failed: {}", index, total, peer, e),
        }
    }

    debug!("sent {}/{} segments to {}", sent, total, peer);
    Ok(sent)
}

/// Client-side segment accounting: deduplication, byte counting, and the
/// declared total. Socket-free so the loss logic tests in isolation.
#[derive(Debug, Default)]
pub struct SegmentTracker {
    seen: HashSet<u64>,
    total_segments: Option<u64>,
    bytes: u64,
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one valid payload packet. Returns the payload length if this
    /// index is new, `None` for a duplicate.
    ///
    /// The declared total is taken from the first packet and kept: the
    /// value embedded by the server is authoritative, the tracker never
    /// recomputes it from the requested size.
    pub fn record(&mut self, header: &PayloadHeader, payload_len: usize) -> Option<u64> {
        if self.total_segments.is_none() {
            self.total_segments = Some(header.total_segments);
        }
        if self.seen.insert(header.segment_index) {
            self.bytes += payload_len as u64;
            Some(payload_len as u64)
        } else {
            None
        }
    }

    pub fn segments_received(&self) -> u64 {
        self.seen.len() as u64
    }

    /// The total declared by the server, or `None` if no valid packet
    /// ever arrived.
    pub fn total_segments(&self) -> Option<u64> {
        self.total_segments
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes
    }
}

/// Run one client-side UDP transfer: send a single request (best effort, no
/// retry), then receive segments until the idle timeout fires.
///
/// Byte counts are pushed into `aggregate` as they arrive so a live monitor
/// can watch the run; the returned [`TransferStats`] is this transfer's own
/// final accounting.
pub async fn run_transfer(
    transfer_id: usize,
    server: IpAddr,
    udp_port: u16,
    file_size: u64,
    aggregate: Arc<AggregateStats>,
) -> Result<TransferStats> {
    let socket = net::ephemeral_udp()?;
    socket.connect((server, udp_port)).await?;

    let request = RequestPacket { file_size }.encode();
    socket.send(&request).await?;
    debug!("transfer {}: requested {} bytes", transfer_id, file_size);

    let mut tracker = SegmentTracker::new();
    let mut buffer = [0u8; DATAGRAM_SIZE];
    let start = Instant::now();
    let mut last_data = start;

    loop {
        match tokio::time::timeout(IDLE_TIMEOUT, socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => match PayloadHeader::decode(&buffer[..len]) {
                Ok((header, payload)) => {
                    last_data = Instant::now();
                    if let Some(bytes) = tracker.record(&header, payload.len()) {
                        aggregate.add_bytes(bytes);
                    }
                }
                Err(e) => {
                    debug!("transfer {}: ignoring datagram: {}", transfer_id, e);
                }
            },
            Ok(Err(e)) => return Err(e.into()),
            // Idle socket: the transfer is over.
            Err(_) => break,
        }
    }

    let elapsed = last_data.duration_since(start);
    aggregate.add_elapsed(elapsed);

    let segments_expected = match tracker.total_segments() {
        Some(total) => Some(total),
        // Nothing arrived: an empty request expects nothing; anything
        // else was fully lost and the total stays unknown.
        None if file_size == 0 => Some(0),
        None => None,
    };

    let stats = TransferStats {
        transfer_id,
        protocol: Protocol::Udp,
        bytes_received: tracker.bytes_received(),
        elapsed,
        segments_received: tracker.segments_received(),
        segments_expected,
    };
    debug!(
        "transfer {}: {}/{:?} segments, {} bytes in {:?}",
        transfer_id,
        stats.segments_received,
        stats.segments_expected,
        stats.bytes_received,
        elapsed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_segments_math() {
        assert_eq!(total_segments(0), 0);
        assert_eq!(total_segments(1), 1);
        assert_eq!(total_segments(1003), 1);
        assert_eq!(total_segments(1004), 2);
        assert_eq!(total_segments(5000), 5);
    }

    #[test]
    fn test_tracker_deduplicates() {
        let mut tracker = SegmentTracker::new();
        let header = PayloadHeader {
            total_segments: 5,
            segment_index: 2,
        };
        assert_eq!(tracker.record(&header, 1003), Some(1003));
        assert_eq!(tracker.record(&header, 1003), None);
        assert_eq!(tracker.segments_received(), 1);
        assert_eq!(tracker.bytes_received(), 1003);
    }

    #[test]
    fn test_tracker_trusts_embedded_total() {
        // Server declares 7 even though the client asked for 5 segments
        // worth of data; the embedded value wins.
        let mut tracker = SegmentTracker::new();
        for index in 0..3 {
            let header = PayloadHeader {
                total_segments: 7,
                segment_index: index,
            };
            tracker.record(&header, 1003);
        }
        assert_eq!(tracker.total_segments(), Some(7));
    }

    #[test]
    fn test_loss_scenario_three_of_five() {
        let mut tracker = SegmentTracker::new();
        for index in [0u64, 2, 3] {
            let header = PayloadHeader {
                total_segments: 5,
                segment_index: index,
            };
            tracker.record(&header, 1003);
        }
        let stats = TransferStats {
            transfer_id: 0,
            protocol: Protocol::Udp,
            bytes_received: tracker.bytes_received(),
            elapsed: Duration::from_secs(1),
            segments_received: tracker.segments_received(),
            segments_expected: tracker.total_segments(),
        };
        assert_eq!(stats.segments_received, 3);
        assert_eq!(stats.success_rate(), 60.0);
    }

    #[tokio::test]
    async fn test_send_segments_sizes() {
        let receiver = net::ephemeral_udp().unwrap();
        let receiver_addr: SocketAddr =
            ("127.0.0.1".parse::<IpAddr>().unwrap(), receiver.local_addr().unwrap().port()).into();

        let sender = net::ephemeral_udp().unwrap();
        let sent = send_segments(&sender, receiver_addr, 5000).await.unwrap();
        assert_eq!(sent, 5);

        let mut buffer = [0u8; DATAGRAM_SIZE];
        let mut payload_lens = Vec::new();
        let mut indices = Vec::new();
        for _ in 0..5 {
            let len = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buffer))
                .await
                .expect("segment should arrive")
                .unwrap();
            let (header, payload) = PayloadHeader::decode(&buffer[..len]).unwrap();
            assert_eq!(header.total_segments, 5);
            indices.push(header.segment_index);
            payload_lens.push(payload.len());
        }

        // Strictly ascending order on loopback, full segments then the tail.
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(payload_lens, vec![1003, 1003, 1003, 1003, 988]);
        assert_eq!(payload_lens.iter().sum::<usize>(), 5000);
    }

    #[tokio::test]
    async fn test_send_segments_zero_size() {
        let sender = net::ephemeral_udp().unwrap();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_eq!(send_segments(&sender, peer, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_transfer_zero_size_times_out_cleanly() {
        // A peer that accepts the request but never replies: the idle
        // timeout fires and the result is an empty, fully-successful
        // transfer.
        let silent_peer = net::ephemeral_udp().unwrap();
        let port = silent_peer.local_addr().unwrap().port();

        let aggregate = Arc::new(AggregateStats::new());
        let stats = run_transfer(0, "127.0.0.1".parse().unwrap(), port, 0, aggregate)
            .await
            .unwrap();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.segments_expected, Some(0));
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[tokio::test]
    async fn test_run_transfer_total_loss_reports_zero_success() {
        // A nonzero request against a peer that never answers: the total
        // is never learned, and the transfer is a 0% loss report, not a
        // vacuous 100%.
        let silent_peer = net::ephemeral_udp().unwrap();
        let port = silent_peer.local_addr().unwrap().port();

        let aggregate = Arc::new(AggregateStats::new());
        let stats = run_transfer(0, "127.0.0.1".parse().unwrap(), port, 5000, aggregate)
            .await
            .unwrap();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.segments_received, 0);
        assert_eq!(stats.segments_expected, None);
        assert_eq!(stats.success_rate(), 0.0);
    }
}
