//! Per-transfer and aggregate statistics.
//!
//! Each transfer task owns its `TransferStats` exclusively and hands it back
//! on completion. The only state shared between concurrent tasks is
//! `AggregateStats`, which is mutated through relaxed atomic increments so
//! the live monitor can read running totals without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::wire::MAX_SEGMENT_PAYLOAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Result of one completed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferStats {
    pub transfer_id: usize,
    pub protocol: Protocol,
    pub bytes_received: u64,
    pub elapsed: Duration,
    /// Distinct segment indices seen (UDP only, 0 for TCP).
    pub segments_received: u64,
    /// total_segments as declared by the server. `None` means no payload
    /// ever arrived so the total was never learned (UDP only; `Some(0)`
    /// for TCP and for empty transfers).
    pub segments_expected: Option<u64>,
}

impl TransferStats {
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_received as f64 * 8.0 / secs
        } else {
            0.0
        }
    }

    /// UDP delivery success in percent, always within [0, 100].
    ///
    /// An empty transfer (nothing expected) counts as fully successful
    /// rather than dividing by zero. A transfer whose total was never
    /// learned lost every segment and reports zero.
    pub fn success_rate(&self) -> f64 {
        match self.segments_expected {
            Some(0) => 100.0,
            Some(total) => (self.segments_received as f64 / total as f64) * 100.0,
            None => 0.0,
        }
    }

    /// Nominal UDP speed: distinct segments times the full payload size,
    /// matching what the success rate is measured against.
    pub fn segment_throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.segments_received * MAX_SEGMENT_PAYLOAD as u64 * 8) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Running totals shared by all concurrent transfers and the live monitor.
pub struct AggregateStats {
    total_bytes: AtomicU64,
    busy_nanos: AtomicU64,
    started: Instant,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            busy_nanos: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_elapsed(&self, elapsed: Duration) {
        self.busy_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Summed per-transfer elapsed time (busy time, not wall time).
    pub fn busy_time(&self) -> Duration {
        Duration::from_nanos(self.busy_nanos.load(Ordering::Relaxed))
    }

    pub fn wall_time(&self) -> Duration {
        self.started.elapsed()
    }

    /// Running throughput against the wall clock, for the live monitor.
    pub fn running_bps(&self) -> f64 {
        let secs = self.wall_time().as_secs_f64();
        if secs > 0.0 {
            self.total_bytes() as f64 * 8.0 / secs
        } else {
            0.0
        }
    }
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self::new()
    }
}

pub fn bytes_to_human(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn bps_to_human(bps: f64) -> String {
    if bps >= 1e9 {
        format!("{:.2} Gbit/s", bps / 1e9)
    } else if bps >= 1e6 {
        format!("{:.2} Mbit/s", bps / 1e6)
    } else if bps >= 1e3 {
        format!("{:.2} Kbit/s", bps / 1e3)
    } else {
        format!("{:.0} bit/s", bps)
    }
}
