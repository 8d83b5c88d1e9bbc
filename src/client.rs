//! Benchmark orchestration.
//!
//! Discovers a server (or uses an explicit address), fans out the requested
//! number of concurrent TCP and UDP transfers, and joins them into one
//! report. Transfers fail independently: one refused connection becomes a
//! per-transfer failure entry, never an aborted run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::discover::{self, ServerOffer};
use crate::error::{Error, Result};
use crate::stats::{bps_to_human, bytes_to_human, AggregateStats, Protocol, TransferStats};
use crate::wire::DISCOVERY_PORT;
use crate::{tcp, udp};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bytes requested per transfer.
    pub file_size: u64,
    pub tcp_streams: usize,
    pub udp_streams: usize,
    pub discovery_port: u16,
    /// `None` waits for an offer indefinitely.
    pub discovery_timeout: Option<Duration>,
    /// Skip discovery and benchmark this server directly.
    pub server: Option<ServerOffer>,
    /// Print running totals every second while transfers are active.
    pub live_monitor: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            file_size: 1024 * 1024,
            tcp_streams: 1,
            udp_streams: 1,
            discovery_port: DISCOVERY_PORT,
            discovery_timeout: None,
            server: None,
            live_monitor: false,
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if self.tcp_streams == 0 && self.udp_streams == 0 {
            return Err(Error::Config(
                "at least one TCP or UDP stream is required".into(),
            ));
        }
        Ok(())
    }
}

/// One transfer's result: its stats, or the error that killed it.
#[derive(Debug)]
pub struct TransferOutcome {
    pub transfer_id: usize,
    pub protocol: Protocol,
    pub result: std::result::Result<TransferStats, String>,
}

#[derive(Debug)]
pub struct BenchmarkReport {
    pub server: ServerOffer,
    pub file_size: u64,
    pub transfers: Vec<TransferOutcome>,
    pub total_bytes: u64,
    /// Summed per-transfer elapsed time.
    pub busy_time: Duration,
    pub wall_time: Duration,
}

impl BenchmarkReport {
    /// Aggregate throughput against wall-clock time.
    pub fn aggregate_bps(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 * 8.0 / secs
        } else {
            0.0
        }
    }

    pub fn failures(&self) -> usize {
        self.transfers.iter().filter(|t| t.result.is_err()).count()
    }
}

pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<BenchmarkReport> {
        self.config.validate()?;

        let server = match self.config.server {
            Some(server) => server,
            None => {
                discover::await_offer(self.config.discovery_port, self.config.discovery_timeout)
                    .await?
            }
        };
        info!(
            "benchmarking {} ({} tcp, {} udp, {} per transfer)",
            server.addr,
            self.config.tcp_streams,
            self.config.udp_streams,
            bytes_to_human(self.config.file_size)
        );

        let aggregate = Arc::new(AggregateStats::new());
        let started = Instant::now();

        let (monitor_cancel_tx, monitor_cancel_rx) = watch::channel(false);
        let monitor = self.config.live_monitor.then(|| {
            tokio::spawn(monitor_progress(aggregate.clone(), monitor_cancel_rx))
        });

        let mut tasks: JoinSet<(usize, Protocol, Result<TransferStats>)> = JoinSet::new();
        let file_size = self.config.file_size;

        for id in 0..self.config.tcp_streams {
            let aggregate = aggregate.clone();
            tasks.spawn(async move {
                let result = tcp::run_transfer(id, server.addr, server.tcp_port, file_size, aggregate)
                    .await;
                (id, Protocol::Tcp, result)
            });
        }
        for offset in 0..self.config.udp_streams {
            let id = self.config.tcp_streams + offset;
            let aggregate = aggregate.clone();
            tasks.spawn(async move {
                let result = udp::run_transfer(id, server.addr, server.udp_port, file_size, aggregate)
                    .await;
                (id, Protocol::Udp, result)
            });
        }

        let mut transfers = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((transfer_id, protocol, result)) => {
                    if let Err(e) = &result {
                        warn!("{} transfer {} failed: {}", protocol, transfer_id, e);
                    }
                    transfers.push(TransferOutcome {
                        transfer_id,
                        protocol,
                        result: result.map_err(|e| e.to_string()),
                    });
                }
                Err(e) => {
                    // A panicked task still yields a failure entry rather
                    // than aborting the run.
                    warn!("transfer task aborted: {}", e);
                }
            }
        }
        transfers.sort_by_key(|t| t.transfer_id);

        let _ = monitor_cancel_tx.send(true);
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        debug!("all transfers joined");
        Ok(BenchmarkReport {
            server,
            file_size,
            transfers,
            total_bytes: aggregate.total_bytes(),
            busy_time: aggregate.busy_time(),
            wall_time: started.elapsed(),
        })
    }
}

/// Print running totals once per second until cancelled. Reads the shared
/// accumulator only; never outlives the benchmark.
async fn monitor_progress(aggregate: Arc<AggregateStats>, mut cancel: watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!(
                    "running: {} transferred, {}",
                    bytes_to_human(aggregate.total_bytes()),
                    bps_to_human(aggregate.running_bps())
                );
            }
            result = cancel.changed() => {
                if result.is_err() || *cancel.borrow() {
                    return;
                }
            }
        }
    }
}
