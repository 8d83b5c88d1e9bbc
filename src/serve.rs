//! Server mode.
//!
//! Three long-running concerns, all cancel-aware: the offer broadcaster, the
//! UDP request dispatcher, and a TCP accept loop backed by a bounded worker
//! pool. None of them terminate on a malformed packet or a single failed
//! connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::discover::{self, BroadcastConfig};
use crate::error::Result;
use crate::net;
use crate::tcp;
use crate::udp;
use crate::wire::{RequestPacket, DATAGRAM_SIZE, DEFAULT_TCP_PORT, DISCOVERY_PORT};

/// Default size of the TCP handler pool. Excess accepted connections wait
/// for a free worker instead of being dropped.
pub const DEFAULT_TCP_WORKERS: usize = 10;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port offers are broadcast to.
    pub discovery_port: u16,
    /// Port the request/payload socket binds to (advertised in offers).
    pub udp_port: u16,
    /// Port the TCP listener binds to (advertised in offers).
    pub tcp_port: u16,
    pub broadcast_interval: Duration,
    pub tcp_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            udp_port: DISCOVERY_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            broadcast_interval: Duration::from_secs(1),
            tcp_workers: DEFAULT_TCP_WORKERS,
        }
    }
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` flips to true. Sockets are bound up front so a
    /// port conflict surfaces here rather than inside a background task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let udp_socket = Arc::new(net::transfer_socket(self.config.udp_port)?);
        let tcp_listener = net::tcp_listener(self.config.tcp_port).await?;
        info!(
            "serving udp on port {}, tcp on port {}",
            self.config.udp_port, self.config.tcp_port
        );

        let broadcaster = tokio::spawn(discover::broadcast_offers(
            BroadcastConfig {
                discovery_port: self.config.discovery_port,
                udp_port: self.config.udp_port,
                tcp_port: self.config.tcp_port,
                interval: self.config.broadcast_interval,
            },
            shutdown.clone(),
        ));

        let dispatcher = tokio::spawn(dispatch_udp_requests(
            udp_socket.clone(),
            shutdown.clone(),
        ));

        let workers = Arc::new(Semaphore::new(self.config.tcp_workers));

        loop {
            tokio::select! {
                accepted = tcp_listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("tcp connection from {}", peer);
                            let workers = workers.clone();
                            tokio::spawn(async move {
                                // Queue behind the pool rather than dropping
                                // the connection.
                                let _permit = workers.acquire_owned().await;
                                if let Err(e) = tcp::handle_request(stream).await {
                                    warn!("tcp handler for {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept failed: {}", e);
                        }
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("server shutting down");
        let _ = broadcaster.await;
        let _ = dispatcher.await;
        Ok(())
    }
}

/// Receive transfer requests and fan each one out to its own task. The loop
/// never dies on a malformed datagram, and unrelated transfers never
/// serialize behind one another.
async fn dispatch_udp_requests(
    socket: Arc<UdpSocket>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut buffer = [0u8; DATAGRAM_SIZE];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => {
                match received {
                    Ok((len, peer)) => match RequestPacket::decode(&buffer[..len]) {
                        Ok(request) => {
                            info!("udp request from {}: {} bytes", peer, request.file_size);
                            let socket = socket.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    udp::send_segments(&socket, peer, request.file_size).await
                                {
                                    warn!("transfer to {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            debug!("ignoring datagram from {}: {}", peer, e);
                        }
                    },
                    Err(e) => {
                        warn!("udp receive failed: {}", e);
                    }
                }
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    debug!("udp dispatcher cancelled");
                    return Ok(());
                }
            }
        }
    }
}
