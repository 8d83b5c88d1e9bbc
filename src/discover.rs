//! Server discovery over UDP broadcast.
//!
//! The server announces its transfer ports by broadcasting an offer packet on
//! the discovery port at a fixed interval. Clients bind the same port (with
//! address reuse, so several clients coexist on one host) and take the first
//! structurally valid offer they hear.

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::net;
use crate::wire::{OfferPacket, DATAGRAM_SIZE};

/// A server located via its offer broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOffer {
    pub addr: IpAddr,
    pub udp_port: u16,
    pub tcp_port: u16,
}

/// Wait for the first valid offer on the discovery port.
///
/// Malformed or foreign datagrams are skipped and listening continues. With
/// `timeout` set, failing to hear an offer in time returns
/// [`Error::DiscoveryTimeout`]; with `None` this waits indefinitely.
pub async fn await_offer(discovery_port: u16, timeout: Option<Duration>) -> Result<ServerOffer> {
    let socket = net::discovery_listener(discovery_port)?;
    info!("listening for offers on port {}", discovery_port);

    let listen = async {
        let mut buffer = [0u8; DATAGRAM_SIZE];
        loop {
            let (len, peer) = socket.recv_from(&mut buffer).await?;
            match OfferPacket::decode(&buffer[..len]) {
                Ok(offer) => {
                    info!(
                        "offer from {}: udp port {}, tcp port {}",
                        peer.ip(),
                        offer.udp_port,
                        offer.tcp_port
                    );
                    return Ok(ServerOffer {
                        addr: peer.ip(),
                        udp_port: offer.udp_port,
                        tcp_port: offer.tcp_port,
                    });
                }
                Err(e) => {
                    debug!("ignoring datagram from {}: {}", peer, e);
                }
            }
        }
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, listen)
            .await
            .map_err(|_| Error::DiscoveryTimeout)?,
        None => listen.await,
    }
}

/// Settings for the server's offer broadcaster.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Port the offers are sent to.
    pub discovery_port: u16,
    /// Advertised UDP transfer port.
    pub udp_port: u16,
    /// Advertised TCP transfer port.
    pub tcp_port: u16,
    pub interval: Duration,
}

/// Broadcast offers until cancelled.
///
/// Best-effort: a failed send is logged and the loop continues at the next
/// tick. Only socket creation can fail.
pub async fn broadcast_offers(
    config: BroadcastConfig,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    let socket = net::broadcast_sender()?;
    let target = net::broadcast_target(config.discovery_port);
    let packet = OfferPacket {
        udp_port: config.udp_port,
        tcp_port: config.tcp_port,
    }
    .encode();

    info!(
        "broadcasting offers to {} every {:?}",
        target, config.interval
    );

    let mut ticker = interval(config.interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = socket.send_to(&packet, target).await {
                    warn!("offer broadcast failed: {}", e);
                }
            }
            result = cancel.changed() => {
                // A dropped sender counts as cancellation.
                if result.is_err() || *cancel.borrow() {
                    debug!("broadcaster cancelled");
                    return Ok(());
                }
            }
        }
    }
}
