//! Socket construction helpers.
//!
//! Built on socket2 so broadcast and address-reuse options can be set before
//! bind, then converted into non-blocking tokio sockets.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::{TcpListener, UdpSocket};
use tracing::debug;

fn new_udp_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    Ok(socket)
}

fn into_tokio_udp(socket: Socket) -> io::Result<UdpSocket> {
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// UDP socket for listening to offer broadcasts. Address reuse is enabled so
/// several listeners can share the discovery port on one host.
pub fn discovery_listener(port: u16) -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&SockAddr::from(addr))?;
    debug!("discovery listener bound to {}", addr);
    into_tokio_udp(socket)
}

/// UDP socket for sending offer broadcasts.
pub fn broadcast_sender() -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    socket.set_broadcast(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&SockAddr::from(addr))?;
    into_tokio_udp(socket)
}

/// UDP socket the server uses for request/payload exchange, bound to a
/// well-known port.
pub fn transfer_socket(port: u16) -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&SockAddr::from(addr))?;
    debug!("transfer socket bound to {}", addr);
    into_tokio_udp(socket)
}

/// Ephemeral UDP socket for one client-side transfer.
pub fn ephemeral_udp() -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&SockAddr::from(addr))?;
    into_tokio_udp(socket)
}

/// TCP listener for bulk transfer requests.
pub async fn tcp_listener(port: u16) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Destination address for offer broadcasts.
pub fn broadcast_target(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port))
}
