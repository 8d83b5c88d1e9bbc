//! Integration tests for netburst

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use netburst::client::{Client, ClientConfig};
use netburst::discover::ServerOffer;
use netburst::serve::{Server, ServerConfig};
use netburst::stats::Protocol;
use netburst::wire::OfferPacket;

// Use different ports for each test to avoid conflicts
static PORT_COUNTER: AtomicU16 = AtomicU16::new(26000);

struct TestPorts {
    discovery: u16,
    udp: u16,
    tcp: u16,
}

fn get_test_ports() -> TestPorts {
    let base = PORT_COUNTER.fetch_add(10, Ordering::SeqCst);
    TestPorts {
        discovery: base,
        udp: base + 1,
        tcp: base + 2,
    }
}

fn start_test_server(ports: &TestPorts) -> watch::Sender<bool> {
    let config = ServerConfig {
        discovery_port: ports.discovery,
        udp_port: ports.udp,
        tcp_port: ports.tcp,
        broadcast_interval: Duration::from_millis(200),
        ..Default::default()
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let server = Server::new(config);
        let _ = server.run(shutdown_rx).await;
    });
    shutdown_tx
}

fn direct_offer(ports: &TestPorts) -> ServerOffer {
    ServerOffer {
        addr: "127.0.0.1".parse().unwrap(),
        udp_port: ports.udp,
        tcp_port: ports.tcp,
    }
}

#[tokio::test]
async fn test_mixed_benchmark_loopback() {
    let ports = get_test_ports();
    let _shutdown = start_test_server(&ports);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = Client::new(ClientConfig {
        file_size: 5000,
        tcp_streams: 2,
        udp_streams: 2,
        server: Some(direct_offer(&ports)),
        ..Default::default()
    });

    let report = timeout(Duration::from_secs(15), client.run())
        .await
        .expect("benchmark should finish")
        .expect("benchmark should succeed");

    assert_eq!(report.transfers.len(), 4);
    assert_eq!(report.failures(), 0);

    let mut summed = 0u64;
    for transfer in &report.transfers {
        let stats = transfer.result.as_ref().unwrap();
        assert_eq!(stats.bytes_received, 5000, "full transfer expected");
        summed += stats.bytes_received;
        if transfer.protocol == Protocol::Udp {
            // 5000 bytes at 1003 per segment
            assert_eq!(stats.segments_expected, Some(5));
            assert_eq!(stats.segments_received, 5);
            assert_eq!(stats.success_rate(), 100.0);
        }
    }
    // No cross-transfer interference: the aggregate equals the per-transfer sum.
    assert_eq!(report.total_bytes, summed);
}

#[tokio::test]
async fn test_concurrent_udp_transfers_are_independent() {
    let ports = get_test_ports();
    let _shutdown = start_test_server(&ports);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = Client::new(ClientConfig {
        file_size: 5000,
        tcp_streams: 0,
        udp_streams: 3,
        server: Some(direct_offer(&ports)),
        ..Default::default()
    });

    let report = timeout(Duration::from_secs(15), client.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.transfers.len(), 3);
    for transfer in &report.transfers {
        let stats = transfer.result.as_ref().unwrap();
        assert_eq!(stats.bytes_received, 5000);
    }
    assert_eq!(report.total_bytes, 15_000);
}

#[tokio::test]
async fn test_discovery_drives_benchmark() {
    let ports = get_test_ports();
    let _shutdown = start_test_server(&ports);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Broadcast does not always reach loopback listeners in test
    // environments, so announce the running server by unicasting its offer
    // to the client's discovery port.
    let offer = OfferPacket {
        udp_port: ports.udp,
        tcp_port: ports.tcp,
    };
    let discovery_port = ports.discovery + 5;
    tokio::spawn(async move {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        loop {
            let _ = socket
                .send_to(&offer.encode(), ("127.0.0.1", discovery_port))
                .await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let client = Client::new(ClientConfig {
        file_size: 2000,
        tcp_streams: 1,
        udp_streams: 1,
        discovery_port,
        discovery_timeout: Some(Duration::from_secs(5)),
        server: None,
        ..Default::default()
    });

    let report = timeout(Duration::from_secs(15), client.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.server.udp_port, ports.udp);
    assert_eq!(report.server.tcp_port, ports.tcp);
    assert_eq!(report.failures(), 0);
}

#[tokio::test]
async fn test_zero_byte_tcp_run() {
    let ports = get_test_ports();
    let _shutdown = start_test_server(&ports);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = Client::new(ClientConfig {
        file_size: 0,
        tcp_streams: 1,
        udp_streams: 0,
        server: Some(direct_offer(&ports)),
        ..Default::default()
    });

    let report = timeout(Duration::from_secs(10), client.run())
        .await
        .unwrap()
        .unwrap();

    let stats = report.transfers[0].result.as_ref().unwrap();
    assert_eq!(stats.bytes_received, 0);
    assert_eq!(stats.throughput_bps(), 0.0);
}

#[tokio::test]
async fn test_server_survives_garbage_datagrams() {
    let ports = get_test_ports();
    let _shutdown = start_test_server(&ports);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Hit the request socket with junk, then run a normal benchmark.
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"definitely not a request", ("127.0.0.1", ports.udp))
        .await
        .unwrap();
    socket.send_to(&[0u8; 3], ("127.0.0.1", ports.udp)).await.unwrap();

    let client = Client::new(ClientConfig {
        file_size: 3000,
        tcp_streams: 0,
        udp_streams: 1,
        server: Some(direct_offer(&ports)),
        ..Default::default()
    });

    let report = timeout(Duration::from_secs(10), client.run())
        .await
        .unwrap()
        .unwrap();
    let stats = report.transfers[0].result.as_ref().unwrap();
    assert_eq!(stats.bytes_received, 3000);
    assert_eq!(stats.success_rate(), 100.0);
}
