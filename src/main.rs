//! netburst - LAN throughput benchmarking with broadcast server discovery

use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use netburst::client::{Client, ClientConfig};
use netburst::discover::ServerOffer;
use netburst::output::{output_json, output_plain};
use netburst::serve::{Server, ServerConfig, DEFAULT_TCP_WORKERS};
use netburst::wire::{DEFAULT_TCP_PORT, DISCOVERY_PORT};

fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("netburst={}", log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .init();

    Ok(())
}

#[derive(Parser)]
#[command(name = "netburst")]
#[command(author, version, about = "LAN throughput benchmarking with broadcast discovery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "NETBURST_LOG")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server: broadcast offers and answer transfer requests
    Serve {
        /// Port offers are broadcast to
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        discovery_port: u16,

        /// UDP request/payload port (advertised in offers)
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        udp_port: u16,

        /// TCP transfer port (advertised in offers)
        #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
        tcp_port: u16,

        /// Broadcast interval
        #[arg(long, default_value = "1s", value_parser = parse_duration)]
        interval: Duration,

        /// TCP handler pool size
        #[arg(long, default_value_t = DEFAULT_TCP_WORKERS)]
        workers: usize,
    },

    /// Run a benchmark against a discovered (or given) server
    Run {
        /// Bytes per transfer (e.g. 500K, 10M, 1G)
        #[arg(short = 's', long, default_value = "1M", value_parser = parse_size)]
        size: u64,

        /// Number of concurrent TCP transfers
        #[arg(short = 't', long, default_value_t = 1)]
        tcp: usize,

        /// Number of concurrent UDP transfers
        #[arg(short = 'u', long, default_value_t = 1)]
        udp: usize,

        /// Give up discovery after this long (e.g. 10s); default waits forever
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Skip discovery and use this server address
        #[arg(long)]
        server: Option<IpAddr>,

        /// UDP port, used with --server
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        udp_port: u16,

        /// TCP port, used with --server
        #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
        tcp_port: u16,

        /// Port to listen for offers on
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        discovery_port: u16,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let value: u64 = ms.parse().map_err(|_| format!("invalid duration: {}", s))?;
        return Ok(Duration::from_millis(value));
    }
    let (value, multiplier) = if let Some(rest) = s.strip_suffix('m') {
        (rest, 60)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1)
    } else {
        (s, 1)
    };
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;
    Ok(Duration::from_secs(value * multiplier))
}

fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (value, multiplier) = match s.chars().last() {
        Some('K') | Some('k') => (&s[..s.len() - 1], 1024u64),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    let value: u64 = value.parse().map_err(|_| format!("invalid size: {}", s))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve {
            discovery_port,
            udp_port,
            tcp_port,
            interval,
            workers,
        } => {
            let server = Server::new(ServerConfig {
                discovery_port,
                udp_port,
                tcp_port,
                broadcast_interval: interval,
                tcp_workers: workers,
            });

            // Ctrl-C flips the shutdown flag so blocked receives wake
            // instead of hanging.
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown requested");
                    let _ = shutdown_tx.send(true);
                }
            });

            server.run(shutdown_rx).await?;
        }
        Commands::Run {
            size,
            tcp,
            udp,
            timeout,
            server,
            udp_port,
            tcp_port,
            discovery_port,
            json,
        } => {
            let config = ClientConfig {
                file_size: size,
                tcp_streams: tcp,
                udp_streams: udp,
                discovery_port,
                discovery_timeout: timeout,
                server: server.map(|addr| ServerOffer {
                    addr,
                    udp_port,
                    tcp_port,
                }),
                live_monitor: !json,
            };

            let report = Client::new(config).run().await?;
            if json {
                println!("{}", output_json(&report));
            } else {
                print!("{}", output_plain(&report));
            }
        }
    }

    Ok(())
}
