//! netburst - LAN throughput benchmarking with broadcast server discovery
//!
//! A server advertises its transfer ports by broadcasting offers on a
//! well-known UDP port. Clients discover it, then launch concurrent TCP and
//! UDP transfers of a configurable size to measure achievable speed and, on
//! the UDP path, segment delivery success.
//!
//! # Library Usage
//!
//! ```ignore
//! use netburst::client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig {
//!         file_size: 10 * 1024 * 1024,
//!         tcp_streams: 2,
//!         udp_streams: 2,
//!         ..Default::default()
//!     };
//!
//!     let report = Client::new(config).run().await?;
//!     println!("{}", netburst::output::output_plain(&report));
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`wire`] - Binary packet formats and protocol constants
//! - [`discover`] - Offer broadcasting and discovery listening
//! - [`udp`] - Segmented UDP transfer engine
//! - [`tcp`] - Raw TCP bulk transfer
//! - [`client`] - Benchmark orchestration
//! - [`serve`] - Server-side request handling
//! - [`stats`] - Statistics collection

pub mod client;
pub mod discover;
pub mod error;
pub mod net;
pub mod output;
pub mod serve;
pub mod stats;
pub mod tcp;
pub mod udp;
pub mod wire;

pub use client::{BenchmarkReport, Client, ClientConfig};
pub use discover::ServerOffer;
pub use error::{Error, ProtocolError, Result};
pub use serve::{Server, ServerConfig};
pub use stats::{AggregateStats, Protocol, TransferStats};
