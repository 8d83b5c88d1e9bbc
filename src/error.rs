//! Error taxonomy.
//!
//! Protocol errors are always discard-and-continue: a malformed datagram is
//! logged and the receive loop keeps going. Transport errors are fatal to the
//! single transfer that hit them and are reported as that transfer's failure
//! without touching sibling transfers.

use crate::wire::MessageType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed packet. Non-fatal everywhere.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket-level failure. Fatal to the owning transfer only.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No valid offer arrived within the configured discovery timeout.
    #[error("no server found within discovery timeout")]
    DiscoveryTimeout,

    /// Invalid user-supplied parameter, caught before any task is spawned.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("packet too short: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("bad magic cookie: {0:#010x}")]
    BadMagicCookie(u32),

    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("unexpected message type: expected {expected:?}, got {got:?}")]
    UnexpectedType {
        expected: MessageType,
        got: MessageType,
    },
}
