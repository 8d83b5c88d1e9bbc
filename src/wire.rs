//! Binary packet formats shared by the discovery and transfer paths.
//!
//! All multi-byte fields are big-endian with no padding. Every packet opens
//! with the magic cookie and a one-byte message type; anything that fails
//! those checks is discarded by the caller, never treated as fatal.

use crate::error::ProtocolError;

/// Identifies datagrams belonging to this protocol.
pub const MAGIC_COOKIE: u32 = 0xABCD_DCBA;

/// Well-known port offers are broadcast to and requests are served on.
pub const DISCOVERY_PORT: u16 = 13117;

/// Default port for TCP bulk transfers.
pub const DEFAULT_TCP_PORT: u16 = 12345;

/// Size of the receive buffer and of a full payload datagram.
pub const DATAGRAM_SIZE: usize = 1024;

/// Payload header: cookie (4) + type (1) + total (8) + index (8).
pub const PAYLOAD_HEADER_SIZE: usize = 21;

/// Usable payload bytes per segment.
pub const MAX_SEGMENT_PAYLOAD: usize = DATAGRAM_SIZE - PAYLOAD_HEADER_SIZE;

const OFFER_SIZE: usize = 9;
const REQUEST_SIZE: usize = 13;

/// Message type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Offer = 0x2,
    Request = 0x3,
    Payload = 0x4,
}

impl MessageType {
    fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x2 => Ok(Self::Offer),
            0x3 => Ok(Self::Request),
            0x4 => Ok(Self::Payload),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

// Callers check lengths before slicing.
fn read_u16(buffer: &[u8]) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buffer[..2]);
    u16::from_be_bytes(bytes)
}

fn read_u32(buffer: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[..4]);
    u32::from_be_bytes(bytes)
}

fn read_u64(buffer: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[..8]);
    u64::from_be_bytes(bytes)
}

fn check_header(buffer: &[u8], expected: MessageType) -> Result<(), ProtocolError> {
    if buffer.len() < 5 {
        return Err(ProtocolError::Truncated {
            needed: 5,
            got: buffer.len(),
        });
    }
    let cookie = read_u32(buffer);
    if cookie != MAGIC_COOKIE {
        return Err(ProtocolError::BadMagicCookie(cookie));
    }
    let message_type = MessageType::from_byte(buffer[4])?;
    if message_type != expected {
        return Err(ProtocolError::UnexpectedType {
            expected,
            got: message_type,
        });
    }
    Ok(())
}

/// Server advertisement: which ports to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferPacket {
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl OfferPacket {
    pub fn encode(&self) -> [u8; OFFER_SIZE] {
        let mut buffer = [0u8; OFFER_SIZE];
        buffer[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer[4] = MessageType::Offer as u8;
        buffer[5..7].copy_from_slice(&self.udp_port.to_be_bytes());
        buffer[7..9].copy_from_slice(&self.tcp_port.to_be_bytes());
        buffer
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, ProtocolError> {
        check_header(buffer, MessageType::Offer)?;
        if buffer.len() < OFFER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: OFFER_SIZE,
                got: buffer.len(),
            });
        }
        Ok(Self {
            udp_port: read_u16(&buffer[5..7]),
            tcp_port: read_u16(&buffer[7..9]),
        })
    }
}

/// Client transfer request: how many bytes to stream back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacket {
    pub file_size: u64,
}

impl RequestPacket {
    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut buffer = [0u8; REQUEST_SIZE];
        buffer[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer[4] = MessageType::Request as u8;
        buffer[5..13].copy_from_slice(&self.file_size.to_be_bytes());
        buffer
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, ProtocolError> {
        check_header(buffer, MessageType::Request)?;
        if buffer.len() < REQUEST_SIZE {
            return Err(ProtocolError::Truncated {
                needed: REQUEST_SIZE,
                got: buffer.len(),
            });
        }
        Ok(Self {
            file_size: read_u64(&buffer[5..13]),
        })
    }
}

/// Header of one numbered payload segment. The payload bytes follow the
/// header in the same datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub total_segments: u64,
    pub segment_index: u64,
}

impl PayloadHeader {
    pub fn encode_into(&self, buffer: &mut [u8]) {
        buffer[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer[4] = MessageType::Payload as u8;
        buffer[5..13].copy_from_slice(&self.total_segments.to_be_bytes());
        buffer[13..21].copy_from_slice(&self.segment_index.to_be_bytes());
    }

    /// Decode a payload datagram, returning the header and the payload slice.
    pub fn decode(buffer: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        check_header(buffer, MessageType::Payload)?;
        if buffer.len() < PAYLOAD_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: PAYLOAD_HEADER_SIZE,
                got: buffer.len(),
            });
        }
        let header = Self {
            total_segments: read_u64(&buffer[5..13]),
            segment_index: read_u64(&buffer[13..21]),
        };
        Ok((header, &buffer[PAYLOAD_HEADER_SIZE..]))
    }
}
