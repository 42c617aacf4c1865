//! Identity types for murmur peers and messages
//!
//! All identifiers are 64-bit. Message IDs embed their creation time so
//! uniqueness holds across peers without coordination.

use std::fmt;

use crate::Timestamp;

/// Peer identity - random 64-bit value drawn at session start
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl PeerId {
    pub const ZERO: PeerId = PeerId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        PeerId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        PeerId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({:016x})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Message identity - unique across peers
/// Format: \[millis:44\]\[nonce:20\]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MessageId(pub u64);

const NONCE_BITS: u32 = 20;
const NONCE_MASK: u64 = (1 << NONCE_BITS) - 1;
const MILLIS_MASK: u64 = (1 << 44) - 1;

impl MessageId {
    #[inline]
    pub fn new(id: u64) -> Self {
        MessageId(id)
    }

    /// Pack creation time and a per-peer random nonce into one ID
    #[inline]
    pub fn from_parts(created_at: Timestamp, nonce: u32) -> Self {
        let millis = (created_at.as_millis() as u64) & MILLIS_MASK;
        MessageId((millis << NONCE_BITS) | (nonce as u64 & NONCE_MASK))
    }

    #[inline]
    pub fn timestamp(self) -> Timestamp {
        Timestamp::from_millis((self.0 >> NONCE_BITS) as i64)
    }

    #[inline]
    pub fn nonce(self) -> u32 {
        (self.0 & NONCE_MASK) as u32
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        MessageId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg({:011x}:{:05x})", self.0 >> NONCE_BITS, self.nonce())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
