//! Envelope types - one variant per broadcast kind

use murmur_core::{
    ChatMessage, CounterAction, MessageId, MurmurError, MurmurResult, Peer, PeerId, Snapshot,
    Theme,
};

/// Envelope kind byte
///
/// Grouped by concern: presence 0x0_, messages 0x1_, counter 0x2_,
/// theme 0x3_, sync 0x4_. Gaps are reserved for future kinds; receivers
/// skip bytes they do not recognize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopeKind {
    Join = 0x01,
    Leave = 0x02,
    Typing = 0x03,
    MessageAdd = 0x10,
    MessageDelete = 0x11,
    CounterInc = 0x20,
    CounterDec = 0x21,
    ThemeSet = 0x30,
    FullSync = 0x40,
}

impl EnvelopeKind {
    pub fn from_byte(b: u8) -> MurmurResult<Self> {
        match b {
            0x01 => Ok(EnvelopeKind::Join),
            0x02 => Ok(EnvelopeKind::Leave),
            0x03 => Ok(EnvelopeKind::Typing),
            0x10 => Ok(EnvelopeKind::MessageAdd),
            0x11 => Ok(EnvelopeKind::MessageDelete),
            0x20 => Ok(EnvelopeKind::CounterInc),
            0x21 => Ok(EnvelopeKind::CounterDec),
            0x30 => Ok(EnvelopeKind::ThemeSet),
            0x40 => Ok(EnvelopeKind::FullSync),
            other => Err(MurmurError::UnknownKind(other)),
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A single broadcast to the session topic
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// A peer announces itself with its initial record
    Join(Peer),
    /// A peer is leaving; receivers drop its record
    Leave { peer: PeerId },
    /// Typing indicator flip for an already-known peer
    Typing { peer: PeerId, is_typing: bool },
    /// A new chat message
    MessageAdd(ChatMessage),
    /// Remove a message everywhere, permanently
    MessageDelete {
        message: MessageId,
        requested_by: PeerId,
    },
    /// Counter +1 with attribution
    CounterInc(CounterAction),
    /// Counter -1 with attribution
    CounterDec(CounterAction),
    /// Replace the shared theme
    ThemeSet(Theme),
    /// Periodic full-state snapshot for anti-entropy
    FullSync(Snapshot),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Join(_) => EnvelopeKind::Join,
            Envelope::Leave { .. } => EnvelopeKind::Leave,
            Envelope::Typing { .. } => EnvelopeKind::Typing,
            Envelope::MessageAdd(_) => EnvelopeKind::MessageAdd,
            Envelope::MessageDelete { .. } => EnvelopeKind::MessageDelete,
            Envelope::CounterInc(_) => EnvelopeKind::CounterInc,
            Envelope::CounterDec(_) => EnvelopeKind::CounterDec,
            Envelope::ThemeSet(_) => EnvelopeKind::ThemeSet,
            Envelope::FullSync(_) => EnvelopeKind::FullSync,
        }
    }
}
