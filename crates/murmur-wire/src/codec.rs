//! Byte codec for envelopes
//!
//! Layout: kind byte, fixed little-endian fields, `u16`-length-prefixed
//! UTF-8 strings, presence bytes for optional fields, `u16` counts for
//! snapshot collections. One envelope per delivery, nothing else in the
//! buffer.

use bytes::{BufMut, Bytes, BytesMut};
use murmur_core::{
    ChatMessage, CounterAction, MessageId, MurmurError, MurmurResult, Peer, PeerId, Snapshot,
    Theme, Timestamp,
};

use crate::{Envelope, EnvelopeKind};

/// Upper bound for any single string field, enforced on both sides
pub const MAX_TEXT_BYTES: usize = 4096;

const HAS_EXPIRY: u8 = 0x01;

/// Bounds-checked reader over a received buffer
struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, offset: 0 }
    }

    fn take(&mut self, n: usize) -> MurmurResult<&'a [u8]> {
        let end = self.offset + n;
        if self.buf.len() < end {
            return Err(MurmurError::Truncated {
                expected: end,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> MurmurResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> MurmurResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u64(&mut self) -> MurmurResult<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    fn i64(&mut self) -> MurmurResult<i64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(i64::from_le_bytes(bytes))
    }

    fn string(&mut self, field: &'static str) -> MurmurResult<String> {
        let len = self.u16()? as usize;
        if len > MAX_TEXT_BYTES {
            return Err(MurmurError::FieldTooLong {
                field,
                len,
                max: MAX_TEXT_BYTES,
            });
        }
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| MurmurError::InvalidUtf8(field))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

fn put_string(buf: &mut BytesMut, field: &'static str, s: &str) -> MurmurResult<()> {
    let len = s.len();
    if len > MAX_TEXT_BYTES {
        return Err(MurmurError::FieldTooLong {
            field,
            len,
            max: MAX_TEXT_BYTES,
        });
    }
    buf.put_u16_le(len as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_count(buf: &mut BytesMut, field: &'static str, count: usize) -> MurmurResult<()> {
    if count > u16::MAX as usize {
        return Err(MurmurError::FieldTooLong {
            field,
            len: count,
            max: u16::MAX as usize,
        });
    }
    buf.put_u16_le(count as u16);
    Ok(())
}

fn put_theme(buf: &mut BytesMut, theme: Theme) {
    buf.put_u8(match theme {
        Theme::Light => 0,
        Theme::Dark => 1,
    });
}

fn read_theme(r: &mut Reader<'_>) -> MurmurResult<Theme> {
    match r.u8()? {
        0 => Ok(Theme::Light),
        1 => Ok(Theme::Dark),
        other => Err(MurmurError::UnknownTheme(other)),
    }
}

fn put_peer(buf: &mut BytesMut, peer: &Peer) -> MurmurResult<()> {
    buf.put_u64_le(peer.id.0);
    buf.put_i64_le(peer.last_activity.as_millis());
    buf.put_u8(peer.is_typing as u8);
    put_string(buf, "peer name", &peer.name)
}

fn read_peer(r: &mut Reader<'_>) -> MurmurResult<Peer> {
    let id = PeerId::new(r.u64()?);
    let last_activity = Timestamp::from_millis(r.i64()?);
    let is_typing = r.u8()? != 0;
    let name = r.string("peer name")?;
    Ok(Peer {
        id,
        name,
        last_activity,
        is_typing,
    })
}

fn put_message(buf: &mut BytesMut, msg: &ChatMessage) -> MurmurResult<()> {
    buf.put_u64_le(msg.id.0);
    buf.put_u64_le(msg.author.0);
    buf.put_i64_le(msg.created_at.as_millis());
    buf.put_u8(if msg.expires_at.is_some() {
        HAS_EXPIRY
    } else {
        0
    });
    if let Some(at) = msg.expires_at {
        buf.put_i64_le(at.as_millis());
    }
    put_string(buf, "author name", &msg.author_name)?;
    put_string(buf, "message body", &msg.body)
}

fn read_message(r: &mut Reader<'_>) -> MurmurResult<ChatMessage> {
    let id = MessageId::new(r.u64()?);
    let author = PeerId::new(r.u64()?);
    let created_at = Timestamp::from_millis(r.i64()?);
    let flags = r.u8()?;
    let expires_at = if flags & HAS_EXPIRY != 0 {
        Some(Timestamp::from_millis(r.i64()?))
    } else {
        None
    };
    let author_name = r.string("author name")?;
    let body = r.string("message body")?;
    Ok(ChatMessage {
        id,
        author,
        author_name,
        body,
        created_at,
        expires_at,
    })
}

fn put_action(buf: &mut BytesMut, action: &CounterAction) -> MurmurResult<()> {
    buf.put_u64_le(action.author.0);
    buf.put_i64_le(action.at.as_millis());
    put_string(buf, "author name", &action.author_name)
}

fn read_action(r: &mut Reader<'_>) -> MurmurResult<CounterAction> {
    let author = PeerId::new(r.u64()?);
    let at = Timestamp::from_millis(r.i64()?);
    let author_name = r.string("author name")?;
    Ok(CounterAction {
        author,
        author_name,
        at,
    })
}

impl Envelope {
    /// Serialize for broadcast
    pub fn encode(&self) -> MurmurResult<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.kind().to_byte());

        match self {
            Envelope::Join(peer) => put_peer(&mut buf, peer)?,
            Envelope::Leave { peer } => buf.put_u64_le(peer.0),
            Envelope::Typing { peer, is_typing } => {
                buf.put_u64_le(peer.0);
                buf.put_u8(*is_typing as u8);
            }
            Envelope::MessageAdd(msg) => put_message(&mut buf, msg)?,
            Envelope::MessageDelete {
                message,
                requested_by,
            } => {
                buf.put_u64_le(message.0);
                buf.put_u64_le(requested_by.0);
            }
            Envelope::CounterInc(action) | Envelope::CounterDec(action) => {
                put_action(&mut buf, action)?
            }
            Envelope::ThemeSet(theme) => put_theme(&mut buf, *theme),
            Envelope::FullSync(snapshot) => {
                buf.put_i64_le(snapshot.counter);
                put_theme(&mut buf, snapshot.theme);
                buf.put_u8(snapshot.last_action.is_some() as u8);
                if let Some(action) = &snapshot.last_action {
                    put_action(&mut buf, action)?;
                }
                put_count(&mut buf, "snapshot peers", snapshot.peers.len())?;
                for peer in &snapshot.peers {
                    put_peer(&mut buf, peer)?;
                }
                put_count(&mut buf, "snapshot messages", snapshot.messages.len())?;
                for msg in &snapshot.messages {
                    put_message(&mut buf, msg)?;
                }
            }
        }

        Ok(buf.freeze())
    }

    /// Parse a received delivery
    pub fn decode(buf: &[u8]) -> MurmurResult<Envelope> {
        let mut r = Reader::new(buf);
        let kind = EnvelopeKind::from_byte(r.u8()?)?;

        let envelope = match kind {
            EnvelopeKind::Join => Envelope::Join(read_peer(&mut r)?),
            EnvelopeKind::Leave => Envelope::Leave {
                peer: PeerId::new(r.u64()?),
            },
            EnvelopeKind::Typing => Envelope::Typing {
                peer: PeerId::new(r.u64()?),
                is_typing: r.u8()? != 0,
            },
            EnvelopeKind::MessageAdd => Envelope::MessageAdd(read_message(&mut r)?),
            EnvelopeKind::MessageDelete => Envelope::MessageDelete {
                message: MessageId::new(r.u64()?),
                requested_by: PeerId::new(r.u64()?),
            },
            EnvelopeKind::CounterInc => Envelope::CounterInc(read_action(&mut r)?),
            EnvelopeKind::CounterDec => Envelope::CounterDec(read_action(&mut r)?),
            EnvelopeKind::ThemeSet => Envelope::ThemeSet(read_theme(&mut r)?),
            EnvelopeKind::FullSync => {
                let counter = r.i64()?;
                let theme = read_theme(&mut r)?;
                let last_action = if r.u8()? != 0 {
                    Some(read_action(&mut r)?)
                } else {
                    None
                };
                let peer_count = r.u16()? as usize;
                let mut peers = Vec::with_capacity(peer_count.min(256));
                for _ in 0..peer_count {
                    peers.push(read_peer(&mut r)?);
                }
                let message_count = r.u16()? as usize;
                let mut messages = Vec::with_capacity(message_count.min(256));
                for _ in 0..message_count {
                    messages.push(read_message(&mut r)?);
                }
                Envelope::FullSync(Snapshot {
                    peers,
                    messages,
                    counter,
                    last_action,
                    theme,
                })
            }
        };

        if r.remaining() > 0 {
            return Err(MurmurError::TrailingBytes(r.remaining()));
        }
        Ok(envelope)
    }
}
