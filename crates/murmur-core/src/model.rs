//! Shared state entities
//!
//! The replicated document is four independent fields: the peer roster, the
//! chat message list, a shared counter, and a theme flag. Every peer holds
//! its own copy; convergence is the reconciler's job, these types just hold
//! the data.

use crate::{MessageId, PeerId, Timestamp};

/// A participant in the session
///
/// Each peer is the sole writer of its own record; records for other peers
/// are advisory caches refreshed by presence traffic and full syncs.
#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub last_activity: Timestamp,
    pub is_typing: bool,
}

impl Peer {
    pub fn new(id: PeerId, name: impl Into<String>, joined_at: Timestamp) -> Self {
        Peer {
            id,
            name: name.into(),
            last_activity: joined_at,
            is_typing: false,
        }
    }

    /// Record activity from this peer
    #[inline]
    pub fn touch(&mut self, now: Timestamp) {
        self.last_activity = now;
    }
}

/// A chat message, immutable after creation except for removal
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author: PeerId,
    pub author_name: String,
    pub body: String,
    pub created_at: Timestamp,
    /// Absolute expiry deadline, if the sender gave the message a lifetime
    pub expires_at: Option<Timestamp>,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        author: PeerId,
        author_name: impl Into<String>,
        body: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        ChatMessage {
            id,
            author,
            author_name: author_name.into(),
            body: body.into(),
            created_at,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, at: Timestamp) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// True once the expiry deadline has passed
    #[inline]
    pub fn expired_at(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Direction of a counter adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterStep {
    Up,
    Down,
}

impl CounterStep {
    #[inline]
    pub fn delta(self) -> i64 {
        match self {
            CounterStep::Up => 1,
            CounterStep::Down => -1,
        }
    }
}

/// Attribution for the most recent counter change
///
/// Doubles as the recency witness for the full-sync counter gate: a snapshot
/// only overwrites counter and theme when its action is newer than ours.
#[derive(Clone, Debug, PartialEq)]
pub struct CounterAction {
    pub author: PeerId,
    pub author_name: String,
    pub at: Timestamp,
}

/// Shared UI theme flag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[inline]
    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Full-state payload carried by periodic sync broadcasts
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub peers: Vec<Peer>,
    pub messages: Vec<ChatMessage>,
    pub counter: i64,
    pub last_action: Option<CounterAction>,
    pub theme: Theme,
}
