//! Local state store - one peer's copy of the shared document

use std::collections::HashSet;

use murmur_core::{
    ChatMessage, CounterAction, CounterStep, MessageId, Peer, PeerId, Snapshot, Theme, Timestamp,
};

/// One peer's working copy of the shared state
///
/// The roster always contains the local peer's record; messages stay sorted
/// by `(created_at, id)`; tombstoned ids are never visible. Mutators return
/// whether anything changed so callers can skip redundant work.
#[derive(Debug)]
pub struct StateStore {
    local_id: PeerId,
    peers: Vec<Peer>,
    messages: Vec<ChatMessage>,
    counter: i64,
    last_action: Option<CounterAction>,
    theme: Theme,
    tombstones: HashSet<MessageId>,
    cursor: u64,
}

impl StateStore {
    pub fn new(local: Peer) -> Self {
        StateStore {
            local_id: local.id,
            peers: vec![local],
            messages: Vec::new(),
            counter: 0,
            last_action: None,
            theme: Theme::default(),
            tombstones: HashSet::new(),
            cursor: 0,
        }
    }

    // --- roster ---

    #[inline]
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// The local peer's record, always present in the roster
    pub fn local(&self) -> &Peer {
        self.peers
            .iter()
            .find(|p| p.id == self.local_id)
            .expect("local peer record present")
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Add a peer record unless the id is already known
    pub fn add_peer(&mut self, peer: Peer) -> bool {
        if self.peers.iter().any(|p| p.id == peer.id) {
            return false;
        }
        self.peers.push(peer);
        true
    }

    /// Remove a peer record. The local record cannot be removed, even by a
    /// remote envelope naming our id.
    pub fn remove_peer(&mut self, id: PeerId) -> bool {
        if id == self.local_id {
            return false;
        }
        let before = self.peers.len();
        self.peers.retain(|p| p.id != id);
        self.peers.len() != before
    }

    /// Flip a known peer's typing flag; false if unknown or unchanged
    pub fn set_typing(&mut self, id: PeerId, is_typing: bool) -> bool {
        match self.peers.iter_mut().find(|p| p.id == id) {
            Some(peer) if peer.is_typing != is_typing => {
                peer.is_typing = is_typing;
                true
            }
            _ => false,
        }
    }

    /// Refresh the local record's activity time
    pub fn touch_local(&mut self, now: Timestamp) {
        if let Some(local) = self.peers.iter_mut().find(|p| p.id == self.local_id) {
            local.touch(now);
        }
    }

    /// Replace the whole roster. The caller guarantees the local record is
    /// in the new roster and ids are unique.
    pub fn replace_peers(&mut self, peers: Vec<Peer>) {
        debug_assert!(peers.iter().any(|p| p.id == self.local_id));
        self.peers = peers;
    }

    // --- messages ---

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[inline]
    pub fn contains_message(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Insert keeping `(created_at, id)` order; refused for known or
    /// tombstoned ids
    pub fn insert_message(&mut self, msg: ChatMessage) -> bool {
        if self.tombstones.contains(&msg.id) || self.contains_message(msg.id) {
            return false;
        }
        let pos = self
            .messages
            .binary_search_by(|m| (m.created_at, m.id).cmp(&(msg.created_at, msg.id)))
            .unwrap_or_else(|p| p);
        self.messages.insert(pos, msg);
        true
    }

    pub fn remove_message(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Replace the message list. The caller guarantees order and that no
    /// tombstoned id is present.
    pub fn replace_messages(&mut self, messages: Vec<ChatMessage>) {
        debug_assert!(messages.iter().all(|m| !self.tombstones.contains(&m.id)));
        self.messages = messages;
    }

    // --- tombstones ---

    #[inline]
    pub fn is_tombstoned(&self, id: MessageId) -> bool {
        self.tombstones.contains(&id)
    }

    /// Record a deletion forever; true if the id was not yet tombstoned
    pub fn tombstone(&mut self, id: MessageId) -> bool {
        self.tombstones.insert(id)
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    // --- counter and theme ---

    #[inline]
    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn last_action(&self) -> Option<&CounterAction> {
        self.last_action.as_ref()
    }

    /// Apply a single increment or decrement. The attribution always
    /// replaces the previous one: last delivery wins, not wall clock.
    pub fn apply_step(&mut self, step: CounterStep, action: CounterAction) {
        self.counter += step.delta();
        self.last_action = Some(action);
    }

    /// Adopt counter state wholesale from an accepted snapshot
    pub fn adopt_counter(&mut self, counter: i64, action: Option<CounterAction>) -> bool {
        let changed = self.counter != counter || (action.is_some() && action != self.last_action);
        self.counter = counter;
        if action.is_some() {
            self.last_action = action;
        }
        changed
    }

    #[inline]
    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) -> bool {
        if self.theme == theme {
            return false;
        }
        self.theme = theme;
        true
    }

    // --- delivery cursor ---

    /// First delivery sequence not yet processed
    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Move the cursor past `seq`; never moves backwards
    pub fn advance_cursor(&mut self, seq: u64) {
        self.cursor = self.cursor.max(seq + 1);
    }

    // --- snapshot ---

    /// Full-state payload for a sync broadcast, tombstoned ids filtered
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            peers: self.peers.clone(),
            messages: self
                .messages
                .iter()
                .filter(|m| !self.tombstones.contains(&m.id))
                .cloned()
                .collect(),
            counter: self.counter,
            last_action: self.last_action.clone(),
            theme: self.theme,
        }
    }
}
