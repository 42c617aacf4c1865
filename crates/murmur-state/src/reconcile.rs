//! Reconciliation - applying received envelopes so peers converge
//!
//! Every rule here is idempotent: the channel is at-least-once and
//! unordered, so the same envelope can show up again long after it was
//! first applied. The periodic full-sync merge repairs whatever point
//! deliveries missed.

use murmur_core::{ChatMessage, CounterStep, MessageId, Peer, PeerId, Snapshot, Timestamp};
use murmur_wire::Envelope;
use tracing::{debug, warn};

use crate::{StateStore, TimerRegistry};

/// What happened to one received envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state changed
    Applied,
    /// Already known; nothing to do
    Duplicate,
    /// Valid but irrelevant here (unknown peer, unchanged value, stale sync)
    Ignored,
    /// The message was deleted before this add arrived
    Tombstoned,
    /// The message arrived with its expiry already elapsed
    ExpiredOnArrival(MessageId),
    /// The payload did not decode; skipped
    Malformed,
}

/// Counts for a batch of deliveries
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyReport {
    pub applied: u32,
    pub duplicates: u32,
    pub ignored: u32,
    pub tombstoned: u32,
    pub expired_on_arrival: u32,
    pub malformed: u32,
}

impl ApplyReport {
    pub fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Duplicate => self.duplicates += 1,
            ApplyOutcome::Ignored => self.ignored += 1,
            ApplyOutcome::Tombstoned => self.tombstoned += 1,
            ApplyOutcome::ExpiredOnArrival(_) => self.expired_on_arrival += 1,
            ApplyOutcome::Malformed => self.malformed += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.applied
            + self.duplicates
            + self.ignored
            + self.tombstoned
            + self.expired_on_arrival
            + self.malformed
    }
}

/// Applies envelopes to one peer's store and timers
pub struct Reconciler {
    store: StateStore,
    timers: TimerRegistry,
    /// Deletes this peer must broadcast: messages that expired here, or
    /// arrived already dead
    delete_requests: Vec<MessageId>,
}

impl Reconciler {
    pub fn new(local: Peer) -> Self {
        Reconciler {
            store: StateStore::new(local),
            timers: TimerRegistry::new(),
            delete_requests: Vec::new(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerRegistry {
        &mut self.timers
    }

    /// Process one delivery from the channel log
    ///
    /// The cursor guarantees each log entry is applied at most once even
    /// when the same entries are read again in a later batch. Entries this
    /// peer published itself are skipped. Returns `None` when the entry was
    /// not processed at all.
    pub fn apply_delivery(
        &mut self,
        seq: u64,
        sender: PeerId,
        payload: &[u8],
        now: Timestamp,
    ) -> Option<ApplyOutcome> {
        if seq < self.store.cursor() {
            return None;
        }
        self.store.advance_cursor(seq);
        if sender == self.store.local_id() {
            return None;
        }
        Some(self.apply_bytes(payload, now))
    }

    /// Decode and apply; a payload that does not parse is skipped, never an
    /// error for the session
    pub fn apply_bytes(&mut self, payload: &[u8], now: Timestamp) -> ApplyOutcome {
        match Envelope::decode(payload) {
            Ok(envelope) => self.apply(envelope, now),
            Err(err) => {
                warn!("dropping malformed delivery: {}", err);
                ApplyOutcome::Malformed
            }
        }
    }

    /// Apply one decoded envelope
    pub fn apply(&mut self, envelope: Envelope, now: Timestamp) -> ApplyOutcome {
        match envelope {
            Envelope::Join(peer) => {
                if self.store.add_peer(peer) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Duplicate
                }
            }
            Envelope::Leave { peer } => {
                if self.store.remove_peer(peer) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Ignored
                }
            }
            Envelope::Typing { peer, is_typing } => {
                if self.store.set_typing(peer, is_typing) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Ignored
                }
            }
            Envelope::MessageAdd(msg) => self.admit_message(msg, now),
            Envelope::MessageDelete {
                message,
                requested_by,
            } => {
                if self.delete_local(message) {
                    ApplyOutcome::Applied
                } else {
                    debug!("redundant delete of {} from {}", message, requested_by);
                    ApplyOutcome::Duplicate
                }
            }
            Envelope::CounterInc(action) => {
                self.store.apply_step(CounterStep::Up, action);
                ApplyOutcome::Applied
            }
            Envelope::CounterDec(action) => {
                self.store.apply_step(CounterStep::Down, action);
                ApplyOutcome::Applied
            }
            Envelope::ThemeSet(theme) => {
                if self.store.set_theme(theme) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Ignored
                }
            }
            Envelope::FullSync(snapshot) => self.merge_snapshot(snapshot, now),
        }
    }

    /// Full local delete: cancel the pending deadline and tombstone the id,
    /// then drop the message if still visible. True if any of those did
    /// something.
    pub fn delete_local(&mut self, id: MessageId) -> bool {
        let cancelled = self.timers.cancel_expiry(id);
        let tombstoned = self.store.tombstone(id);
        let removed = self.store.remove_message(id);
        cancelled || tombstoned || removed
    }

    /// Fire every due expiry deadline, deleting locally and queueing a
    /// delete broadcast for each. Returns how many fired.
    pub fn expire_due(&mut self, now: Timestamp) -> usize {
        let due = self.timers.due_expirations(now);
        let fired = due.len();
        for id in due {
            if self.delete_local(id) {
                self.delete_requests.push(id);
            }
        }
        fired
    }

    /// Drain the ids whose deletion this peer must announce
    pub fn take_delete_requests(&mut self) -> Vec<MessageId> {
        std::mem::take(&mut self.delete_requests)
    }

    fn admit_message(&mut self, msg: ChatMessage, now: Timestamp) -> ApplyOutcome {
        if self.store.is_tombstoned(msg.id) {
            debug!("add for tombstoned message {}", msg.id);
            return ApplyOutcome::Tombstoned;
        }
        if self.store.contains_message(msg.id) {
            return ApplyOutcome::Duplicate;
        }
        if msg.expired_at(now) {
            // arrived dead: tombstone it and ask the others to drop it
            let id = msg.id;
            self.store.tombstone(id);
            self.delete_requests.push(id);
            return ApplyOutcome::ExpiredOnArrival(id);
        }
        if let Some(at) = msg.expires_at {
            self.timers.arm_expiry(msg.id, at);
        }
        self.store.insert_message(msg);
        ApplyOutcome::Applied
    }

    /// Anti-entropy merge of a full-state snapshot
    ///
    /// Counter and theme are gated on the snapshot's attribution being
    /// strictly newer than ours. Roster and messages merge regardless.
    fn merge_snapshot(&mut self, snapshot: Snapshot, now: Timestamp) -> ApplyOutcome {
        let Snapshot {
            peers,
            messages,
            counter,
            last_action,
            theme,
        } = snapshot;

        let accept = match (&last_action, self.store.last_action()) {
            (_, None) => true,
            (Some(remote), Some(local)) => remote.at > local.at,
            (None, Some(_)) => false,
        };

        let mut changed = false;
        if accept {
            changed |= self.store.adopt_counter(counter, last_action);
            changed |= self.store.set_theme(theme);
        } else {
            debug!("stale sync attribution: keeping local counter and theme");
        }

        changed |= self.merge_peers(peers);
        changed |= self.merge_messages(messages, now);

        if changed {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Ignored
        }
    }

    /// New roster = snapshot roster deduped by id, with our own record
    /// standing in for the sender's copy of us and appended if the sender
    /// did not know us. Skipped entirely when the id set would not change.
    fn merge_peers(&mut self, snapshot_peers: Vec<Peer>) -> bool {
        let local = self.store.local().clone();
        let mut merged: Vec<Peer> = Vec::with_capacity(snapshot_peers.len() + 1);
        for peer in snapshot_peers {
            if merged.iter().any(|p| p.id == peer.id) {
                continue;
            }
            // Our row is ours alone, never the sender's copy of us
            if peer.id == local.id {
                merged.push(local.clone());
            } else {
                merged.push(peer);
            }
        }
        if merged.iter().all(|p| p.id != local.id) {
            merged.push(local);
        }

        let mut current: Vec<PeerId> = self.store.peers().iter().map(|p| p.id).collect();
        let mut incoming: Vec<PeerId> = merged.iter().map(|p| p.id).collect();
        current.sort_unstable();
        incoming.sort_unstable();
        if current == incoming {
            return false;
        }

        self.store.replace_peers(merged);
        true
    }

    /// New message list = union by id of snapshot and local, minus
    /// tombstones, sorted by creation time. Our own copy wins for ids known
    /// on both sides. Skipped when the id sequence would not change.
    fn merge_messages(&mut self, snapshot_messages: Vec<ChatMessage>, now: Timestamp) -> bool {
        let mut changed = false;
        let mut merged: Vec<ChatMessage> = self.store.messages().to_vec();

        for msg in snapshot_messages {
            if self.store.is_tombstoned(msg.id) || merged.iter().any(|m| m.id == msg.id) {
                continue;
            }
            if msg.expired_at(now) {
                // dead on arrival via sync, same treatment as a dead add
                if self.delete_local(msg.id) {
                    self.delete_requests.push(msg.id);
                    changed = true;
                }
                continue;
            }
            // First learned through this sync, so no deadline was armed at
            // add time
            if let Some(at) = msg.expires_at {
                self.timers.arm_expiry(msg.id, at);
            }
            merged.push(msg);
        }
        merged.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let same_sequence = self
            .store
            .messages()
            .iter()
            .map(|m| m.id)
            .eq(merged.iter().map(|m| m.id));
        if same_sequence {
            return changed;
        }

        self.store.replace_messages(merged);
        true
    }
}
