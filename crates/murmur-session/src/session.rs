//! Session runtime - commands in, envelopes out
//!
//! A [`Session`] owns one peer's entire world: identity, clock, state,
//! timers and the two queues that connect it to the channel. Everything
//! funnels through `&mut self`, so there is exactly one writer and no
//! locking. User commands apply optimistically to local state and queue an
//! envelope; [`Session::tick`] drains received deliveries and fires due
//! deadlines.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use murmur_channel::Delivery;
use murmur_core::{
    ChatMessage, Clock, CounterAction, CounterStep, MessageId, Peer, Theme, Timestamp,
};
use murmur_state::{ApplyReport, Reconciler};
use murmur_wire::{Envelope, MAX_TEXT_BYTES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::Identity;

/// Session configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Channel topic to join
    pub topic: String,
    /// Typing indicator lifetime after the last keystroke
    pub typing_timeout: Duration,
    /// Interval between full-state broadcasts
    pub sync_interval: Duration,
    /// Runner cadence
    pub tick_interval: Duration,
    /// Fixed clock epoch for tests; wall clock when `None`
    pub clock_start: Option<Timestamp>,
    /// Maximum queued inbound deliveries
    pub max_inbox: usize,
    /// Maximum queued outbound envelopes
    pub max_outbox: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            topic: "murmur-dashboard".to_owned(),
            typing_timeout: Duration::from_secs(3),
            sync_interval: Duration::from_secs(5),
            tick_interval: Duration::from_millis(100),
            clock_start: None,
            max_inbox: 1024,
            max_outbox: 1024,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub ticks: u64,
    pub deliveries_queued: u64,
    pub outbound_queued: u64,
    pub outbound_popped: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub ignored: u64,
    pub tombstoned: u64,
    pub expired_on_arrival: u64,
    pub malformed: u64,
    pub expiries_fired: u64,
    pub typing_timeouts: u64,
    pub syncs_sent: u64,
}

/// One peer's runtime
pub struct Session {
    identity: Identity,
    config: SessionConfig,
    clock: Clock,
    reconciler: Reconciler,
    incoming: VecDeque<Delivery>,
    outgoing: VecDeque<Bytes>,
    stats: SessionStats,
    /// Nonce source for message ids
    rng: StdRng,
    /// Whether this session believes it is typing. Kept apart from the
    /// roster record so a merged snapshot can never confuse the local
    /// keystroke bookkeeping.
    typing: bool,
    running: bool,
}

impl Session {
    /// Session with a generated identity and default configuration
    pub fn new() -> Self {
        Session::with_identity(Identity::generate(), SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Session::with_identity(Identity::generate(), config)
    }

    pub fn with_identity(identity: Identity, config: SessionConfig) -> Self {
        let clock = match config.clock_start {
            Some(epoch) => Clock::starting_at(epoch),
            None => Clock::system(),
        };
        let local = identity.peer_record(clock.now());
        Session {
            rng: StdRng::seed_from_u64(identity.peer.0),
            identity,
            config,
            clock,
            reconciler: Reconciler::new(local),
            incoming: VecDeque::new(),
            outgoing: VecDeque::new(),
            stats: SessionStats::default(),
            typing: false,
            running: false,
        }
    }

    // ---- lifecycle ----

    /// Announce ourselves and arm the periodic sync
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        let now = self.clock.now();
        self.reconciler.store_mut().touch_local(now);
        let record = self.reconciler.store().local().clone();
        self.emit(&Envelope::Join(record));
        self.reconciler
            .timers_mut()
            .arm_sync(now, self.config.sync_interval);
        debug!("session {} joined '{}'", self.identity.peer, self.config.topic);
    }

    /// Announce departure and cancel every outstanding deadline
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.typing = false;
        self.emit(&Envelope::Leave {
            peer: self.identity.peer,
        });
        self.reconciler.timers_mut().clear();
        debug!("session {} left '{}'", self.identity.peer, self.config.topic);
    }

    /// One cooperative step: advance the clock by `dt`, drain received
    /// deliveries, then fire whatever deadlines came due.
    pub fn tick(&mut self, dt: Duration) {
        self.stats.ticks += 1;
        let now = self.clock.advance(dt);

        // Deliveries first so timer decisions see the freshest state
        let mut report = ApplyReport::default();
        while let Some(delivery) = self.incoming.pop_front() {
            let outcome = self.reconciler.apply_delivery(
                delivery.seq,
                delivery.sender,
                &delivery.payload,
                now,
            );
            if let Some(outcome) = outcome {
                report.record(outcome);
            }
        }
        self.absorb(&report);

        self.stats.expiries_fired += self.reconciler.expire_due(now) as u64;

        if self.reconciler.timers_mut().typing_due(now) {
            self.stats.typing_timeouts += 1;
            if self.typing {
                self.typing = false;
                self.reconciler
                    .store_mut()
                    .set_typing(self.identity.peer, false);
                self.emit(&Envelope::Typing {
                    peer: self.identity.peer,
                    is_typing: false,
                });
            }
        }

        if self.reconciler.timers_mut().sync_due(now) {
            let snapshot = self.reconciler.store().snapshot();
            self.emit(&Envelope::FullSync(snapshot));
            self.stats.syncs_sent += 1;
            self.reconciler
                .timers_mut()
                .arm_sync(now, self.config.sync_interval);
        }

        // Expiries noticed this tick, locally or inside a merge
        for id in self.reconciler.take_delete_requests() {
            self.emit(&Envelope::MessageDelete {
                message: id,
                requested_by: self.identity.peer,
            });
        }
    }

    // ---- commands ----

    /// Post a message, optionally expiring after `ttl`. A blank body is a
    /// silent no-op and an oversize one is refused; neither is an error.
    pub fn send_message(&mut self, body: &str, ttl: Option<Duration>) -> Option<MessageId> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() > MAX_TEXT_BYTES {
            warn!("refusing message body of {} bytes", trimmed.len());
            return None;
        }

        let now = self.clock.now();
        let id = MessageId::from_parts(now, self.rng.gen());
        let mut msg = ChatMessage::new(
            id,
            self.identity.peer,
            self.identity.name.clone(),
            trimmed,
            now,
        );
        match ttl {
            Some(ttl) if !ttl.is_zero() => {
                let at = now + ttl;
                msg = msg.with_expiry(at);
                self.reconciler.timers_mut().arm_expiry(id, at);
            }
            _ => {}
        }

        self.reconciler.store_mut().insert_message(msg.clone());
        self.reconciler.store_mut().touch_local(now);
        self.emit(&Envelope::MessageAdd(msg));
        Some(id)
    }

    /// Delete a message everywhere. Broadcast regardless of whether we
    /// still hold it, so peers that do will drop it too.
    pub fn delete_message(&mut self, id: MessageId) {
        self.reconciler.delete_local(id);
        self.reconciler.store_mut().touch_local(self.clock.now());
        self.emit(&Envelope::MessageDelete {
            message: id,
            requested_by: self.identity.peer,
        });
    }

    /// Keystroke bookkeeping. `true` broadcasts and refreshes the
    /// inactivity deadline on every call; `false` stops immediately.
    pub fn set_typing(&mut self, typing: bool) {
        let now = self.clock.now();
        if typing {
            self.reconciler
                .timers_mut()
                .arm_typing(now, self.config.typing_timeout);
            self.reconciler.store_mut().touch_local(now);
            self.typing = true;
            self.reconciler
                .store_mut()
                .set_typing(self.identity.peer, true);
            self.emit(&Envelope::Typing {
                peer: self.identity.peer,
                is_typing: true,
            });
        } else {
            self.reconciler.timers_mut().cancel_typing();
            if self.typing {
                self.typing = false;
                self.reconciler
                    .store_mut()
                    .set_typing(self.identity.peer, false);
                self.emit(&Envelope::Typing {
                    peer: self.identity.peer,
                    is_typing: false,
                });
            }
        }
    }

    /// Step the shared counter up or down, attributed to us
    pub fn adjust_counter(&mut self, step: CounterStep) {
        let now = self.clock.now();
        let action = CounterAction {
            author: self.identity.peer,
            author_name: self.identity.name.clone(),
            at: now,
        };
        self.reconciler.store_mut().apply_step(step, action.clone());
        self.reconciler.store_mut().touch_local(now);
        let envelope = match step {
            CounterStep::Up => Envelope::CounterInc(action),
            CounterStep::Down => Envelope::CounterDec(action),
        };
        self.emit(&envelope);
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.reconciler.store_mut().set_theme(theme);
        self.reconciler.store_mut().touch_local(self.clock.now());
        self.emit(&Envelope::ThemeSet(theme));
    }

    pub fn toggle_theme(&mut self) {
        let next = self.reconciler.store().theme().toggled();
        self.set_theme(next);
    }

    /// Window blur hook: a hidden session should not look like it is
    /// mid-keystroke
    pub fn handle_focus_lost(&mut self) {
        if self.typing {
            self.set_typing(false);
        }
    }

    // ---- channel plumbing ----

    pub fn queue_delivery(&mut self, delivery: Delivery) {
        if self.incoming.len() < self.config.max_inbox {
            self.incoming.push_back(delivery);
            self.stats.deliveries_queued += 1;
        }
    }

    pub fn pop_outbound(&mut self) -> Option<Bytes> {
        let bytes = self.outgoing.pop_front();
        if bytes.is_some() {
            self.stats.outbound_popped += 1;
        }
        bytes
    }

    // ---- views ----

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_peer(&self) -> &Peer {
        self.reconciler.store().local()
    }

    pub fn peers(&self) -> &[Peer] {
        self.reconciler.store().peers()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.reconciler.store().messages()
    }

    pub fn counter(&self) -> i64 {
        self.reconciler.store().counter()
    }

    pub fn last_counter_action(&self) -> Option<&CounterAction> {
        self.reconciler.store().last_action()
    }

    pub fn theme(&self) -> Theme {
        self.reconciler.store().theme()
    }

    pub fn cursor(&self) -> u64 {
        self.reconciler.store().cursor()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    // ---- internals ----

    fn emit(&mut self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(bytes) => {
                if self.outgoing.len() < self.config.max_outbox {
                    self.outgoing.push_back(bytes);
                    self.stats.outbound_queued += 1;
                } else {
                    warn!("outbox full, dropping {:?}", envelope.kind());
                }
            }
            Err(err) => {
                warn!("failed to encode {:?}: {}", envelope.kind(), err);
            }
        }
    }

    fn absorb(&mut self, report: &ApplyReport) {
        self.stats.applied += report.applied as u64;
        self.stats.duplicates += report.duplicates as u64;
        self.stats.ignored += report.ignored as u64;
        self.stats.tombstoned += report.tombstoned as u64;
        self.stats.expired_on_arrival += report.expired_on_arrival as u64;
        self.stats.malformed += report.malformed as u64;
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::PeerId;

    fn test_config() -> SessionConfig {
        SessionConfig {
            clock_start: Some(Timestamp::from_millis(1_000)),
            ..Default::default()
        }
    }

    fn session(seed: u64) -> Session {
        Session::with_identity(Identity::from_seed(seed), test_config())
    }

    fn drain(session: &mut Session) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Some(bytes) = session.pop_outbound() {
            out.push(Envelope::decode(&bytes).unwrap());
        }
        out
    }

    fn delivery(seq: u64, sender: PeerId, envelope: &Envelope) -> Delivery {
        Delivery {
            seq,
            sender,
            payload: envelope.encode().unwrap(),
        }
    }

    #[test]
    fn test_start_announces_join_once() {
        let mut s = session(1);
        s.start();
        s.start();

        let sent = drain(&mut s);
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Envelope::Join(peer) => assert_eq!(peer.id, s.identity().peer),
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_periodic_sync_fires_and_rearms() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        s.tick(Duration::from_secs(5));
        let sent = drain(&mut s);
        assert!(matches!(&sent[..], [Envelope::FullSync(_)]));

        s.tick(Duration::from_secs(5));
        let sent = drain(&mut s);
        assert!(matches!(&sent[..], [Envelope::FullSync(_)]));
    }

    #[test]
    fn test_send_message_blank_is_noop() {
        let mut s = session(1);

        assert_eq!(s.send_message("   \n\t ", None), None);
        assert!(s.messages().is_empty());
        assert!(drain(&mut s).is_empty());
    }

    #[test]
    fn test_send_message_oversize_is_refused() {
        let mut s = session(1);
        let huge = "x".repeat(MAX_TEXT_BYTES + 1);

        assert_eq!(s.send_message(&huge, None), None);
        assert!(drain(&mut s).is_empty());
    }

    #[test]
    fn test_send_message_applies_and_broadcasts() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        let id = s.send_message("  hello room  ", None).unwrap();

        assert_eq!(s.messages().len(), 1);
        assert_eq!(s.messages()[0].body, "hello room");
        assert_eq!(s.messages()[0].id, id);
        let sent = drain(&mut s);
        assert!(matches!(&sent[..], [Envelope::MessageAdd(m)] if m.id == id));
    }

    #[test]
    fn test_message_ttl_expires_and_announces_delete() {
        let mut s = session(1);
        s.start();
        let id = s
            .send_message("fleeting", Some(Duration::from_secs(3)))
            .unwrap();
        drain(&mut s);

        s.tick(Duration::from_secs(2));
        assert_eq!(s.messages().len(), 1);

        s.tick(Duration::from_secs(1));
        assert!(s.messages().is_empty());
        let sent = drain(&mut s);
        assert!(
            matches!(&sent[..], [Envelope::MessageDelete { message, .. }] if *message == id)
        );
        assert_eq!(s.stats().expiries_fired, 1);
    }

    #[test]
    fn test_typing_rebroadcasts_every_keystroke() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        // A receiver that missed the first indicator catches the next one
        s.set_typing(true);
        s.set_typing(true);
        let sent = drain(&mut s);
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .all(|e| matches!(e, Envelope::Typing { is_typing: true, .. })));
        assert!(s.is_typing());
    }

    #[test]
    fn test_typing_times_out_after_inactivity() {
        let mut s = session(1);
        s.start();
        s.set_typing(true);
        drain(&mut s);

        s.tick(Duration::from_secs(1));
        assert!(s.is_typing());

        // Keystroke refreshes the deadline and re-announces
        s.set_typing(true);
        drain(&mut s);
        s.tick(Duration::from_secs(2));
        assert!(s.is_typing());

        s.tick(Duration::from_secs(1));
        assert!(!s.is_typing());
        let sent = drain(&mut s);
        assert!(matches!(
            &sent[..],
            [Envelope::Typing { is_typing: false, .. }]
        ));
    }

    #[test]
    fn test_focus_lost_stops_typing() {
        let mut s = session(1);
        s.start();
        s.set_typing(true);
        drain(&mut s);

        s.handle_focus_lost();
        s.handle_focus_lost();

        let sent = drain(&mut s);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Envelope::Typing { is_typing: false, .. }));
    }

    #[test]
    fn test_counter_commands_attribute_locally() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        s.adjust_counter(CounterStep::Up);
        s.adjust_counter(CounterStep::Up);
        s.adjust_counter(CounterStep::Down);

        assert_eq!(s.counter(), 1);
        assert_eq!(s.last_counter_action().unwrap().author, s.identity().peer);
        let sent = drain(&mut s);
        assert!(matches!(
            &sent[..],
            [
                Envelope::CounterInc(_),
                Envelope::CounterInc(_),
                Envelope::CounterDec(_)
            ]
        ));
    }

    #[test]
    fn test_theme_toggle_broadcasts() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        s.toggle_theme();
        assert_eq!(s.theme(), Theme::Dark);
        s.toggle_theme();
        assert_eq!(s.theme(), Theme::Light);

        let sent = drain(&mut s);
        assert!(matches!(
            &sent[..],
            [Envelope::ThemeSet(Theme::Dark), Envelope::ThemeSet(Theme::Light)]
        ));
    }

    #[test]
    fn test_delete_unknown_message_still_broadcasts() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        let stranger = MessageId::new(77);
        s.delete_message(stranger);

        let sent = drain(&mut s);
        assert!(
            matches!(&sent[..], [Envelope::MessageDelete { message, .. }] if *message == stranger)
        );
    }

    #[test]
    fn test_received_join_lands_in_roster() {
        let mut s = session(1);
        s.start();
        drain(&mut s);

        let guest = Peer::new(PeerId::new(42), "Calm Otter", Timestamp::from_millis(900));
        s.queue_delivery(delivery(0, guest.id, &Envelope::Join(guest.clone())));
        s.tick(Duration::from_millis(100));

        assert!(s.peers().iter().any(|p| p.id == guest.id));
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.stats().applied, 1);
    }

    #[test]
    fn test_stop_announces_leave_and_silences_timers() {
        let mut s = session(1);
        s.start();
        s.send_message("stay", Some(Duration::from_secs(5)));
        drain(&mut s);

        s.stop();
        s.stop();
        let sent = drain(&mut s);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Envelope::Leave { .. }));

        // No sync, no expiry broadcast after shutdown
        s.tick(Duration::from_secs(30));
        assert!(drain(&mut s).is_empty());
    }

    #[test]
    fn test_outbox_is_bounded() {
        let mut s = Session::with_identity(
            Identity::from_seed(1),
            SessionConfig {
                clock_start: Some(Timestamp::from_millis(1_000)),
                max_outbox: 2,
                ..Default::default()
            },
        );

        s.set_theme(Theme::Dark);
        s.set_theme(Theme::Light);
        s.set_theme(Theme::Dark);

        assert_eq!(drain(&mut s).len(), 2);
    }
}
