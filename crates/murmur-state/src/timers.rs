//! Timer registry - every pending deadline in one place
//!
//! Deadlines are data, not callbacks: the owning session polls for due
//! entries from its tick loop against its own clock. Arm on create, cancel
//! on every exit path; a deadline for an entity that no longer exists must
//! never fire.

use std::collections::HashMap;
use std::time::Duration;

use murmur_core::{MessageId, Timestamp};

/// Pending deadlines for one session
#[derive(Debug, Default)]
pub struct TimerRegistry {
    expiry: HashMap<MessageId, Timestamp>,
    typing_deadline: Option<Timestamp>,
    sync_deadline: Option<Timestamp>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        TimerRegistry::default()
    }

    // --- message expiry ---

    /// Arm (or re-arm) the expiry deadline for a message
    pub fn arm_expiry(&mut self, id: MessageId, at: Timestamp) {
        self.expiry.insert(id, at);
    }

    /// Drop a message's deadline; true if one was pending
    pub fn cancel_expiry(&mut self, id: MessageId) -> bool {
        self.expiry.remove(&id).is_some()
    }

    #[inline]
    pub fn has_expiry(&self, id: MessageId) -> bool {
        self.expiry.contains_key(&id)
    }

    pub fn expiry_count(&self) -> usize {
        self.expiry.len()
    }

    /// Drain every deadline that has passed, oldest first. Ties are broken
    /// by id so the fire order is deterministic.
    pub fn due_expirations(&mut self, now: Timestamp) -> Vec<MessageId> {
        let mut due: Vec<(Timestamp, MessageId)> = self
            .expiry
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort_unstable();
        for (_, id) in &due {
            self.expiry.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    // --- typing inactivity ---

    /// Schedule the typing-stop deadline `timeout` after `now`, replacing
    /// any previous one
    pub fn arm_typing(&mut self, now: Timestamp, timeout: Duration) {
        self.typing_deadline = Some(now + timeout);
    }

    pub fn cancel_typing(&mut self) {
        self.typing_deadline = None;
    }

    /// True exactly once when the typing deadline passes
    pub fn typing_due(&mut self, now: Timestamp) -> bool {
        match self.typing_deadline {
            Some(at) if at <= now => {
                self.typing_deadline = None;
                true
            }
            _ => false,
        }
    }

    // --- periodic sync ---

    pub fn arm_sync(&mut self, now: Timestamp, interval: Duration) {
        self.sync_deadline = Some(now + interval);
    }

    pub fn cancel_sync(&mut self) {
        self.sync_deadline = None;
    }

    /// True once per armed deadline; the caller re-arms for the next round
    pub fn sync_due(&mut self, now: Timestamp) -> bool {
        match self.sync_deadline {
            Some(at) if at <= now => {
                self.sync_deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Cancel everything; used at session shutdown
    pub fn clear(&mut self) {
        self.expiry.clear();
        self.typing_deadline = None;
        self.sync_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_expirations_in_order() {
        let mut timers = TimerRegistry::new();
        timers.arm_expiry(MessageId::new(3), Timestamp::from_millis(300));
        timers.arm_expiry(MessageId::new(1), Timestamp::from_millis(100));
        timers.arm_expiry(MessageId::new(2), Timestamp::from_millis(200));
        timers.arm_expiry(MessageId::new(9), Timestamp::from_millis(9000));

        let due = timers.due_expirations(Timestamp::from_millis(500));
        assert_eq!(due, vec![MessageId::new(1), MessageId::new(2), MessageId::new(3)]);

        // Drained entries do not fire twice
        assert!(timers.due_expirations(Timestamp::from_millis(500)).is_empty());
        assert!(timers.has_expiry(MessageId::new(9)));
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let mut timers = TimerRegistry::new();
        timers.arm_expiry(MessageId::new(1), Timestamp::from_millis(100));

        assert!(timers.cancel_expiry(MessageId::new(1)));
        assert!(!timers.cancel_expiry(MessageId::new(1)));
        assert!(timers.due_expirations(Timestamp::from_millis(200)).is_empty());
    }

    #[test]
    fn test_typing_deadline_fires_once() {
        let mut timers = TimerRegistry::new();
        let now = Timestamp::from_millis(1000);
        timers.arm_typing(now, Duration::from_secs(3));

        assert!(!timers.typing_due(Timestamp::from_millis(3999)));
        assert!(timers.typing_due(Timestamp::from_millis(4000)));
        assert!(!timers.typing_due(Timestamp::from_millis(9000)));
    }

    #[test]
    fn test_typing_rearm_pushes_deadline() {
        let mut timers = TimerRegistry::new();
        timers.arm_typing(Timestamp::from_millis(0), Duration::from_secs(3));
        timers.arm_typing(Timestamp::from_millis(2000), Duration::from_secs(3));

        assert!(!timers.typing_due(Timestamp::from_millis(3000)));
        assert!(timers.typing_due(Timestamp::from_millis(5000)));
    }

    #[test]
    fn test_clear_cancels_everything() {
        let mut timers = TimerRegistry::new();
        timers.arm_expiry(MessageId::new(1), Timestamp::from_millis(10));
        timers.arm_typing(Timestamp::ZERO, Duration::from_secs(3));
        timers.arm_sync(Timestamp::ZERO, Duration::from_secs(5));

        timers.clear();

        assert!(timers.due_expirations(Timestamp::MAX).is_empty());
        assert!(!timers.typing_due(Timestamp::MAX));
        assert!(!timers.sync_due(Timestamp::MAX));
    }
}
