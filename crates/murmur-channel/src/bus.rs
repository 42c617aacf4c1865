//! Topic bus with per-subscriber delivery logs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use murmur_core::PeerId;
use parking_lot::Mutex;
use tracing::debug;

/// Default cap on retained entries per subscriber log
pub const DEFAULT_MAX_RETAINED: usize = 1024;

/// One entry in a subscriber's delivery log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Position in this subscriber's log; absolute, survives pruning
    pub seq: u64,
    pub sender: PeerId,
    pub payload: Bytes,
}

struct SubscriberLog {
    entries: VecDeque<Delivery>,
    next_seq: u64,
}

impl SubscriberLog {
    fn new() -> Self {
        SubscriberLog {
            entries: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn append(&mut self, sender: PeerId, payload: Bytes, max_retained: usize) {
        self.entries.push_back(Delivery {
            seq: self.next_seq,
            sender,
            payload,
        });
        self.next_seq += 1;
        while self.entries.len() > max_retained {
            self.entries.pop_front();
        }
    }
}

struct BusInner {
    topics: HashMap<String, HashMap<PeerId, SubscriberLog>>,
    max_retained: usize,
}

/// Registry of named topics shared by every session in the process
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Mutex<BusInner>>,
}

impl LocalBus {
    pub fn new() -> Self {
        LocalBus::with_retention(DEFAULT_MAX_RETAINED)
    }

    /// Bus whose subscriber logs keep at most `max_retained` entries
    pub fn with_retention(max_retained: usize) -> Self {
        LocalBus {
            inner: Arc::new(Mutex::new(BusInner {
                topics: HashMap::new(),
                max_retained,
            })),
        }
    }

    /// Join a topic. The new log starts empty: whatever was broadcast
    /// before this call is never seen.
    pub fn subscribe(&self, topic: &str, peer: PeerId) -> BusSubscription {
        let mut inner = self.inner.lock();
        inner
            .topics
            .entry(topic.to_owned())
            .or_default()
            .insert(peer, SubscriberLog::new());
        debug!("{} subscribed to '{}'", peer, topic);
        BusSubscription {
            inner: Arc::clone(&self.inner),
            topic: topic.to_owned(),
            peer,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .topics
            .get(topic)
            .map_or(0, |subs| subs.len())
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        LocalBus::new()
    }
}

/// One peer's membership in one topic
///
/// Dropping the subscription leaves the topic; its log is discarded.
pub struct BusSubscription {
    inner: Arc<Mutex<BusInner>>,
    topic: String,
    peer: PeerId,
}

impl BusSubscription {
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append `payload` to every other subscriber's log. Fire-and-forget:
    /// no confirmation, and a no-op when nobody else is listening.
    pub fn publish(&self, payload: Bytes) {
        let mut inner = self.inner.lock();
        let max_retained = inner.max_retained;
        let Some(subs) = inner.topics.get_mut(&self.topic) else {
            return;
        };
        for (id, log) in subs.iter_mut() {
            if *id == self.peer {
                continue;
            }
            log.append(self.peer, payload.clone(), max_retained);
        }
    }

    /// This subscriber's log from `seq` on, in order
    pub fn deliveries_from(&self, seq: u64) -> Vec<Delivery> {
        let inner = self.inner.lock();
        let Some(log) = inner.topics.get(&self.topic).and_then(|subs| subs.get(&self.peer)) else {
            return Vec::new();
        };
        let start = log.entries.partition_point(|d| d.seq < seq);
        log.entries.iter().skip(start).cloned().collect()
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.topics.get_mut(&self.topic) {
            subs.remove(&self.peer);
            if subs.is_empty() {
                inner.topics.remove(&self.topic);
            }
        }
        debug!("{} left '{}'", self.peer, self.topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> Bytes {
        Bytes::copy_from_slice(text.as_bytes())
    }

    #[test]
    fn test_publish_reaches_others_not_self() {
        let bus = LocalBus::new();
        let a = bus.subscribe("room", PeerId::new(1));
        let b = bus.subscribe("room", PeerId::new(2));

        a.publish(payload("hi"));

        assert!(a.deliveries_from(0).is_empty());
        let got = b.deliveries_from(0);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sender, PeerId::new(1));
        assert_eq!(got[0].payload, payload("hi"));
    }

    #[test]
    fn test_seqs_are_contiguous_per_subscriber() {
        let bus = LocalBus::new();
        let a = bus.subscribe("room", PeerId::new(1));
        let b = bus.subscribe("room", PeerId::new(2));

        a.publish(payload("one"));
        a.publish(payload("two"));
        a.publish(payload("three"));

        let seqs: Vec<u64> = b.deliveries_from(0).iter().map(|d| d.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        // Reading from a cursor skips what came before
        let seqs: Vec<u64> = b.deliveries_from(2).iter().map(|d| d.seq).collect();
        assert_eq!(seqs, vec![2]);
        assert!(b.deliveries_from(3).is_empty());
    }

    #[test]
    fn test_pruning_keeps_absolute_seqs() {
        let bus = LocalBus::with_retention(4);
        let a = bus.subscribe("room", PeerId::new(1));
        let b = bus.subscribe("room", PeerId::new(2));

        for i in 0..10 {
            a.publish(payload(&format!("m{i}")));
        }

        let got = b.deliveries_from(0);
        assert_eq!(got.len(), 4);
        // The oldest six were dropped; numbering did not restart
        assert_eq!(got[0].seq, 6);
        assert_eq!(got[3].seq, 9);
    }

    #[test]
    fn test_late_joiner_starts_empty() {
        let bus = LocalBus::new();
        let a = bus.subscribe("room", PeerId::new(1));
        let _b = bus.subscribe("room", PeerId::new(2));

        a.publish(payload("before"));
        let c = bus.subscribe("room", PeerId::new(3));
        a.publish(payload("after"));

        let got = c.deliveries_from(0);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, payload("after"));
        assert_eq!(got[0].seq, 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = LocalBus::new();
        let a = bus.subscribe("room", PeerId::new(1));
        {
            let _b = bus.subscribe("room", PeerId::new(2));
            assert_eq!(bus.subscriber_count("room"), 2);
        }
        assert_eq!(bus.subscriber_count("room"), 1);

        // Publishing into the emptied-out room is fine
        a.publish(payload("anyone?"));
        drop(a);
        assert_eq!(bus.subscriber_count("room"), 0);
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = LocalBus::new();
        let a = bus.subscribe("room-a", PeerId::new(1));
        let b = bus.subscribe("room-b", PeerId::new(2));

        a.publish(payload("only room-a"));

        assert!(b.deliveries_from(0).is_empty());
    }

    #[test]
    fn test_fanout_to_many() {
        let bus = LocalBus::new();
        let a = bus.subscribe("room", PeerId::new(1));
        let others: Vec<BusSubscription> = (2..6)
            .map(|i| bus.subscribe("room", PeerId::new(i)))
            .collect();

        a.publish(payload("all"));

        for sub in &others {
            assert_eq!(sub.deliveries_from(0).len(), 1);
        }
    }
}
