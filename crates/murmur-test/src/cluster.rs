//! Multi-peer simulation in virtual time
//!
//! Every pair of peers gets its own seeded [`ChaosLink`] per direction, so
//! any interleaving the real channel could produce can be replayed here
//! from a seed. Sessions share one simulated wall clock and advance in
//! lockstep.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use murmur_channel::Delivery;
use murmur_core::{MessageId, PeerId, Timestamp};
use murmur_session::{Identity, Session, SessionConfig};

use crate::{ChaosConfig, ChaosLink};

const CLUSTER_EPOCH: Timestamp = Timestamp::from_millis(1_000);

struct Member {
    session: Session,
    /// Receiver-side numbering for this member's delivery log
    next_seq: u64,
}

/// N sessions wired together over chaos links
pub struct Cluster {
    members: Vec<Member>,
    links: HashMap<(PeerId, PeerId), ChaosLink>,
    chaos: ChaosConfig,
    seed: u64,
    next_link_seed: u64,
    elapsed: Duration,
}

impl Cluster {
    /// `count` started sessions, all at the same epoch
    pub fn new(count: usize, chaos: ChaosConfig, seed: u64) -> Self {
        let mut cluster = Cluster {
            members: Vec::new(),
            links: HashMap::new(),
            chaos,
            seed,
            next_link_seed: seed,
            elapsed: Duration::ZERO,
        };
        for _ in 0..count {
            cluster.add_session();
        }
        cluster
    }

    /// Start one more session now; a late joiner when the cluster has
    /// already been running. Returns its index.
    pub fn add_session(&mut self) -> usize {
        let index = self.members.len();
        let identity = Identity::from_seed(
            self.seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(index as u64),
        );
        let config = SessionConfig {
            clock_start: Some(CLUSTER_EPOCH + self.elapsed),
            ..Default::default()
        };
        let mut session = Session::with_identity(identity, config);
        session.start();
        self.members.push(Member {
            session,
            next_seq: 0,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn session(&self, index: usize) -> &Session {
        &self.members[index].session
    }

    pub fn session_mut(&mut self, index: usize) -> &mut Session {
        &mut self.members[index].session
    }

    pub fn peer_id(&self, index: usize) -> PeerId {
        self.members[index].session.identity().peer
    }

    /// Stop one session; its leave goes out on the next tick
    pub fn stop(&mut self, index: usize) {
        self.members[index].session.stop();
    }

    /// One lockstep step: fan out queued envelopes, move the links, hand
    /// arrivals to their receivers, then tick every session by `dt`.
    pub fn tick(&mut self, dt: Duration) {
        self.elapsed += dt;
        let peers: Vec<PeerId> = (0..self.members.len()).map(|i| self.peer_id(i)).collect();

        let mut outbound: Vec<(usize, Bytes)> = Vec::new();
        for (i, member) in self.members.iter_mut().enumerate() {
            while let Some(bytes) = member.session.pop_outbound() {
                outbound.push((i, bytes));
            }
        }
        for (i, bytes) in outbound {
            for (j, to) in peers.iter().enumerate() {
                if j == i {
                    continue;
                }
                self.link_mut(peers[i], *to).send(bytes.clone());
            }
        }

        // Sorted key order keeps arrival interleaving reproducible
        let mut keys: Vec<(PeerId, PeerId)> = self.links.keys().copied().collect();
        keys.sort_unstable();
        let mut arrivals: Vec<(usize, PeerId, Bytes)> = Vec::new();
        for key in keys {
            if let Some(link) = self.links.get_mut(&key) {
                for payload in link.tick(dt) {
                    if let Some(j) = peers.iter().position(|p| *p == key.1) {
                        arrivals.push((j, key.0, payload));
                    }
                }
            }
        }
        for (j, sender, payload) in arrivals {
            let member = &mut self.members[j];
            let seq = member.next_seq;
            member.next_seq += 1;
            member.session.queue_delivery(Delivery {
                seq,
                sender,
                payload,
            });
        }

        for member in &mut self.members {
            member.session.tick(dt);
        }
    }

    /// Tick repeatedly until `total` virtual time has passed
    pub fn run(&mut self, total: Duration, step: Duration) {
        let mut spent = Duration::ZERO;
        while spent < total {
            self.tick(step);
            spent += step;
        }
    }

    pub fn message_sequence(&self, index: usize) -> Vec<MessageId> {
        self.members[index]
            .session
            .messages()
            .iter()
            .map(|m| m.id)
            .collect()
    }

    pub fn roster(&self, index: usize) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.members[index]
            .session
            .peers()
            .iter()
            .map(|p| p.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Whether every session agrees on messages, roster, counter, theme
    /// and counter attribution
    pub fn converged(&self) -> bool {
        let reference = 0;
        (1..self.members.len()).all(|i| self.agrees(reference, i))
    }

    /// Like [`Cluster::converged`] but panics with the first disagreement
    pub fn assert_converged(&self) {
        for i in 1..self.members.len() {
            assert_eq!(
                self.message_sequence(0),
                self.message_sequence(i),
                "session {i} disagrees on messages"
            );
            assert_eq!(self.roster(0), self.roster(i), "session {i} disagrees on roster");
            assert_eq!(
                self.session(0).counter(),
                self.session(i).counter(),
                "session {i} disagrees on counter"
            );
            assert_eq!(
                self.session(0).theme(),
                self.session(i).theme(),
                "session {i} disagrees on theme"
            );
            assert_eq!(
                self.session(0).last_counter_action().map(|a| (a.author, a.at)),
                self.session(i).last_counter_action().map(|a| (a.author, a.at)),
                "session {i} disagrees on counter attribution"
            );
        }
    }

    fn agrees(&self, a: usize, b: usize) -> bool {
        self.message_sequence(a) == self.message_sequence(b)
            && self.roster(a) == self.roster(b)
            && self.session(a).counter() == self.session(b).counter()
            && self.session(a).theme() == self.session(b).theme()
            && self.session(a).last_counter_action().map(|x| (x.author, x.at))
                == self.session(b).last_counter_action().map(|x| (x.author, x.at))
    }

    fn link_mut(&mut self, from: PeerId, to: PeerId) -> &mut ChaosLink {
        let seed = self.next_link_seed;
        self.next_link_seed += 1;
        let chaos = self.chaos.clone();
        self.links
            .entry((from, to))
            .or_insert_with(|| ChaosLink::new(chaos, seed))
    }
}
