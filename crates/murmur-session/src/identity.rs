//! Random peer identity
//!
//! Peers have no accounts. Each session start draws a fresh 64-bit id and
//! a friendly two-word display name; collisions across a handful of peers
//! on one machine are not a practical concern.

use murmur_core::{Peer, PeerId, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const ADJECTIVES: [&str; 16] = [
    "Bright", "Swift", "Clever", "Bold", "Wise", "Quick", "Sharp", "Keen",
    "Smart", "Cool", "Happy", "Lucky", "Mighty", "Noble", "Brave", "Calm",
];

pub const ANIMALS: [&str; 16] = [
    "Panda", "Tiger", "Eagle", "Dolphin", "Fox", "Wolf", "Lion", "Hawk",
    "Otter", "Bear", "Owl", "Falcon", "Lynx", "Raven", "Phoenix", "Dragon",
];

/// Who this session claims to be
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub peer: PeerId,
    pub name: String,
}

impl Identity {
    /// Fresh random identity
    pub fn generate() -> Self {
        Identity::from_rng(&mut rand::thread_rng())
    }

    /// Deterministic identity for tests and simulations
    pub fn from_seed(seed: u64) -> Self {
        Identity::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    pub fn named(peer: PeerId, name: impl Into<String>) -> Self {
        Identity {
            peer,
            name: name.into(),
        }
    }

    fn from_rng(rng: &mut impl Rng) -> Self {
        let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
        let animal = ANIMALS[rng.gen_range(0..ANIMALS.len())];
        Identity {
            peer: PeerId::new(rng.gen()),
            name: format!("{adjective} {animal}"),
        }
    }

    /// Roster record for this identity as of `now`
    pub fn peer_record(&self, now: Timestamp) -> Peer {
        Peer::new(self.peer, self.name.clone(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_uses_word_lists() {
        let identity = Identity::generate();
        let mut words = identity.name.split(' ');

        let adjective = words.next().unwrap();
        let animal = words.next().unwrap();
        assert!(words.next().is_none());
        assert!(ADJECTIVES.contains(&adjective));
        assert!(ANIMALS.contains(&animal));
    }

    #[test]
    fn test_seeded_identity_is_stable() {
        let a = Identity::from_seed(7);
        let b = Identity::from_seed(7);
        let c = Identity::from_seed(8);

        assert_eq!(a, b);
        assert_ne!(a.peer, c.peer);
    }

    #[test]
    fn test_peer_record_carries_name_and_time() {
        let identity = Identity::named(PeerId::new(5), "Calm Otter");
        let record = identity.peer_record(Timestamp::from_millis(1234));

        assert_eq!(record.id, PeerId::new(5));
        assert_eq!(record.name, "Calm Otter");
        assert_eq!(record.last_activity, Timestamp::from_millis(1234));
        assert!(!record.is_typing);
    }
}
