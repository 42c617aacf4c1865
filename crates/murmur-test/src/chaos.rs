//! Chaos link - one direction of a deliberately unreliable channel

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link misbehavior configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Base one-way latency
    pub base_latency: Duration,
    /// Uniform extra delay range in milliseconds
    pub jitter_ms: (u32, u32),
    /// Independent per-delivery loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability of starting a loss burst
    pub burst_loss_prob: f64,
    /// Burst length range, inclusive
    pub burst_length: (u32, u32),
    /// Probability a delivery is queued out of order
    pub reorder_prob: f64,
    /// How far back a reordered delivery may be pushed
    pub reorder_depth: u32,
    /// Probability a delivery arrives twice
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig::calm()
    }
}

impl ChaosConfig {
    /// Exactly-once, in-order link with a fixed 1 ms latency
    pub fn ideal() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(1),
            jitter_ms: (0, 0),
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// Same-machine broadcast on a good day
    pub fn calm() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(5),
            jitter_ms: (0, 10),
            loss_rate: 0.001,
            burst_loss_prob: 0.005,
            burst_length: (1, 2),
            reorder_prob: 0.01,
            reorder_depth: 2,
            duplicate_prob: 0.005,
        }
    }

    /// Busy channel: noticeable loss, frequent disorder
    pub fn lossy() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(20),
            jitter_ms: (0, 40),
            loss_rate: 0.05,
            burst_loss_prob: 0.05,
            burst_length: (2, 5),
            reorder_prob: 0.1,
            reorder_depth: 4,
            duplicate_prob: 0.02,
        }
    }

    /// Worst plausible conditions the sync layer must still survive
    pub fn harsh() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(50),
            jitter_ms: (0, 150),
            loss_rate: 0.15,
            burst_loss_prob: 0.1,
            burst_length: (3, 10),
            reorder_prob: 0.2,
            reorder_depth: 8,
            duplicate_prob: 0.05,
        }
    }
}

#[derive(Clone, Debug)]
struct InFlight {
    payload: Bytes,
    deliver_at: Duration,
}

/// Counters for one link
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub reordered: u64,
    pub duplicated: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }
}

/// One direction between one sender and one receiver
///
/// Fully deterministic for a given seed and send/tick schedule.
pub struct ChaosLink {
    config: ChaosConfig,
    rng: StdRng,
    in_flight: VecDeque<InFlight>,
    now: Duration,
    burst_remaining: u32,
    stats: ChaosStats,
}

impl ChaosLink {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            now: Duration::ZERO,
            burst_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Put one payload on the link
    pub fn send(&mut self, payload: Bytes) {
        self.stats.sent += 1;

        if self.should_drop() {
            self.stats.lost += 1;
            return;
        }

        let deliver_at = self.now + self.delay();
        let entry = InFlight {
            payload: payload.clone(),
            deliver_at,
        };

        if !self.in_flight.is_empty() && self.rng.gen::<f64>() < self.config.reorder_prob {
            let depth = self.config.reorder_depth.min(self.in_flight.len() as u32);
            let back = self.rng.gen_range(0..=depth) as usize;
            let pos = self.in_flight.len().saturating_sub(back);
            self.in_flight.insert(pos, entry);
            self.stats.reordered += 1;
        } else {
            self.in_flight.push_back(entry);
        }

        if self.rng.gen::<f64>() < self.config.duplicate_prob {
            let echo_at = deliver_at + self.delay();
            self.in_flight.push_back(InFlight {
                payload,
                deliver_at: echo_at,
            });
            self.stats.duplicated += 1;
        }
    }

    /// Advance link time and surface whatever is due, oldest queued first
    pub fn tick(&mut self, dt: Duration) -> Vec<Bytes> {
        self.now += dt;

        let mut delivered = Vec::new();
        while let Some(front) = self.in_flight.front() {
            if front.deliver_at > self.now {
                break;
            }
            if let Some(entry) = self.in_flight.pop_front() {
                self.stats.delivered += 1;
                delivered.push(entry.payload);
            }
        }
        delivered
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    fn delay(&mut self) -> Duration {
        let (min_ms, max_ms) = self.config.jitter_ms;
        let jitter = if max_ms > min_ms {
            Duration::from_millis(self.rng.gen_range(min_ms..=max_ms) as u64)
        } else {
            Duration::from_millis(min_ms as u64)
        };
        self.config.base_latency + jitter
    }

    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }
        if self.config.burst_loss_prob > 0.0 && self.rng.gen::<f64>() < self.config.burst_loss_prob
        {
            let (min, max) = self.config.burst_length;
            self.burst_remaining = self.rng.gen_range(min..=max);
            return true;
        }
        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u8) -> Bytes {
        Bytes::copy_from_slice(&[n])
    }

    #[test]
    fn test_ideal_link_is_fifo_exactly_once() {
        let mut link = ChaosLink::new(ChaosConfig::ideal(), 1);

        for n in 0..10 {
            link.send(payload(n));
        }
        assert!(link.tick(Duration::ZERO).is_empty());

        let delivered = link.tick(Duration::from_millis(1));
        let order: Vec<u8> = delivered.iter().map(|p| p[0]).collect();
        assert_eq!(order, (0..10).collect::<Vec<u8>>());
        assert_eq!(link.stats().lost, 0);
        assert_eq!(link.stats().duplicated, 0);
    }

    #[test]
    fn test_lossy_link_loses_but_delivers_most() {
        let mut link = ChaosLink::new(ChaosConfig::lossy(), 42);

        for n in 0..=255u8 {
            link.send(payload(n));
        }
        let mut delivered = 0;
        for _ in 0..100 {
            delivered += link.tick(Duration::from_millis(10)).len();
        }

        let stats = link.stats();
        assert!(stats.lost > 0);
        assert_eq!(stats.delivered, delivered as u64);
        assert_eq!(stats.sent, 256);
        assert!(delivered > 150);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn test_harsh_link_duplicates_and_reorders() {
        let mut link = ChaosLink::new(ChaosConfig::harsh(), 7);

        for n in 0..=255u8 {
            link.send(payload(n));
        }
        let mut seen = Vec::new();
        for _ in 0..200 {
            for p in link.tick(Duration::from_millis(10)) {
                seen.push(p[0]);
            }
        }

        assert!(link.stats().reordered > 0);
        assert!(link.stats().duplicated > 0);
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_ne!(seen, sorted);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let mut a = ChaosLink::new(ChaosConfig::lossy(), 9);
        let mut b = ChaosLink::new(ChaosConfig::lossy(), 9);

        for n in 0..100u8 {
            a.send(payload(n));
            b.send(payload(n));
        }
        for _ in 0..50 {
            assert_eq!(
                a.tick(Duration::from_millis(10)),
                b.tick(Duration::from_millis(10))
            );
        }
        assert_eq!(a.stats().lost, b.stats().lost);
    }
}
