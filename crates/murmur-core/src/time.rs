//! Time primitives for murmur
//!
//! All protocol timestamps are wall-clock milliseconds. Each session owns a
//! [`Clock`] that is advanced only by its tick loop, so expiry, typing and
//! sync deadlines are deterministic under test.

use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in time, milliseconds since the Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Timestamp(secs * 1000)
    }

    #[inline]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn as_secs(self) -> i64 {
        self.0 / 1000
    }

    /// Read the system clock
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(since_epoch.as_millis() as i64)
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_millis() as i64))
    }

    #[inline]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_millis() as i64))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs.as_millis() as i64)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 - rhs.as_millis() as i64)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        let diff = self.0 - rhs.0;
        if diff >= 0 {
            Duration::from_millis(diff as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl std::fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ts({}ms)", self.0)
    }
}

/// Session clock - seeded once, advanced only by the owning tick loop
#[derive(Clone, Debug)]
pub struct Clock {
    now: Timestamp,
}

impl Clock {
    /// Seed from the system clock
    pub fn system() -> Self {
        Clock {
            now: Timestamp::now(),
        }
    }

    /// Seed from a fixed epoch (tests)
    pub fn starting_at(epoch: Timestamp) -> Self {
        Clock { now: epoch }
    }

    #[inline]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Advance by one tick's elapsed time, returning the new reading
    #[inline]
    pub fn advance(&mut self, dt: Duration) -> Timestamp {
        self.now = self.now + dt;
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = t1 + Duration::from_millis(500);

        assert!(t2 > t1);
        assert_eq!(t2 - t1, Duration::from_millis(500));
        // Negative differences clamp to zero
        assert_eq!(t1 - t2, Duration::ZERO);
    }

    #[test]
    fn test_clock_advance() {
        let mut clock = Clock::starting_at(Timestamp::from_millis(5000));
        assert_eq!(clock.now(), Timestamp::from_millis(5000));

        let after = clock.advance(Duration::from_millis(250));
        assert_eq!(after, Timestamp::from_millis(5250));
        assert_eq!(clock.now(), after);
    }

    #[test]
    fn test_saturating_ops() {
        let near_max = Timestamp(i64::MAX - 10);
        assert_eq!(near_max.saturating_add(Duration::from_secs(1)), Timestamp::MAX);

        let early = Timestamp::from_millis(100);
        assert_eq!(
            early.saturating_sub(Duration::from_secs(10)),
            Timestamp::from_millis(100 - 10_000)
        );
    }
}
