//! Time provider abstraction
//!
//! Resolver caches measure their TTL against a [`Clock`]. Production code uses
//! [`SystemClock`]; tests swap in a controllable clock so expiry can be driven
//! without sleeping.
//!
//! # Example
//!
//! ```
//! use bagtree::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let millis = clock.now_millis();
//! assert!(clock.now_utc().timestamp_millis() >= millis as i64);
//! ```

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicU64, Ordering};

/// A time provider for resolver cache bookkeeping.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;

    /// Returns the current time as a UTC timestamp.
    fn now_utc(&self) -> DateTime<Utc> {
        millis_to_utc(self.now_millis())
    }
}

/// Converts a millisecond Unix timestamp into a UTC `DateTime`.
///
/// Out-of-range inputs collapse to the Unix epoch.
pub fn millis_to_utc(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for cache expiry tests.
///
/// Time only moves when [`FixedClock::advance`] or [`FixedClock::set`] is
/// called, so two reads within a test always agree.
///
/// ```
/// use bagtree::{Clock, FixedClock};
///
/// let clock = FixedClock::new(1_000);
/// assert_eq!(clock.now_millis(), 1_000);
/// clock.advance_secs(2);
/// assert_eq!(clock.now_millis(), 3_000);
/// ```
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicU64,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    /// Create a new fixed clock with the given initial time in milliseconds.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs * 1000);
    }

    /// Set the clock to a specific time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1704067200000)
    }
}

#[cfg(test)]
mod fixed_clock_tests {
    use super::*;

    #[test]
    fn fixed_clock_does_not_drift() {
        let clock = FixedClock::new(1000);
        assert_eq!(clock.now_millis(), 1000);
        assert_eq!(clock.now_millis(), 1000);
    }

    #[test]
    fn fixed_clock_manual_advance() {
        let clock = FixedClock::new(1000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1500);
        clock.advance_secs(1);
        assert_eq!(clock.now_millis(), 2500);
    }

    #[test]
    fn fixed_clock_set() {
        let clock = FixedClock::new(1000);
        clock.set(5000);
        assert_eq!(clock.now_millis(), 5000);
    }

    #[test]
    fn fixed_clock_utc() {
        let clock = FixedClock::default();
        assert!(clock.now_utc().to_rfc3339().starts_with("2024-01-01T00:00:00"));
    }

    #[test]
    fn millis_to_utc_out_of_range_is_epoch() {
        assert_eq!(millis_to_utc(u64::MAX), DateTime::<Utc>::default());
    }
}
