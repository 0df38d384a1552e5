//! Clock abstraction so the breaker's timing can be faked in tests.
//!
//! Unlike a process-local monotonic clock, `checkin` is a durable timestamp
//! written by whichever caller last mutated the record and read back by
//! every other caller, possibly in a different process. It has to be
//! wall-clock seconds since the epoch, not an `Instant` offset that only
//! means something inside one process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock abstraction so the breaker and its drivers read time through one
/// seam.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Seconds since the Unix epoch, fractional.
    fn now(&self) -> f64;
}

/// Wall-clock time backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs_f64()
    }
}

/// A clock a test can advance by hand, for deterministic cooldown/TTL
/// assertions without real sleeps.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Start the clock at the given epoch-seconds value.
    pub fn at(start: f64) -> Self {
        Self { micros: AtomicU64::new((start * 1_000_000.0) as u64) }
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: f64) {
        let delta = (secs * 1_000_000.0) as u64;
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(0.0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_reports_present_time() {
        let clock = SystemClock;
        let now = clock.now();
        assert!(now > 1_700_000_000.0);
    }

    #[test]
    fn manual_clock_advances_deterministically() {
        let clock = ManualClock::at(100.0);
        assert_eq!(clock.now(), 100.0);
        clock.advance(6.0);
        assert_eq!(clock.now(), 106.0);
    }

    #[test]
    fn manual_clock_defaults_to_zero() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), 0.0);
    }
}
