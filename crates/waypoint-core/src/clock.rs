//! Time source injected into the store and the sync engine.

use std::sync::atomic::{AtomicI64, Ordering};

/// Wall clock returning Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and harnesses.
///
/// Every read advances the clock by one millisecond so consecutive writes get
/// distinct, increasing timestamps.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub const fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_strictly_increasing() {
        let clock = ManualClock::new(1_000);
        let first = clock.now_millis();
        let second = clock.now_millis();
        assert_eq!(first, 1_000);
        assert!(second > first);

        clock.advance(500);
        assert!(clock.now_millis() >= 1_502);

        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn system_clock_reports_unix_millis() {
        assert!(SystemClock.now_millis() > 1_600_000_000_000);
    }
}
