//! Time abstraction for testable delivery and action timing.
//!
//! Circuit windows, retry backoff, and action delays all go through an
//! injected [`Clock`] so tests can advance time deterministically instead of
//! sleeping for real.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Clock abstraction for time operations.
///
/// Production code uses [`RealClock`]; tests inject [`TestClock`] to control
/// both monotonic time (circuit windows) and wall time (envelope
/// timestamps).
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant for duration measurements and deadlines.
    fn now(&self) -> Instant;

    /// Current wall time in epoch milliseconds, for envelope timestamps.
    fn now_millis(&self) -> i64;

    /// Suspends for the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by system time and tokio sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Deterministic clock for tests.
///
/// `sleep` advances virtual time immediately instead of suspending, so
/// backoff-heavy paths run instantly while still observing elapsed time
/// through `now`.
#[derive(Debug, Clone)]
pub struct TestClock {
    base: Instant,
    offset_ns: Arc<AtomicU64>,
    wall_ms: Arc<AtomicI64>,
}

impl TestClock {
    /// Creates a test clock with wall time at epoch zero.
    pub fn new() -> Self {
        Self::at_millis(0)
    }

    /// Creates a test clock with wall time at the given epoch milliseconds.
    pub fn at_millis(epoch_ms: i64) -> Self {
        Self {
            base: Instant::now(),
            offset_ns: Arc::new(AtomicU64::new(0)),
            wall_ms: Arc::new(AtomicI64::new(epoch_ms)),
        }
    }

    /// Advances both monotonic and wall time.
    pub fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(u64::MAX);
        self.offset_ns.fetch_add(ns, Ordering::AcqRel);
        let ms = i64::try_from(duration.as_millis().min(u128::from(u64::MAX))).unwrap_or(i64::MAX);
        self.wall_ms.fetch_add(ms, Ordering::AcqRel);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_ns.load(Ordering::Acquire))
    }

    fn now_millis(&self) -> i64 {
        self.wall_ms.load(Ordering::Acquire)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(std::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_both_clocks() {
        let clock = TestClock::at_millis(1_000);
        let start = clock.now();

        clock.advance(Duration::from_secs(2));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 3_000);
    }

    #[tokio::test]
    async fn test_clock_sleep_advances_instead_of_waiting() {
        let clock = TestClock::new();
        let real_start = Instant::now();

        clock.sleep(Duration::from_secs(3600)).await;

        assert!(real_start.elapsed() < Duration::from_secs(1));
        assert_eq!(clock.now_millis(), 3_600_000);
    }

    #[test]
    fn clones_share_time() {
        let clock = TestClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now_millis(), 250);
    }
}
