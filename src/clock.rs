//! Time source abstraction, so the slow-handler blacklist threshold (§4.6,
//! §4.7) can be exercised in tests without sleeping for real.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic clock. The worker pool only ever needs elapsed durations, so
/// the trait exposes a single opaque instant type.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real clock, backed by [`std::time::Instant`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A controllable clock for tests: `now()` returns a fixed epoch plus an
/// offset that the test advances explicitly with [`FakeClock::advance`].
/// Used to deterministically exercise the slow-handler blacklist without a
/// real 60-second sleep.
pub struct FakeClock {
    epoch: Instant,
    offset_millis: AtomicU64,
}

impl FakeClock {
    #[must_use]
    pub fn new() -> Self {
        Self { epoch: Instant::now(), offset_millis: AtomicU64::new(0) }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_millis.fetch_add(
            u64::try_from(by.as_millis()).unwrap_or(u64::MAX),
            Ordering::SeqCst,
        );
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for FakeClock {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}
