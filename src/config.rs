//! Tuning constants and the config struct that overrides them (§6, §9a).

use std::time::Duration;

/// Default worker count `N`.
pub const DEFAULT_WORKER_COUNT: usize = 5;
/// Default bounded-queue capacity `Q`.
pub const DEFAULT_QUEUE_BOUND: usize = 512;
/// Default per-handler parallelism for unordered handlers, `floor(N/3)+1`.
pub const DEFAULT_MAX_PARALLEL_PER_HANDLER: usize = 2;
/// Default slow-handler threshold `T`.
pub const DEFAULT_SLOW_HANDLER_THRESHOLD: Duration = Duration::from_secs(60);
/// Default maximum subscription prefix length `L`, in bytes.
pub const DEFAULT_MAX_PREFIX_LEN: usize = crate::topic::MAX_PREFIX_LEN;

/// Compile-time tunables, overridable per instance through
/// [`crate::engine::EventAdmin::builder`]. Tests typically shrink
/// `slow_handler_threshold` and pair it with a [`crate::clock::FakeClock`]
/// rather than waiting out the real default.
#[derive(Debug, Clone, Copy)]
pub struct EventAdminConfig {
    pub worker_count: usize,
    pub queue_bound: usize,
    pub max_parallel_per_handler: usize,
    pub slow_handler_threshold: Duration,
    pub max_prefix_len: usize,
}

impl Default for EventAdminConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_bound: DEFAULT_QUEUE_BOUND,
            max_parallel_per_handler: DEFAULT_MAX_PARALLEL_PER_HANDLER,
            slow_handler_threshold: DEFAULT_SLOW_HANDLER_THRESHOLD,
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
        }
    }
}
