//! Event handlers and their registry-side descriptor (§3, §4.6, §4.7).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::filter::Filter;
use crate::properties::Properties;

/// The consumer callback an event handler implements. Called by the
/// dispatch engine, never by a publisher directly.
pub trait EventHandler: Send + Sync {
    /// Handle one event. The return value is recorded for diagnostics only
    /// (§7): a failing handler does not affect delivery to other handlers
    /// and, on its own, never blacklists the handler — only timing does.
    fn handle_event(&self, topic: &str, properties: &Properties) -> HandleResult;
}

/// Outcome of a single `handle_event` call, as recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    Ok,
    Failed,
}

/// Async delivery discipline requested by a handler's `event.delivery`
/// registration property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// At most one in-flight async delivery to this handler at a time.
    Ordered,
    /// Up to `MAX_PARALLEL_PER_HANDLER` in-flight async deliveries.
    Unordered,
}

impl DeliveryMode {
    /// Parse the `event.delivery` property value. Defaults to `Ordered`
    /// when absent, matching the reference: any value *not* containing
    /// `async.ordered` is unordered, anything else (including no value at
    /// all) is ordered.
    #[must_use]
    pub fn from_property(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if !value.contains("async.ordered") => Self::Unordered,
            _ => Self::Ordered,
        }
    }
}

/// The registry's record of one registered handler.
///
/// `blacklisted` and `in_flight_count` are mutated without holding the
/// registry lock (they're read/written from inside dispatch, which only
/// holds the registry lock as a reader) — hence the atomics, per §5.
pub struct HandlerDescriptor {
    pub service_id: i64,
    pub service: Box<dyn EventHandler>,
    pub description: String,
    pub delivery_mode: DeliveryMode,
    pub filter: Option<Filter>,
    blacklisted: AtomicBool,
    in_flight_count: AtomicUsize,
}

impl HandlerDescriptor {
    #[must_use]
    pub fn new(
        service_id: i64,
        service: Box<dyn EventHandler>,
        description: String,
        delivery_mode: DeliveryMode,
        filter: Option<Filter>,
    ) -> Self {
        Self {
            service_id,
            service,
            description,
            delivery_mode,
            filter,
            blacklisted: AtomicBool::new(false),
            in_flight_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn is_blacklisted(&self) -> bool {
        self.blacklisted.load(Ordering::Acquire)
    }

    pub fn blacklist(&self) {
        self.blacklisted.store(true, Ordering::Release);
    }

    /// Whether this filter lets `properties` through. No filter means
    /// unconditional match.
    #[must_use]
    pub fn filter_matches(&self, properties: &Properties) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(properties))
    }

    /// Try to atomically claim an in-flight async delivery slot.
    ///
    /// Matches §4.6 step 2: the previous in-flight count must be `0`, or
    /// (for unordered handlers) strictly less than `max_parallel`. On
    /// failure the increment is rolled back and `false` is returned.
    pub(crate) fn try_acquire_slot(&self, max_parallel: usize) -> bool {
        let previous = self.in_flight_count.fetch_add(1, Ordering::SeqCst);
        let eligible = previous == 0
            || (self.delivery_mode == DeliveryMode::Unordered && previous < max_parallel);
        if !eligible {
            self.in_flight_count.fetch_sub(1, Ordering::SeqCst);
        }
        eligible
    }

    pub(crate) fn release_slot(&self) {
        self.in_flight_count.fetch_sub(1, Ordering::SeqCst);
    }
}
