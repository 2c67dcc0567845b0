//! The public `EventAdmin` surface: lifecycle, synchronous `send`,
//! asynchronous `post`, and handler (de)registration (§4.5, §4.6, §4.8).

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bon::bon;
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::clock::{MonotonicClock, SystemClock};
use crate::config::EventAdminConfig;
use crate::error::{EventAdminError, EventAdminResult};
use crate::handler::HandleResult;
use crate::properties::Properties;
use crate::queue::{AsyncQueue, Claimed, QueueEntry};
use crate::registry::{HandlerRegistration, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Created,
    Started,
    Stopped,
}

/// An in-process publish/subscribe event dispatcher.
///
/// Construct with [`EventAdmin::builder`], call [`EventAdmin::start`] to
/// spin up the worker pool, then publish with [`EventAdmin::send`] (sync)
/// or [`EventAdmin::post`] (async). Dropping a started-but-unstopped engine
/// stops it automatically.
pub struct EventAdmin {
    config: EventAdminConfig,
    registry: Arc<Registry>,
    queue: Arc<AsyncQueue>,
    clock: Arc<dyn MonotonicClock>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: Mutex<LifecycleState>,
}

#[bon]
impl EventAdmin {
    /// Build an `EventAdmin`. `config` defaults to the compile-time
    /// constants in [`EventAdminConfig::default`]; `clock` defaults to
    /// [`SystemClock`] and is only worth overriding in tests.
    #[builder]
    pub fn new(
        #[builder(default)] config: EventAdminConfig,
        clock: Option<Arc<dyn MonotonicClock>>,
    ) -> Self {
        Self {
            queue: Arc::new(AsyncQueue::new(config.queue_bound)),
            registry: Arc::new(Registry::new(config.max_prefix_len)),
            config,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
            workers: Mutex::new(Vec::new()),
            state: Mutex::new(LifecycleState::Created),
        }
    }

    /// §4.8: spawn the worker pool. Fails with `internal_thread_failure` if
    /// any thread fails to spawn, tearing down the threads already started
    /// and leaving the engine in its pre-start state.
    pub fn start(&self) -> EventAdminResult<()> {
        let mut state = self.state.lock();
        if *state != LifecycleState::Created {
            return Err(EventAdminError::illegal_state("engine has already been started"));
        }

        let mut workers = self.workers.lock();
        for index in 0..self.config.worker_count {
            let registry = self.registry.clone();
            let queue = self.queue.clone();
            let clock = self.clock.clone();
            let max_parallel = self.config.max_parallel_per_handler;
            let threshold = self.config.slow_handler_threshold;

            let spawned = std::thread::Builder::new()
                .name(format!("event-admin-worker-{index}"))
                .spawn(move || worker_loop(&registry, queue.as_ref(), clock.as_ref(), max_parallel, threshold));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    self.queue.shut_down();
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    self.queue.reactivate();
                    error!(index, error = %source, "worker thread failed to spawn");
                    return Err(EventAdminError::internal_thread_failure(index, source.to_string()));
                }
            }
        }

        *state = LifecycleState::Started;
        Ok(())
    }

    /// §4.8: idempotent shutdown. Signals the queue, joins every worker,
    /// and leaves the queue safe to inspect. A no-op if never started or
    /// already stopped.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state != LifecycleState::Started {
            *state = LifecycleState::Stopped;
            return;
        }
        self.queue.shut_down();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        self.queue.drain();
        *state = LifecycleState::Stopped;
    }

    /// §4.5 `send`: synchronous delivery on the caller's thread.
    pub fn send(&self, topic: &str, properties: Properties) -> EventAdminResult<()> {
        validate_topic(topic)?;
        self.require_started()?;
        let plan = self.registry.plan(topic, &properties);
        if plan.is_empty() {
            trace!(%topic, "sync dispatch matched no handlers");
            return Ok(());
        }
        for descriptor in plan {
            let start = self.clock.now();
            let result = descriptor.service.handle_event(topic, &properties);
            let elapsed = self.clock.now() - start;
            if elapsed > self.config.slow_handler_threshold {
                descriptor.blacklist();
                error!(
                    service_id = descriptor.service_id,
                    description = %descriptor.description,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "blacklisting slow event handler (sync)"
                );
            }
            if result == HandleResult::Failed {
                trace!(service_id = descriptor.service_id, %topic, "handler reported failure");
            }
        }
        Ok(())
    }

    /// §4.6 `post`: enqueue for asynchronous delivery by the worker pool.
    pub fn post(&self, topic: &str, properties: Properties) -> EventAdminResult<()> {
        validate_topic(topic)?;
        self.require_started()?;
        let plan = self.registry.plan(topic, &properties);
        if plan.is_empty() {
            return Ok(());
        }
        let remaining = plan.iter().map(|d| d.service_id).collect();
        let event = crate::event::Event::new(topic, properties);
        if self.queue.try_push(QueueEntry { event, remaining }) {
            Ok(())
        } else {
            Err(EventAdminError::illegal_state("async queue is full"))
        }
    }

    /// §4.3 `add_handler`.
    pub fn add_handler(&self, registration: HandlerRegistration) -> EventAdminResult<()> {
        self.registry.add_handler(registration)
    }

    /// §4.3 `remove_handler`.
    pub fn remove_handler(&self, service_id: i64) {
        self.registry.remove_handler(service_id);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// §7: `send`/`post` are only valid once the worker pool is up and
    /// before `stop`/`destroy` tears it down.
    fn require_started(&self) -> EventAdminResult<()> {
        if *self.state.lock() == LifecycleState::Started {
            Ok(())
        } else {
            Err(EventAdminError::illegal_state("event admin is not started"))
        }
    }
}

impl Drop for EventAdmin {
    fn drop(&mut self) {
        self.stop();
        debug_assert!(
            self.registry.is_empty(),
            "EventAdmin dropped with handlers still registered"
        );
    }
}

fn validate_topic(topic: &str) -> EventAdminResult<()> {
    if topic.is_empty() {
        return Err(EventAdminError::invalid_argument("topic must not be empty"));
    }
    Ok(())
}

/// §4.6 "Worker algorithm": loop claiming eligible `(event, handler)` pairs
/// until the queue reports shutdown.
fn worker_loop(
    registry: &Registry,
    queue: &AsyncQueue,
    clock: &dyn MonotonicClock,
    max_parallel: usize,
    threshold: Duration,
) {
    while let Some(claimed) = queue.wait_for_eligible(max_parallel, |id| registry.lookup(id)) {
        deliver_claimed(&claimed, registry, clock, threshold);
    }
}

/// §4.6 step 3: look the handler up again before invoking it — a handler
/// removed between being claimed and delivered must not receive the event.
fn deliver_claimed(claimed: &Claimed, registry: &Registry, clock: &dyn MonotonicClock, threshold: Duration) {
    let Claimed { event, descriptor } = claimed;
    if !descriptor.is_blacklisted() && registry.lookup(descriptor.service_id).is_some() {
        let start = clock.now();
        let result = descriptor.service.handle_event(event.topic(), event.properties());
        let elapsed = clock.now() - start;
        if elapsed > threshold {
            descriptor.blacklist();
            error!(
                service_id = descriptor.service_id,
                description = %descriptor.description,
                elapsed_ms = elapsed.as_millis() as u64,
                "blacklisting slow event handler (async)"
            );
        }
        if result == HandleResult::Failed {
            trace!(service_id = descriptor.service_id, topic = event.topic(), "handler reported failure");
        }
    }
    descriptor.release_slot();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }
    impl crate::handler::EventHandler for CountingHandler {
        fn handle_event(&self, _topic: &str, _properties: &Properties) -> HandleResult {
            self.count.fetch_add(1, Ordering::SeqCst);
            HandleResult::Ok
        }
    }

    fn registration(id: i64, topics: &str, handler: Box<dyn crate::handler::EventHandler>) -> HandlerRegistration {
        HandlerRegistration {
            service_id: id,
            service: handler,
            topics: topics.to_string(),
            description: None,
            delivery: None,
            filter: None,
        }
    }

    #[test]
    fn exact_match_sync_invokes_once() {
        let admin = EventAdmin::builder().build();
        admin.start().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        admin
            .add_handler(registration(1, "org/celix/test", Box::new(CountingHandler { count: count.clone() })))
            .unwrap();
        admin.send("org/celix/test", Properties::new()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        admin.remove_handler(1);
        admin.stop();
    }

    #[test]
    fn filter_rejects_non_matching_properties() {
        let admin = EventAdmin::builder().build();
        admin.start().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        admin
            .add_handler(HandlerRegistration {
                service_id: 1,
                service: Box::new(CountingHandler { count: count.clone() }),
                topics: "org/celix/test".to_string(),
                description: None,
                delivery: None,
                filter: Some("(key=value)".to_string()),
            })
            .unwrap();
        let mut props = Properties::new();
        props.insert("key", "value2");
        admin.send("org/celix/test", props).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        admin.remove_handler(1);
        admin.stop();
    }

    #[test]
    fn send_and_post_before_start_return_illegal_state() {
        let admin = EventAdmin::builder().build();
        let count = Arc::new(AtomicUsize::new(0));
        admin
            .add_handler(registration(1, "org/celix/test", Box::new(CountingHandler { count })))
            .unwrap();

        let send_err = admin.send("org/celix/test", Properties::new()).unwrap_err();
        assert_eq!(send_err.kind(), crate::error::ErrorKind::IllegalState);
        let post_err = admin.post("org/celix/test", Properties::new()).unwrap_err();
        assert_eq!(post_err.kind(), crate::error::ErrorKind::IllegalState);
        assert_eq!(admin.pending_count(), 0);
        admin.remove_handler(1);
    }

    #[test]
    fn post_after_stop_returns_illegal_state() {
        let admin = EventAdmin::builder().build();
        admin.start().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        admin
            .add_handler(registration(1, "org/celix/test", Box::new(CountingHandler { count })))
            .unwrap();
        admin.stop();

        let err = admin.post("org/celix/test", Properties::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);
        admin.remove_handler(1);
    }

    #[test]
    fn async_delivery_reaches_handler() {
        let admin = EventAdmin::builder().build();
        admin.start().unwrap();
        let (tx, rx) = mpsc::channel();

        struct Signal(mpsc::Sender<()>);
        impl crate::handler::EventHandler for Signal {
            fn handle_event(&self, _topic: &str, _properties: &Properties) -> HandleResult {
                self.0.send(()).unwrap();
                HandleResult::Ok
            }
        }

        admin
            .add_handler(registration(1, "org/celix/*", Box::new(Signal(tx))))
            .unwrap();
        admin.post("org/celix/test", Properties::new()).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        admin.remove_handler(1);
        admin.stop();
    }

    #[test]
    fn slow_handler_is_blacklisted_via_fake_clock() {
        struct Slow(Arc<FakeClock>);
        impl crate::handler::EventHandler for Slow {
            fn handle_event(&self, _topic: &str, _properties: &Properties) -> HandleResult {
                self.0.advance(Duration::from_secs(2));
                HandleResult::Ok
            }
        }

        let clock = Arc::new(FakeClock::new());
        let mut config = EventAdminConfig::default();
        config.slow_handler_threshold = Duration::from_secs(1);
        let admin = EventAdmin::builder().config(config).clock(clock.clone() as Arc<dyn MonotonicClock>).build();
        admin.start().unwrap();
        admin
            .add_handler(registration(1, "org/celix/test", Box::new(Slow(clock.clone()))))
            .unwrap();

        admin.send("org/celix/test", Properties::new()).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        admin.remove_handler(1);
        admin
            .add_handler(registration(1, "org/celix/test", Box::new(CountingHandler { count: count.clone() })))
            .unwrap();
        admin.send("org/celix/test", Properties::new()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        admin.remove_handler(1);
        admin.stop();
    }

    #[test]
    fn queue_saturation_returns_illegal_state() {
        use std::sync::Barrier;

        let mut config = EventAdminConfig::default();
        config.worker_count = 1;
        config.queue_bound = 2;
        let admin = EventAdmin::builder().config(config).build();
        admin.start().unwrap();

        struct Blocking {
            started: Arc<Barrier>,
            release: Arc<std::sync::Condvar>,
            release_lock: Arc<std::sync::Mutex<bool>>,
        }
        impl crate::handler::EventHandler for Blocking {
            fn handle_event(&self, _topic: &str, _properties: &Properties) -> HandleResult {
                self.started.wait();
                let mut released = self.release_lock.lock().unwrap();
                while !*released {
                    released = self.release.wait(released).unwrap();
                }
                HandleResult::Ok
            }
        }

        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(std::sync::Condvar::new());
        let release_lock = Arc::new(std::sync::Mutex::new(false));
        admin
            .add_handler(registration(
                1,
                "org/celix/test",
                Box::new(Blocking {
                    started: started.clone(),
                    release: release.clone(),
                    release_lock: release_lock.clone(),
                }),
            ))
            .unwrap();

        // Claimed immediately by the single worker, occupying it.
        assert!(admin.post("org/celix/test", Properties::new()).is_ok());
        started.wait();

        assert!(admin.post("org/celix/test", Properties::new()).is_ok());
        assert!(admin.post("org/celix/test", Properties::new()).is_ok());
        let err = admin.post("org/celix/test", Properties::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);

        *release_lock.lock().unwrap() = true;
        release.notify_all();
        admin.remove_handler(1);
        admin.stop();
    }
}
