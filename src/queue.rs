//! Bounded asynchronous queue (§3 "Async Queue Entry", §4.6).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::event::Event;
use crate::handler::HandlerDescriptor;

/// One pending async delivery: an event plus the handler ids that still
/// need to see it. Entries are removed once their id set is exhausted —
/// either because a worker delivered to that id, or because the id's
/// descriptor disappeared (handler removed while queued).
pub struct QueueEntry {
    pub event: Event,
    pub remaining: Vec<i64>,
}

struct QueueState {
    entries: Vec<QueueEntry>,
    running: bool,
}

/// The queue mutex/condvar pair, bounded at construction time.
pub struct AsyncQueue {
    bound: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

/// One unit of work handed from the queue to a worker: an id that is now
/// eligible for delivery, the event it belongs to, and the descriptor
/// looked up while still holding the queue mutex's companion registry read
/// lock (§4.6 step 2 keeps the lookup, not the call, under the lock).
pub struct Claimed {
    pub event: Event,
    pub descriptor: Arc<HandlerDescriptor>,
}

impl AsyncQueue {
    #[must_use]
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            state: Mutex::new(QueueState { entries: Vec::new(), running: true }),
            not_empty: Condvar::new(),
        }
    }

    /// §4.6 `post` step: push `entry` onto the tail unless the queue is at
    /// its bound. Returns `false` ("queue full") without mutating state.
    pub fn try_push(&self, entry: QueueEntry) -> bool {
        let mut state = self.state.lock();
        if state.entries.len() >= self.bound {
            return false;
        }
        state.entries.push(entry);
        self.not_empty.notify_one();
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Worker loop step 1-2: block until `running` is false or an eligible
    /// `(entry, handler_id)` pair exists, then claim it by fetch-adding the
    /// descriptor's in-flight count. `lookup` resolves an id to its current
    /// descriptor (or `None` if the handler has been removed) and is called
    /// while holding the queue mutex, matching the lock-order rule in §5.
    ///
    /// Returns `None` once `running` is false and nothing eligible remains,
    /// signalling the worker should exit.
    pub fn wait_for_eligible(
        &self,
        max_parallel: usize,
        lookup: impl Fn(i64) -> Option<Arc<HandlerDescriptor>>,
    ) -> Option<Claimed> {
        let mut state = self.state.lock();
        loop {
            if let Some(claimed) = Self::scan_once(&mut state, max_parallel, &lookup) {
                return Some(claimed);
            }
            if !state.running {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    fn scan_once(
        state: &mut QueueState,
        max_parallel: usize,
        lookup: &impl Fn(i64) -> Option<Arc<HandlerDescriptor>>,
    ) -> Option<Claimed> {
        let mut found = None;
        let mut index = 0;
        while index < state.entries.len() {
            let entry = &mut state.entries[index];
            let mut claim_at = None;
            for (pos, &id) in entry.remaining.iter().enumerate() {
                match lookup(id) {
                    None => {
                        claim_at = Some((pos, None));
                        break;
                    }
                    Some(descriptor) => {
                        if descriptor.try_acquire_slot(max_parallel) {
                            claim_at = Some((pos, Some(descriptor)));
                            break;
                        }
                    }
                }
            }
            match claim_at {
                Some((pos, Some(descriptor))) => {
                    entry.remaining.remove(pos);
                    let event = entry.event.clone();
                    if entry.remaining.is_empty() {
                        state.entries.remove(index);
                    }
                    found = Some(Claimed { event, descriptor });
                    break;
                }
                Some((pos, None)) => {
                    entry.remaining.remove(pos);
                    if entry.remaining.is_empty() {
                        state.entries.remove(index);
                    } else {
                        index += 1;
                    }
                }
                None => index += 1,
            }
        }
        found
    }

    /// §4.8 `stop`: flip `running` and wake every waiter.
    pub fn shut_down(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.not_empty.notify_all();
    }

    /// Reset `running` to `true` after a partial `start` failure has torn
    /// down the threads it managed to spawn, so a later `start` attempt
    /// finds a live queue rather than one permanently shut down.
    pub fn reactivate(&self) {
        self.state.lock().running = true;
    }

    /// Entries still queued at `stop`/`destroy` time are simply dropped —
    /// the documented at-most-once contract (§4.6 "Stop").
    pub fn drain(&self) -> Vec<QueueEntry> {
        std::mem::take(&mut self.state.lock().entries)
    }
}
