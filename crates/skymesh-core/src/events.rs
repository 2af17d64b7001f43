//! Time-ordered event scheduler over the simulated clock.
//!
//! A queue of `(id, when, callback)` entries fired by [`EventScheduler::run_due`].
//! Events fire exactly once, in `(when, insertion)` order, and never before
//! their due time or after cancellation. Callbacks are invoked with no
//! internal lock held, so a callback may schedule or cancel further events:
//! a re-entrant entry already due runs before the sweep returns, a future one
//! waits for a later sweep.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::clock::SimClock;

pub type EventCallback = Box<dyn FnOnce() + Send>;

/// Opaque handle to a scheduled event. Lexicographically monotonic.
pub type EventId = String;

struct QueuedEvent {
    when: DateTime<Utc>,
    seq: u64,
    id: EventId,
    callback: EventCallback,
}

// Heap ordering: earliest `when` first, insertion order as tie-break.
impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}
impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.when.cmp(&other.when).then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct SchedulerInner {
    queue: BinaryHeap<Reverse<QueuedEvent>>,
    cancelled: HashSet<EventId>,
    next_seq: u64,
}

/// Time-ordered callback queue backed by the simulated clock.
pub struct EventScheduler {
    clock: Arc<SimClock>,
    inner: Mutex<SchedulerInner>,
}

impl EventScheduler {
    pub fn new(clock: Arc<SimClock>) -> Self {
        EventScheduler {
            clock,
            inner: Mutex::new(SchedulerInner::default()),
        }
    }

    /// Insert a callback to fire at simulated time `at`.
    pub fn schedule(
        &self,
        at: DateTime<Utc>,
        callback: impl FnOnce() + Send + 'static,
    ) -> EventId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = format!("evt_{seq:016x}");
        inner.queue.push(Reverse(QueuedEvent {
            when: at,
            seq,
            id: id.clone(),
            callback: Box::new(callback),
        }));
        id
    }

    /// Mark an event cancelled; removal from the queue is lazy.
    pub fn cancel(&self, id: &EventId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cancelled.insert(id.clone());
    }

    /// Number of queued, non-cancelled events.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .queue
            .iter()
            .filter(|Reverse(e)| !inner.cancelled.contains(&e.id))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every queued event. Used on shutdown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.queue.clear();
        inner.cancelled.clear();
    }

    /// Fire every due, non-cancelled event in time order.
    ///
    /// Always re-peeks the current head rather than iterating a snapshot, and
    /// pops before invoking with the lock released. Idempotent: a second call
    /// at the same simulated time fires nothing.
    pub fn run_due(&self) {
        loop {
            let event = {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                // Drop cancelled heads eagerly so they never fire.
                loop {
                    let head_cancelled = match inner.queue.peek() {
                        Some(Reverse(head)) => inner.cancelled.contains(&head.id),
                        None => false,
                    };
                    if !head_cancelled {
                        break;
                    }
                    if let Some(Reverse(head)) = inner.queue.pop() {
                        inner.cancelled.remove(&head.id);
                    }
                }
                let now = self.clock.now();
                let head_due = matches!(inner.queue.peek(), Some(Reverse(head)) if head.when <= now);
                if head_due {
                    inner.queue.pop().map(|Reverse(e)| e)
                } else {
                    None
                }
            };
            match event {
                Some(event) => {
                    tracing::trace!(event_id = %event.id, when = %event.when, "firing event");
                    (event.callback)();
                }
                None => return,
            }
        }
    }
}
