//! Timer capability for the single-threaded event loop.
//!
//! Reconnect backoff and partial-update throttling are both "call me back
//! later, unless cancelled". [`Timers`] is that capability plus a clock, so
//! the connection manager and sketch protocol never touch tokio directly.
//!
//! - [`TokioTimers`] runs callbacks on the current `LocalSet` via
//!   `spawn_local` + `tokio::time::sleep`.
//! - [`ManualTimers`] is a deterministic wheel advanced by hand, used by the
//!   unit tests and by embedders that replay sessions.

#[cfg(test)]
#[path = "timers_test.rs"]
mod timers_test;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Deferred work scheduled through [`Timers::set_timeout`].
pub type TimerCallback = Box<dyn FnOnce()>;

/// Identifies a scheduled callback for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Clock plus one-shot timers.
///
/// Callbacks must never run from inside `set_timeout` itself.
pub trait Timers {
    fn now(&self) -> Instant;
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
    /// Cancel a pending callback. Unknown or already-fired handles are ignored.
    fn clear_timeout(&self, handle: TimerHandle);
}

/// Timers backed by the tokio runtime. Must be used inside a `LocalSet`.
#[derive(Default)]
pub struct TokioTimers {
    next_id: Cell<u64>,
    tasks: Rc<RefCell<HashMap<u64, tokio::task::AbortHandle>>>,
}

impl TokioTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Timers for TokioTimers {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let tasks = Rc::clone(&self.tasks);
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            tasks.borrow_mut().remove(&id);
            callback();
        });
        self.tasks.borrow_mut().insert(id, task.abort_handle());
        TimerHandle(id)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        if let Some(task) = self.tasks.borrow_mut().remove(&handle.0) {
            task.abort();
        }
    }
}

struct PendingTimer {
    id: u64,
    due: Instant,
    callback: TimerCallback,
}

/// Hand-driven timer wheel. Time only moves inside [`ManualTimers::advance`].
pub struct ManualTimers {
    now: Cell<Instant>,
    next_id: Cell<u64>,
    pending: RefCell<Vec<PendingTimer>>,
}

impl Default for ManualTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimers {
    #[must_use]
    pub fn new() -> Self {
        Self { now: Cell::new(Instant::now()), next_id: Cell::new(0), pending: RefCell::new(Vec::new()) }
    }

    /// Move the clock forward, firing due callbacks in deadline order.
    ///
    /// Callbacks may schedule further timers; those fire too if they fall
    /// inside the advanced window.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        while let Some(timer) = self.pop_due(target) {
            self.now.set(timer.due);
            (timer.callback)();
        }
        self.now.set(target);
    }

    /// Number of callbacks still waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Delay until the earliest pending callback, if any.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        let now = self.now.get();
        self.pending.borrow().iter().map(|t| t.due.saturating_duration_since(now)).min()
    }

    fn pop_due(&self, target: Instant) -> Option<PendingTimer> {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(index, _)| index)?;
        Some(pending.swap_remove(index))
    }
}

impl Timers for ManualTimers {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.pending.borrow_mut().push(PendingTimer { id, due: self.now.get() + delay, callback });
        TimerHandle(id)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        self.pending.borrow_mut().retain(|t| t.id != handle.0);
    }
}
