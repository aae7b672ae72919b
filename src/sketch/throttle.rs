//! Trailing-edge throttle for partial sketch updates.
//!
//! Offers inside an armed window replace the pending value; when the window
//! closes only the latest value is sent. The throttle owns no timer; the
//! caller arms one when [`Throttle::offer`] asks for it and calls
//! [`Throttle::fire`] when it elapses.

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;

use std::time::Duration;

use crate::timers::TimerHandle;

#[derive(Debug)]
pub struct Throttle<T> {
    window: Duration,
    pending: Option<T>,
    timer: Option<TimerHandle>,
}

impl<T> Throttle<T> {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, pending: None, timer: None }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Store `value` as the latest. Returns `true` if the caller must arm a
    /// timer for [`Throttle::window`].
    pub fn offer(&mut self, value: T) -> bool {
        self.pending = Some(value);
        self.timer.is_none()
    }

    /// Record the timer armed after [`Throttle::offer`] returned `true`.
    pub fn armed(&mut self, timer: TimerHandle) {
        self.timer = Some(timer);
    }

    /// The window elapsed: take the latest value and disarm.
    pub fn fire(&mut self) -> Option<T> {
        self.timer = None;
        self.pending.take()
    }

    /// Drop any pending value. Returns the timer the caller must clear.
    pub fn cancel(&mut self) -> Option<TimerHandle> {
        self.pending = None;
        self.timer.take()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }
}
