// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One-shot timers fired from the frame loop.
//!
//! Timers are keyed on application time, not wall time, so on a slave they
//! fire in the same frame as on the master.

/// Fires timer events whose due time has passed.
pub trait TimerScheduler {
    /// Fires every event due at or before `now`; returns how many fired.
    fn trigger_due(&mut self, now: f64) -> usize;

    /// Due time of the earliest pending event.
    fn next_due(&self) -> Option<f64>;
}

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Callback invoked with the frame time that triggered it.
pub type TimerCallback = Box<dyn FnOnce(f64) + Send>;

struct Timer {
    id: TimerId,
    due: f64,
    callback: TimerCallback,
}

/// Timers ordered by due time, then by scheduling order.
#[derive(Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u64,
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.timers.iter().map(|t| (t.id, t.due)))
            .finish()
    }
}

impl TimerQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `callback` for application time `due`.
    pub fn schedule(&mut self, due: f64, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        // Ties go after existing timers with the same due time.
        let slot = self
            .timers
            .partition_point(|t| t.due.total_cmp(&due).is_le());
        self.timers.insert(slot, Timer { id, due, callback });
        id
    }

    /// Removes a pending timer; `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.iter().position(|t| t.id == id) {
            Some(slot) => {
                self.timers.remove(slot);
                true
            }
            None => false,
        }
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl TimerScheduler for TimerQueue {
    fn trigger_due(&mut self, now: f64) -> usize {
        let count = self.timers.partition_point(|t| t.due <= now);
        for timer in self.timers.drain(..count) {
            (timer.callback)(now);
        }
        count
    }

    fn next_due(&self) -> Option<f64> {
        self.timers.first().map(|t| t.due)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> TimerCallback {
        let log = Arc::clone(log);
        Box::new(move |_| log.lock().unwrap().push(name))
    }

    #[test]
    fn fires_in_due_then_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut q = TimerQueue::new();
        q.schedule(2.0, push(&log, "late"));
        q.schedule(1.0, push(&log, "first"));
        q.schedule(1.0, push(&log, "second"));
        assert_eq!(q.next_due(), Some(1.0));

        assert_eq!(q.trigger_due(0.5), 0);
        assert_eq!(q.trigger_due(1.5), 2);
        assert_eq!(*log.lock().unwrap(), ["first", "second"]);
        assert_eq!(q.trigger_due(2.0), 1);
        assert!(q.is_empty());
        assert_eq!(q.next_due(), None);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut q = TimerQueue::new();
        let id = q.schedule(1.0, push(&log, "cancelled"));
        q.schedule(1.0, push(&log, "kept"));
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        q.trigger_due(10.0);
        assert_eq!(*log.lock().unwrap(), ["kept"]);
    }

    #[test]
    fn callback_sees_trigger_time() {
        let seen = Arc::new(Mutex::new(0.0));
        let sink = Arc::clone(&seen);
        let mut q = TimerQueue::new();
        q.schedule(1.0, Box::new(move |t| *sink.lock().unwrap() = t));
        q.trigger_due(1.25);
        assert!((*seen.lock().unwrap() - 1.25).abs() < f64::EPSILON);
    }
}
