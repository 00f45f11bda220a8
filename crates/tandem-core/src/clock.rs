// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame clock: application time, frame deltas, the median frame-time
//! filter, the optional frame-rate cap, and playback synchronization.
//!
//! Only the master samples a [`TimeSource`]. Slaves never read their own
//! clock for frame timing; they [`FrameClock::adopt`] whatever the master
//! broadcast, so every node agrees on `frame_time` bit for bit.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tandem_config::ConfigError;

/// Source of application time in seconds.
pub trait TimeSource {
    /// Seconds elapsed since the source started.
    fn now(&self) -> f64;

    /// Blocks for `seconds`; non-positive values return immediately.
    fn sleep(&self, seconds: f64);
}

/// Wall-clock source backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Starts counting from now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            thread::sleep(Duration::from_secs_f64(seconds));
        }
    }
}

/// Hand-driven time source; `sleep` advances time instead of blocking.
///
/// Clones share state, so a test can keep one handle while the clock owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    slept: f64,
}

impl ManualClock {
    /// Clock reading `start` seconds.
    pub fn new(start: f64) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Jumps to an absolute time.
    pub fn set(&self, now: f64) {
        self.state().now = now;
    }

    /// Moves time forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.state().now += seconds;
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> f64 {
        self.state().slept
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        self.state().now
    }

    fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            let mut state = self.state();
            state.now += seconds;
            state.slept += seconds;
        }
    }
}

/// Result of one master tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Application time of the new frame.
    pub frame_time: f64,
    /// Time since the previous frame.
    pub delta: f64,
}

#[derive(Debug, Clone, Copy)]
struct SynchRequest {
    target: f64,
    wait: bool,
}

/// Per-node frame timing state.
#[derive(Debug)]
pub struct FrameClock<S> {
    source: S,
    last_frame_time: f64,
    last_frame_delta: f64,
    recent_deltas: Vec<f64>,
    sorted: Vec<f64>,
    next_index: usize,
    median_frame_time: f64,
    minimum_frame_time: f64,
    synch: Option<SynchRequest>,
    next_frame_time: Option<f64>,
    animation_frame_interval: f64,
}

impl<S: TimeSource> FrameClock<S> {
    /// Number of recent deltas in the median filter by default.
    pub const DEFAULT_WINDOW: usize = 5;
    /// Suggested animation step (125 Hz) until configured otherwise.
    pub const DEFAULT_ANIMATION_INTERVAL: f64 = 1.0 / 125.0;

    /// Creates a clock whose first frame time is `source.now()`.
    ///
    /// The median filter starts filled with one-second deltas.
    pub fn new(source: S, window: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::invalid("median_window", "must be at least 1"));
        }
        let last_frame_time = source.now();
        Ok(Self {
            source,
            last_frame_time,
            last_frame_delta: 0.0,
            recent_deltas: vec![1.0; window],
            sorted: vec![1.0; window],
            next_index: 0,
            median_frame_time: 1.0,
            minimum_frame_time: 0.0,
            synch: None,
            next_frame_time: None,
            animation_frame_interval: Self::DEFAULT_ANIMATION_INTERVAL,
        })
    }

    /// Master: samples the time source and starts a new frame.
    ///
    /// A pending synchronization request wins over the rate cap: with
    /// `wait` the clock sleeps until the target, and the frame time is
    /// the target exactly either way. Otherwise, when a cap is set and the
    /// frame came too early, the clock sleeps off the remainder and samples
    /// again.
    pub fn tick(&mut self) -> FrameTiming {
        let previous = self.last_frame_time;
        let mut now = self.source.now();
        if let Some(SynchRequest { target, wait }) = self.synch.take() {
            if wait && now < target {
                self.source.sleep(target - now);
            }
            now = target;
        } else if self.minimum_frame_time > 0.0 && now - previous < self.minimum_frame_time {
            self.source
                .sleep(self.minimum_frame_time - (now - previous));
            now = self.source.now();
        }

        self.last_frame_time = now;
        self.last_frame_delta = now - previous;
        self.record_delta(self.last_frame_delta);
        self.next_frame_time = None;
        FrameTiming {
            frame_time: now,
            delta: self.last_frame_delta,
        }
    }

    /// Pushes one delta into the circular buffer and recomputes the median.
    ///
    /// The median is `sorted[N / 2]`, i.e. the upper-middle element for even N.
    pub fn record_delta(&mut self, delta: f64) {
        let n = self.recent_deltas.len();
        self.recent_deltas[self.next_index] = delta;
        self.next_index = (self.next_index + 1) % n;

        // Insertion sort keeps this allocation-free and stable for small N.
        for i in 0..n {
            let value = self.recent_deltas[i];
            let mut j = i;
            while j > 0 && self.sorted[j - 1] > value {
                self.sorted[j] = self.sorted[j - 1];
                j -= 1;
            }
            self.sorted[j] = value;
        }
        self.median_frame_time = self.sorted[n / 2];
    }

    /// Requests that the next frame happen at `target_time`.
    pub fn request_synch(&mut self, target_time: f64, wait: bool) {
        self.synch = Some(SynchRequest {
            target: target_time,
            wait,
        });
    }

    /// Earliest time the next frame can start, without side effects.
    pub fn peek_time(&self) -> f64 {
        let mut result = self.source.now();
        if let Some(synch) = self.synch {
            result = result.max(synch.target);
        }
        result.max(self.last_frame_time + self.minimum_frame_time)
    }

    /// Slave: overwrite timing with the master's broadcast values.
    pub fn adopt(&mut self, frame_time: f64, median_frame_time: f64) -> FrameTiming {
        self.last_frame_delta = frame_time - self.last_frame_time;
        self.last_frame_time = frame_time;
        self.median_frame_time = median_frame_time;
        self.next_frame_time = None;
        FrameTiming {
            frame_time,
            delta: self.last_frame_delta,
        }
    }

    /// Resets the frame-time origin (used when the master broadcasts its
    /// initial time at startup).
    pub fn set_origin(&mut self, frame_time: f64) {
        self.last_frame_time = frame_time;
        self.last_frame_delta = 0.0;
    }

    /// Caps the frame rate; `0` removes the cap.
    pub fn set_maximum_frame_rate(&mut self, fps: f64) -> Result<(), ConfigError> {
        if !fps.is_finite() || fps < 0.0 {
            return Err(ConfigError::invalid(
                "maximum_frame_rate",
                format!("{fps} is not a non-negative rate"),
            ));
        }
        self.minimum_frame_time = if fps > 0.0 { 1.0 / fps } else { 0.0 };
        Ok(())
    }

    /// Records an application request for an update no later than `time`;
    /// the earliest request since the last tick wins.
    pub fn schedule_update(&mut self, time: f64) {
        self.next_frame_time = Some(match self.next_frame_time {
            Some(current) => current.min(time),
            None => time,
        });
    }

    /// Earliest requested update time since the last tick.
    pub fn next_scheduled_update(&self) -> Option<f64> {
        self.next_frame_time
    }

    /// Sets the suggested interval between animation steps.
    pub fn set_animation_frame_interval(&mut self, seconds: f64) {
        self.animation_frame_interval = seconds;
    }

    /// Suggested time of the next animation step.
    pub fn next_animation_time(&self) -> f64 {
        self.last_frame_time + self.animation_frame_interval
    }

    /// Application time of the current frame.
    pub fn frame_time(&self) -> f64 {
        self.last_frame_time
    }

    /// Time between the previous and the current frame.
    pub fn frame_delta(&self) -> f64 {
        self.last_frame_delta
    }

    /// Median of the recent frame deltas.
    pub fn median_frame_time(&self) -> f64 {
        self.median_frame_time
    }

    /// Minimum frame duration implied by the rate cap (0 when uncapped).
    pub fn minimum_frame_time(&self) -> f64 {
        self.minimum_frame_time
    }

    /// Underlying time source.
    pub fn source(&self) -> &S {
        &self.source
    }
}
