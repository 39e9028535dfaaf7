// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock abstraction.
//!
//! Check marks are stored as file mtimes, so the clock deals in epoch
//! seconds rather than monotonic instants.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time and pauses.
pub trait Clock {
    /// Current wall-clock time in epoch seconds.
    fn now(&self) -> f64;

    /// Pause the calling thread.
    fn sleep(&self, duration: Duration);
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Default)]
struct FakeClockState {
    queued: VecDeque<f64>,
    current: f64,
    step: f64,
    sleeps: Vec<Duration>,
}

/// Clock for tests: reads come from a queue of instants, then advance by a
/// fixed step per read once the queue drains.
///
/// Clones share state, so a test can hold a handle while the component under
/// test owns another. Sleeps are recorded and also actually performed, since
/// tests may be waiting on real child processes.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    /// Create a clock that will serve the given instants in order.
    pub fn new(times: impl IntoIterator<Item = f64>) -> Self {
        let clock = Self::default();
        {
            let mut state = clock.state.lock();
            state.queued.extend(times);
        }
        clock
    }

    /// Advance by `step` seconds on each read after the queue drains.
    pub fn with_step(self, step: f64) -> Self {
        self.state.lock().step = step;
        self
    }

    /// Append an instant to the queue.
    pub fn push(&self, time: f64) {
        self.state.lock().queued.push_back(time);
    }

    /// Number of sleeps performed so far.
    pub fn sleep_count(&self) -> usize {
        self.state.lock().sleeps.len()
    }

    /// Total time slept so far.
    pub fn slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> f64 {
        let mut state = self.state.lock();
        match state.queued.pop_front() {
            Some(time) => {
                state.current = time;
                time
            }
            None => {
                state.current += state.step;
                state.current
            }
        }
    }

    fn sleep(&self, duration: Duration) {
        self.state.lock().sleeps.push(duration);
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
