//! Crash-loop circuit breaker.
//!
//! A crash is "instant" when the child dies within `instant_crash_window` of
//! its start. Consecutive instant crashes accumulate; any run longer than the
//! window resets the streak to 1. Once the streak reaches
//! `max_instant_crashes` the tracker reports `exceeded` and the supervisor
//! stops restarting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kestrel_core::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Normal,
    Tripped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashReport {
    pub instant_crash_count: u32,
    pub exceeded: bool,
    pub run_duration: Duration,
    pub instant_crash_window: Duration,
}

#[derive(Debug, Clone)]
pub struct CrashLoopTracker {
    instant_crash_window: Duration,
    max_instant_crashes: u32,
    last_start: Option<Instant>,
    instant_crash_count: u32,
    clock: Arc<dyn Clock>,
}

impl CrashLoopTracker {
    pub fn new(instant_crash_window: Duration, max_instant_crashes: u32) -> Self {
        Self {
            instant_crash_window,
            max_instant_crashes,
            last_start: None,
            instant_crash_count: 0,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn mark_start(&mut self) {
        let now = self.clock.now();
        self.mark_start_at(now);
    }

    pub fn mark_start_at(&mut self, at: Instant) {
        self.last_start = Some(at);
    }

    pub fn record_exit(&mut self) -> CrashReport {
        let now = self.clock.now();
        self.record_exit_at(now)
    }

    /// Record an abnormal exit observed at `at`.
    ///
    /// Without a prior `mark_start` the run counts as zero-length, i.e.
    /// instant.
    pub fn record_exit_at(&mut self, at: Instant) -> CrashReport {
        let run_duration = self
            .last_start
            .map(|start| at.saturating_duration_since(start))
            .unwrap_or_default();

        if run_duration <= self.instant_crash_window {
            self.instant_crash_count = self.instant_crash_count.saturating_add(1);
        } else {
            self.instant_crash_count = 1;
        }

        CrashReport {
            instant_crash_count: self.instant_crash_count,
            exceeded: self.is_tripped(),
            run_duration,
            instant_crash_window: self.instant_crash_window,
        }
    }

    pub fn reset(&mut self) {
        self.instant_crash_count = 0;
        self.last_start = None;
    }

    pub fn state(&self) -> TrackerState {
        if self.is_tripped() {
            TrackerState::Tripped
        } else {
            TrackerState::Normal
        }
    }

    pub fn instant_crash_count(&self) -> u32 {
        self.instant_crash_count
    }

    fn is_tripped(&self) -> bool {
        self.max_instant_crashes > 0 && self.instant_crash_count >= self.max_instant_crashes
    }
}
