//! Executor selection with cooldown bookkeeping.
//!
//! State is plain in-memory data mutated through `&mut self`: every call runs
//! to completion before the next one starts, so no locking is involved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kestrel_core::{
    AppError, Clock, DistributionPolicy, Executor, FailoverPolicy, SystemClock,
};
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::selection;

/// Failure counters and cooldown deadlines, keyed by executor name.
#[derive(Debug, Default, Clone)]
pub(crate) struct SchedulerState {
    pub(crate) failure_counts: HashMap<String, u32>,
    pub(crate) disabled_until: HashMap<String, Instant>,
}

impl SchedulerState {
    fn clear(&mut self) {
        self.failure_counts.clear();
        self.disabled_until.clear();
    }
}

pub struct ExecutorScheduler {
    pub(crate) executors: Vec<Executor>,
    pub(crate) failover: FailoverPolicy,
    pub(crate) distribution: DistributionPolicy,
    pub(crate) state: SchedulerState,
    /// Index of the first enabled executor; the fail-open fallback.
    first_enabled: usize,
    cursor: usize,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rng: Box<dyn RngCore + Send>,
}

impl std::fmt::Debug for ExecutorScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorScheduler")
            .field("executors", &self.executors.len())
            .field("distribution", &self.distribution)
            .field("failover", &self.failover)
            .field("state", &self.state)
            .finish()
    }
}

impl ExecutorScheduler {
    /// Build a scheduler over `executors` in configured order.
    ///
    /// Fails with [`AppError::NoExecutors`] when none of them is enabled, so
    /// `next()` always has something to return.
    pub fn new(
        executors: Vec<Executor>,
        failover: FailoverPolicy,
        distribution: DistributionPolicy,
    ) -> Result<Self, AppError> {
        let first_enabled = executors
            .iter()
            .position(|e| e.enabled)
            .ok_or(AppError::NoExecutors)?;

        Ok(Self {
            executors,
            failover,
            distribution,
            state: SchedulerState::default(),
            first_enabled,
            cursor: 0,
            clock: Arc::new(SystemClock),
            rng: Box::new(StdRng::from_entropy()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn executors(&self) -> &[Executor] {
        &self.executors
    }

    pub fn distribution(&self) -> DistributionPolicy {
        self.distribution
    }

    pub fn failover_policy(&self) -> &FailoverPolicy {
        &self.failover
    }

    /// Select an executor for the next unit of work.
    ///
    /// When every enabled executor is cooling down this performs a full
    /// reset of failure counts and cooldowns and returns the first configured
    /// executor. This is an availability-over-strictness choice: dispatch
    /// never wedges with zero candidates, at the cost of retrying a backend
    /// that may still be failing.
    pub fn next(&mut self) -> &Executor {
        let available = self.available_indices(&[]);

        let idx = if available.is_empty() {
            warn!(
                executors = self.executors.len(),
                "All executors cooling down; resetting scheduler state (fail-open)"
            );
            self.state.clear();
            self.first_enabled
        } else {
            match self.distribution {
                DistributionPolicy::Weighted => {
                    match selection::weighted_pick(&self.executors, &available, &mut *self.rng) {
                        Some(idx) => idx,
                        None => {
                            warn!("All available executors have weight 0; using first available");
                            available[0]
                        }
                    }
                }
                DistributionPolicy::RoundRobin => {
                    let idx = available[self.cursor % available.len()];
                    self.cursor = self.cursor.wrapping_add(1);
                    idx
                }
                DistributionPolicy::PrimaryOnly => available[0],
            }
        };

        let executor = &self.executors[idx];
        debug!(
            executor = %executor.name,
            distribution = %self.distribution,
            "Selected executor"
        );
        executor
    }

    /// Count a failure; the executor enters cooldown once the consecutive
    /// failure threshold is reached, and its counter resets to zero in the
    /// same step.
    ///
    /// Returns `true` when this failure put the executor into cooldown.
    pub fn record_failure(&mut self, name: &str) -> bool {
        if !self.executors.iter().any(|e| e.name == name) {
            warn!(executor = %name, "Ignoring failure for unknown executor");
            return false;
        }

        let count = self
            .state
            .failure_counts
            .entry(name.to_string())
            .or_insert(0);
        *count += 1;

        if *count >= self.failover.disable_on_consecutive_failures {
            *count = 0;
            let until = self.clock.now() + self.failover.cooldown;
            self.state.disabled_until.insert(name.to_string(), until);
            info!(
                executor = %name,
                cooldown_secs = self.failover.cooldown.as_secs(),
                "Executor entered cooldown after consecutive failures"
            );
            return true;
        }

        debug!(executor = %name, failures = *count, "Recorded executor failure");
        false
    }

    /// Clear failure count and cooldown for `name`, whatever its state.
    pub fn record_success(&mut self, name: &str) {
        self.state.failure_counts.remove(name);
        if self.state.disabled_until.remove(name).is_some() {
            info!(executor = %name, "Executor cooldown cleared by success");
        }
    }

    /// Whether `name` is enabled and not cooling down. Read-only.
    pub fn is_available(&self, name: &str) -> bool {
        let now = self.clock.now();
        self.executors
            .iter()
            .any(|e| e.name == name && e.enabled && !self.is_cooling(&e.name, now))
    }

    pub fn failure_count(&self, name: &str) -> u32 {
        self.state.failure_counts.get(name).copied().unwrap_or(0)
    }

    /// Time left in `name`'s cooldown, if any.
    pub fn cooldown_remaining(&self, name: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.state
            .disabled_until
            .get(name)
            .filter(|until| **until > now)
            .map(|until| *until - now)
    }

    pub(crate) fn is_cooling(&self, name: &str, now: Instant) -> bool {
        self.state
            .disabled_until
            .get(name)
            .is_some_and(|until| *until > now)
    }

    /// Indices of enabled, non-cooling executors in configured order,
    /// skipping any name in `exclude`. Expired cooldowns are dropped here.
    pub(crate) fn available_indices(&mut self, exclude: &[&str]) -> Vec<usize> {
        let now = self.clock.now();
        self.state.disabled_until.retain(|name, until| {
            let active = *until > now;
            if !active {
                debug!(executor = %name, "Cooldown expired");
            }
            active
        });

        self.executors
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled)
            .filter(|(_, e)| !self.state.disabled_until.contains_key(&e.name))
            .filter(|(_, e)| !exclude.contains(&e.name.as_str()))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
