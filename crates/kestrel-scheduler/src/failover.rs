//! Substitute selection after an executor fails.

use kestrel_core::{Executor, FailoverStrategy};
use tracing::{debug, info};

use crate::scheduler::ExecutorScheduler;
use crate::selection;

impl ExecutorScheduler {
    /// Pick a substitute for `current` according to the failover strategy.
    ///
    /// Never returns `current`. Returns `None` when no other executor is
    /// available (or, under `weighted-random`, when every remaining candidate
    /// has weight 0).
    pub fn get_failover(&mut self, current: &str) -> Option<&Executor> {
        self.failover_excluding(&[current])
    }

    /// Like [`get_failover`](Self::get_failover) but skips every name in
    /// `tried`, so a dispatch chain never bounces back to an executor that
    /// already failed it.
    pub fn failover_excluding(&mut self, tried: &[&str]) -> Option<&Executor> {
        let mut candidates = self.available_indices(tried);
        if candidates.is_empty() {
            debug!(?tried, "No failover candidate available");
            return None;
        }

        let idx = match self.failover.strategy {
            FailoverStrategy::NextInLine => {
                selection::by_role_priority(&self.executors, &mut candidates);
                candidates.first().copied()
            }
            FailoverStrategy::WeightedRandom => {
                selection::weighted_pick(&self.executors, &candidates, &mut *self.rng)
            }
            FailoverStrategy::RoundRobin => candidates.first().copied(),
        }?;

        let executor = self.executors.get(idx)?;
        info!(
            failed = ?tried,
            substitute = %executor.name,
            strategy = %self.failover.strategy,
            "Failover selected substitute executor"
        );
        Some(executor)
    }
}
