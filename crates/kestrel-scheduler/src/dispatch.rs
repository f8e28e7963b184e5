//! Retry-with-failover dispatch of a single unit of work.
//!
//! Obtains an executor via `next()`, runs the work, and reports every outcome
//! back to the scheduler. On failure it moves to a failover substitute that
//! has not yet been tried, up to `max_retries` extra attempts.

use std::future::Future;

use kestrel_core::Executor;
use tracing::{info, warn};

use crate::scheduler::ExecutorScheduler;

#[derive(Debug)]
pub struct DispatchOutcome<T> {
    /// Name of the executor that completed the work.
    pub executor: String,
    pub attempts: u32,
    pub value: T,
}

#[derive(Debug, thiserror::Error)]
#[error("dispatch failed after {attempts} attempt(s); last executor '{executor}': {last_error}")]
pub struct DispatchError<E: std::fmt::Display> {
    pub executor: String,
    pub attempts: u32,
    pub last_error: E,
}

pub async fn dispatch<T, E, F, Fut>(
    scheduler: &mut ExecutorScheduler,
    mut work: F,
) -> Result<DispatchOutcome<T>, DispatchError<E>>
where
    F: FnMut(Executor) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = scheduler.failover_policy().max_retries.saturating_add(1);
    let mut current = scheduler.next().clone();
    let mut tried: Vec<String> = Vec::new();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match work(current.clone()).await {
            Ok(value) => {
                scheduler.record_success(&current.name);
                if attempts > 1 {
                    info!(executor = %current.name, attempts, "Dispatch succeeded after failover");
                }
                return Ok(DispatchOutcome {
                    executor: current.name,
                    attempts,
                    value,
                });
            }
            Err(err) => {
                scheduler.record_failure(&current.name);
                warn!(
                    executor = %current.name,
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    "Dispatch attempt failed"
                );
                tried.push(current.name.clone());

                if attempts >= max_attempts {
                    return Err(DispatchError {
                        executor: current.name,
                        attempts,
                        last_error: err,
                    });
                }

                let exclude: Vec<&str> = tried.iter().map(String::as_str).collect();
                let substitute = scheduler.failover_excluding(&exclude).cloned();
                match substitute {
                    Some(next) => current = next,
                    None => {
                        return Err(DispatchError {
                            executor: current.name,
                            attempts,
                            last_error: err,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kestrel_core::{
        DistributionPolicy, Executor, ExecutorRole, FailoverPolicy, FailoverStrategy, ManualClock,
    };

    use super::*;

    fn scheduler(max_retries: u32) -> ExecutorScheduler {
        let executors = vec![
            Executor::new("primary", "codex", 100, ExecutorRole::Primary),
            Executor::new("backup", "copilot", 0, ExecutorRole::Backup),
            Executor::new("tertiary", "claude", 0, ExecutorRole::Tertiary),
        ];
        let policy = FailoverPolicy {
            strategy: FailoverStrategy::NextInLine,
            max_retries,
            cooldown: Duration::from_secs(60),
            disable_on_consecutive_failures: 3,
        };
        ExecutorScheduler::new(executors, policy, DistributionPolicy::PrimaryOnly)
            .unwrap()
            .with_clock(Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn test_dispatch_first_attempt_success() {
        let mut sched = scheduler(2);
        let outcome = dispatch(&mut sched, |e: Executor| async move {
            Ok::<_, String>(format!("done by {}", e.name))
        })
        .await
        .unwrap();
        assert_eq!(outcome.executor, "primary");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.value, "done by primary");
    }

    #[tokio::test]
    async fn test_dispatch_fails_over_in_role_order() {
        let mut sched = scheduler(2);
        let mut seen = Vec::new();
        let outcome = dispatch(&mut sched, |e: Executor| {
            seen.push(e.name.clone());
            async move {
                if e.name == "tertiary" {
                    Ok(())
                } else {
                    Err(format!("{} rate limited", e.name))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["primary", "backup", "tertiary"]);
        assert_eq!(outcome.executor, "tertiary");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(sched.failure_count("primary"), 1);
        assert_eq!(sched.failure_count("backup"), 1);
        assert_eq!(sched.failure_count("tertiary"), 0);
    }

    #[tokio::test]
    async fn test_dispatch_respects_max_retries() {
        let mut sched = scheduler(1);
        let err = dispatch(&mut sched, |e: Executor| async move {
            Err::<(), _>(format!("{} down", e.name))
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.executor, "backup");
        assert_eq!(err.last_error, "backup down");
        assert!(err.to_string().contains("after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_dispatch_stops_when_candidates_exhausted() {
        let mut sched = scheduler(10);
        let err = dispatch(&mut sched, |_e: Executor| async move { Err::<(), _>("boom") })
            .await
            .unwrap_err();
        // Three executors, each tried once.
        assert_eq!(err.attempts, 3);
        assert_eq!(err.executor, "tertiary");
    }

    #[tokio::test]
    async fn test_dispatch_success_clears_failures() {
        let mut sched = scheduler(0);
        sched.record_failure("primary");
        sched.record_failure("primary");
        let outcome = dispatch(&mut sched, |_e: Executor| async move { Ok::<_, String>(7) })
            .await
            .unwrap();
        assert_eq!(outcome.value, 7);
        assert_eq!(sched.failure_count("primary"), 0);
    }
}
