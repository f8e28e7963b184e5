//! Read-only projections of scheduler state for status surfaces.

use serde::Serialize;

use crate::scheduler::ExecutorScheduler;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ExecutorStatus {
    Active,
    Cooldown { remaining_secs: u64 },
    Disabled,
}

impl std::fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Cooldown { remaining_secs } => write!(f, "cooldown {remaining_secs}s"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSummary {
    pub name: String,
    pub kind: String,
    pub variant: String,
    pub role: String,
    pub weight: u32,
    /// Share of the total weight across enabled executors, rounded.
    pub percentage: u32,
    pub status: ExecutorStatus,
    pub consecutive_failures: u32,
    pub models: Vec<String>,
}

impl ExecutorScheduler {
    /// Snapshot of every configured executor. Does not clear expired
    /// cooldowns or otherwise touch scheduler state.
    pub fn summary(&self) -> Vec<ExecutorSummary> {
        let now = self.clock.now();
        let total_weight: u64 = self
            .executors
            .iter()
            .filter(|e| e.enabled)
            .map(|e| u64::from(e.weight))
            .sum();

        self.executors
            .iter()
            .map(|e| {
                let status = if !e.enabled {
                    ExecutorStatus::Disabled
                } else {
                    match self.state.disabled_until.get(&e.name) {
                        Some(until) if *until > now => {
                            let remaining = *until - now;
                            // Round up so a live cooldown never shows as 0s.
                            let secs = remaining.as_secs()
                                + u64::from(remaining.subsec_nanos() > 0);
                            ExecutorStatus::Cooldown {
                                remaining_secs: secs,
                            }
                        }
                        _ => ExecutorStatus::Active,
                    }
                };

                let percentage = if e.enabled && total_weight > 0 {
                    let scaled = u64::from(e.weight) * 100;
                    u32::try_from((scaled + total_weight / 2) / total_weight).unwrap_or(100)
                } else {
                    0
                };

                ExecutorSummary {
                    name: e.name.clone(),
                    kind: e.kind.clone(),
                    variant: e.variant.clone(),
                    role: e.role.to_string(),
                    weight: e.weight,
                    percentage,
                    status,
                    consecutive_failures: self.failure_count(&e.name),
                    models: e.models.clone(),
                }
            })
            .collect()
    }

    /// Human-readable multi-line rendering of [`summary`](Self::summary).
    pub fn to_display_string(&self) -> String {
        let mut lines = vec![format!(
            "Executors (distribution: {}, failover: {})",
            self.distribution, self.failover.strategy
        )];
        for s in self.summary() {
            let mut line = format!(
                "  {} ({}:{}, {}) {}% [{}]",
                s.name, s.kind, s.variant, s.role, s.percentage, s.status
            );
            if s.consecutive_failures > 0 {
                line.push_str(&format!(" failures={}", s.consecutive_failures));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kestrel_core::{
        DistributionPolicy, Executor, ExecutorRole, FailoverPolicy, ManualClock,
    };

    use super::*;

    fn scheduler(clock: &ManualClock) -> ExecutorScheduler {
        let mut off = Executor::new("off", "claude", 20, ExecutorRole::Tertiary);
        off.enabled = false;
        let executors = vec![
            Executor::new("a", "codex", 60, ExecutorRole::Primary),
            Executor::new("b", "copilot", 20, ExecutorRole::Backup),
            off,
        ];
        let policy = FailoverPolicy {
            disable_on_consecutive_failures: 2,
            cooldown: Duration::from_secs(120),
            ..FailoverPolicy::default()
        };
        ExecutorScheduler::new(executors, policy, DistributionPolicy::Weighted)
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_summary_percentages_normalize_over_enabled() {
        let clock = ManualClock::new();
        let sched = scheduler(&clock);
        let summary = sched.summary();
        assert_eq!(summary[0].percentage, 75);
        assert_eq!(summary[1].percentage, 25);
        assert_eq!(summary[2].percentage, 0);
        assert_eq!(summary[2].status, ExecutorStatus::Disabled);
    }

    #[test]
    fn test_summary_reports_cooldown_and_failures() {
        let clock = ManualClock::new();
        let mut sched = scheduler(&clock);
        sched.record_failure("b");
        sched.record_failure("b");
        sched.record_failure("a");
        clock.advance(Duration::from_secs(30));

        let summary = sched.summary();
        assert_eq!(summary[0].status, ExecutorStatus::Active);
        assert_eq!(summary[0].consecutive_failures, 1);
        assert_eq!(
            summary[1].status,
            ExecutorStatus::Cooldown { remaining_secs: 90 }
        );
        assert_eq!(summary[1].consecutive_failures, 0);
    }

    #[test]
    fn test_summary_does_not_clear_expired_cooldown() {
        let clock = ManualClock::new();
        let mut sched = scheduler(&clock);
        sched.record_failure("b");
        sched.record_failure("b");
        clock.advance(Duration::from_secs(500));

        let summary = sched.summary();
        assert_eq!(summary[1].status, ExecutorStatus::Active);
        // The stale entry is still present until a selection call runs.
        assert!(sched.state.disabled_until.contains_key("b"));
        let _ = sched.to_display_string();
        assert!(sched.state.disabled_until.contains_key("b"));
    }

    #[test]
    fn test_display_string_lines() {
        let clock = ManualClock::new();
        let mut sched = scheduler(&clock);
        sched.record_failure("a");
        let text = sched.to_display_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Executors (distribution: weighted, failover: next-in-line)"
        );
        assert_eq!(
            lines[1],
            "  a (codex:default, primary) 75% [active] failures=1"
        );
        assert_eq!(lines[2], "  b (copilot:default, backup) 25% [active]");
        assert_eq!(lines[3], "  off (claude:default, tertiary) 0% [disabled]");
    }

    #[test]
    fn test_summary_serializes_status_tag() {
        let clock = ManualClock::new();
        let mut sched = scheduler(&clock);
        sched.record_failure("b");
        sched.record_failure("b");
        let json = serde_json::to_value(sched.summary()).unwrap();
        assert_eq!(json[1]["status"]["state"], "cooldown");
        assert_eq!(json[1]["status"]["remaining_secs"], 120);
        assert_eq!(json[0]["status"]["state"], "active");
    }
}
