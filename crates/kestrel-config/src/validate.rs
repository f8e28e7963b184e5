use std::collections::HashSet;

use kestrel_core::AppError;

use crate::config::KestrelConfig;

/// Reject configurations the scheduler and supervisor do not re-check.
pub fn validate_config(config: &KestrelConfig) -> Result<(), AppError> {
    if config.executors.is_empty() {
        return Err(AppError::NoExecutors);
    }

    let mut seen = HashSet::new();
    for entry in &config.executors {
        if entry.name.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "executor name must not be empty".to_string(),
            ));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(AppError::DuplicateExecutor(entry.name.clone()));
        }
    }

    if !config.executors.iter().any(|e| e.enabled) {
        return Err(AppError::InvalidConfig(
            "at least one executor must be enabled".to_string(),
        ));
    }

    if config.failover.disable_on_consecutive_failures == 0 {
        return Err(AppError::InvalidConfig(
            "failover.disable_on_consecutive_failures must be at least 1".to_string(),
        ));
    }

    let supervisor = &config.supervisor;
    if supervisor.max_instant_crashes == 0 {
        return Err(AppError::InvalidConfig(
            "supervisor.max_instant_crashes must be at least 1".to_string(),
        ));
    }
    if supervisor.healthy_run() < supervisor.instant_crash_window() {
        return Err(AppError::InvalidConfig(format!(
            "supervisor.healthy_run_secs ({}s) must not be shorter than instant_crash_window_ms ({}ms)",
            supervisor.healthy_run_secs, supervisor.instant_crash_window_ms
        )));
    }
    if supervisor
        .monitor_command
        .first()
        .is_some_and(|program| program.trim().is_empty())
    {
        return Err(AppError::InvalidConfig(
            "supervisor.monitor_command program must not be empty".to_string(),
        ));
    }

    Ok(())
}
