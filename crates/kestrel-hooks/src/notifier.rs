//! [`NotificationSink`] backed by the `[notify]` shell hook.

use std::collections::HashMap;

use kestrel_core::{CrashNotice, NotificationSink};

use crate::config::HookConfig;
use crate::runner::run_hook;

/// Runs the configured command for every notice. Errors are logged at
/// `warn` and never returned.
#[derive(Debug, Clone)]
pub struct HookNotifier {
    config: HookConfig,
}

impl HookNotifier {
    pub fn new(config: HookConfig) -> Self {
        Self { config }
    }
}

impl NotificationSink for HookNotifier {
    fn notify(&self, notice: &CrashNotice) {
        let variables = notice_variables(notice);
        if let Err(err) = run_hook(&self.config, &variables) {
            tracing::warn!(kind = notice.kind.as_str(), error = %err, "Notify hook failed");
        }
    }
}

/// Template variables for a notice. Absent values render as empty strings.
pub fn notice_variables(notice: &CrashNotice) -> HashMap<String, String> {
    fn opt<T: ToString>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    HashMap::from([
        ("kind".to_string(), notice.kind.as_str().to_string()),
        ("exit_code".to_string(), opt(notice.exit_code)),
        ("signal".to_string(), opt(notice.signal)),
        (
            "next_restart_delay_ms".to_string(),
            opt(notice.next_restart_delay_ms),
        ),
        ("attempt".to_string(), notice.attempt.to_string()),
        ("max_restarts".to_string(), notice.max_restarts.to_string()),
    ])
}
