use serde::{Deserialize, Serialize};

/// The `[notify]` hook: a shell command run on every abnormal monitor exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Whether the hook runs at all (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shell command template. `None` means nothing to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            command: None,
            timeout_secs: default_timeout(),
        }
    }
}
