//! TOML configuration model and loader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use kestrel_core::{
    AppError, DistributionPolicy, Executor, ExecutorRole, ExternalKillPolicy, FailoverPolicy,
    FailoverStrategy,
};
use kestrel_hooks::HookConfig;
use serde::{Deserialize, Serialize};

use crate::paths;
use crate::validate::validate_config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KestrelConfig {
    #[serde(default)]
    pub distribution: DistributionSection,
    #[serde(default)]
    pub failover: FailoverSection,
    #[serde(default = "default_executors")]
    pub executors: Vec<ExecutorEntry>,
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub notify: HookConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for KestrelConfig {
    fn default() -> Self {
        Self {
            distribution: DistributionSection::default(),
            failover: FailoverSection::default(),
            executors: default_executors(),
            supervisor: SupervisorSection::default(),
            notify: HookConfig::default(),
            logging: LoggingSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSection {
    #[serde(default)]
    pub mode: DistributionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverSection {
    #[serde(default)]
    pub strategy: FailoverStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default = "default_failure_threshold")]
    pub disable_on_consecutive_failures: u32,
}

fn default_max_retries() -> u32 {
    3
}
fn default_cooldown_minutes() -> u64 {
    5
}
fn default_failure_threshold() -> u32 {
    3
}

impl Default for FailoverSection {
    fn default() -> Self {
        Self {
            strategy: FailoverStrategy::default(),
            max_retries: default_max_retries(),
            cooldown_minutes: default_cooldown_minutes(),
            disable_on_consecutive_failures: default_failure_threshold(),
        }
    }
}

/// One `[[executors]]` table. `role` defaults by position when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorEntry {
    pub name: String,
    #[serde(alias = "kind")]
    pub executor: String,
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ExecutorRole>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_variant() -> String {
    "default".to_string()
}
fn default_weight() -> u32 {
    100
}
fn default_true() -> bool {
    true
}

fn default_executors() -> Vec<ExecutorEntry> {
    vec![ExecutorEntry {
        name: "codex-default".to_string(),
        executor: "codex".to_string(),
        variant: default_variant(),
        weight: default_weight(),
        role: Some(ExecutorRole::Primary),
        enabled: true,
        models: Vec::new(),
    }]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSection {
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_restarts: u32,
    #[serde(default = "default_instant_crash_window_ms")]
    pub instant_crash_window_ms: u64,
    #[serde(default = "default_max_instant_crashes")]
    pub max_instant_crashes: u32,
    #[serde(default = "default_self_restart_delay_ms")]
    pub self_restart_delay_ms: u64,
    #[serde(default = "default_external_kill_delay_ms")]
    pub external_kill_delay_ms: u64,
    #[serde(default)]
    pub external_kill_policy: ExternalKillPolicy,
    #[serde(default = "default_healthy_run_secs")]
    pub healthy_run_secs: u64,
    #[serde(default = "default_ghost_kill_timeout_ms")]
    pub ghost_kill_timeout_ms: u64,
    /// Monitor argv. Empty means `<current exe> monitor`.
    #[serde(default)]
    pub monitor_command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_dir: Option<PathBuf>,
}

fn default_restart_delay_ms() -> u64 {
    5_000
}
fn default_instant_crash_window_ms() -> u64 {
    15_000
}
fn default_max_instant_crashes() -> u32 {
    3
}
fn default_self_restart_delay_ms() -> u64 {
    2_000
}
fn default_external_kill_delay_ms() -> u64 {
    5_000
}
fn default_healthy_run_secs() -> u64 {
    300
}
fn default_ghost_kill_timeout_ms() -> u64 {
    5_000
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            restart_delay_ms: default_restart_delay_ms(),
            max_restarts: 0,
            instant_crash_window_ms: default_instant_crash_window_ms(),
            max_instant_crashes: default_max_instant_crashes(),
            self_restart_delay_ms: default_self_restart_delay_ms(),
            external_kill_delay_ms: default_external_kill_delay_ms(),
            external_kill_policy: ExternalKillPolicy::default(),
            healthy_run_secs: default_healthy_run_secs(),
            ghost_kill_timeout_ms: default_ghost_kill_timeout_ms(),
            monitor_command: Vec::new(),
            pid_dir: None,
        }
    }
}

impl SupervisorSection {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn instant_crash_window(&self) -> Duration {
        Duration::from_millis(self.instant_crash_window_ms)
    }

    pub fn self_restart_delay(&self) -> Duration {
        Duration::from_millis(self.self_restart_delay_ms)
    }

    pub fn external_kill_delay(&self) -> Duration {
        Duration::from_millis(self.external_kill_delay_ms)
    }

    pub fn healthy_run(&self) -> Duration {
        Duration::from_secs(self.healthy_run_secs)
    }

    pub fn ghost_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.ghost_kill_timeout_ms)
    }

    /// Configured PID directory, else the per-user runtime directory.
    pub fn pid_dir(&self) -> PathBuf {
        self.pid_dir.clone().unwrap_or_else(paths::runtime_dir)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// When set, logs are also written to `kestrel-{timestamp}.log` here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl KestrelConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Load, apply `KESTREL_*` environment overrides, and validate.
    ///
    /// `path` of `None` means the default location; if that cannot be
    /// determined the built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match paths::default_config_path() {
                Some(path) => Self::load_from(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// Recognised keys: `KESTREL_RESTART_DELAY_MS`, `KESTREL_MAX_RESTARTS`,
    /// `KESTREL_DISTRIBUTION`. Empty values are ignored.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = get("KESTREL_RESTART_DELAY_MS") {
            self.supervisor.restart_delay_ms = raw.trim().parse().map_err(|_| {
                AppError::InvalidConfig(format!("KESTREL_RESTART_DELAY_MS: invalid number '{raw}'"))
            })?;
        }
        if let Some(raw) = get("KESTREL_MAX_RESTARTS") {
            self.supervisor.max_restarts = raw.trim().parse().map_err(|_| {
                AppError::InvalidConfig(format!("KESTREL_MAX_RESTARTS: invalid number '{raw}'"))
            })?;
        }
        if let Some(raw) = get("KESTREL_DISTRIBUTION") {
            self.distribution.mode = raw
                .parse()
                .map_err(|err: String| AppError::InvalidConfig(format!("KESTREL_DISTRIBUTION: {err}")))?;
        }
        Ok(())
    }

    /// Executors in configured order with positional role defaults applied.
    pub fn executors(&self) -> Vec<Executor> {
        self.executors
            .iter()
            .enumerate()
            .map(|(index, entry)| Executor {
                name: entry.name.clone(),
                kind: entry.executor.clone(),
                variant: entry.variant.clone(),
                weight: entry.weight,
                role: entry
                    .role
                    .clone()
                    .unwrap_or_else(|| ExecutorRole::for_position(index)),
                enabled: entry.enabled,
                models: entry.models.clone(),
            })
            .collect()
    }

    pub fn failover_policy(&self) -> FailoverPolicy {
        FailoverPolicy {
            strategy: self.failover.strategy,
            max_retries: self.failover.max_retries,
            cooldown: Duration::from_secs(self.failover.cooldown_minutes.saturating_mul(60)),
            disable_on_consecutive_failures: self.failover.disable_on_consecutive_failures,
        }
    }

    pub fn distribution(&self) -> DistributionPolicy {
        self.distribution.mode
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
