use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A configured backend capable of performing a unit of work.
///
/// Immutable once loaded. Cooldown and failure bookkeeping lives in the
/// scheduler, never on the executor itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executor {
    /// Unique identifier (uniqueness is checked by the config loader).
    pub name: String,
    /// Backend type, e.g. `codex`, `copilot`, `claude`.
    #[serde(alias = "executor")]
    pub kind: String,
    #[serde(default = "default_variant")]
    pub variant: String,
    /// Relative share under weighted distribution. Zero is legal.
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub role: ExecutorRole,
    #[serde(default = "default_enabled")]
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

fn default_enabled() -> bool {
    true
}

impl Executor {
    /// Convenience constructor used by tests and the built-in default config.
    pub fn new(name: &str, kind: &str, weight: u32, role: ExecutorRole) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            variant: default_variant(),
            weight,
            role,
            enabled: true,
            models: Vec::new(),
        }
    }
}

/// Failover priority label.
///
/// Ordering used by next-in-line failover:
/// `primary` -> `backup` -> `tertiary` -> `executor-N` (ascending N) -> anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutorRole {
    Primary,
    Backup,
    Tertiary,
    Numbered(u32),
    Other(String),
}

impl ExecutorRole {
    /// Positional default: first executor is primary, second backup, third
    /// tertiary, the rest `executor-N` with N = position (1-based).
    pub fn for_position(index: usize) -> Self {
        match index {
            0 => Self::Primary,
            1 => Self::Backup,
            2 => Self::Tertiary,
            n => Self::Numbered(u32::try_from(n + 1).unwrap_or(u32::MAX)),
        }
    }

    /// Sort key for failover ordering; lower sorts first.
    pub fn priority(&self) -> (u8, u32) {
        match self {
            Self::Primary => (0, 0),
            Self::Backup => (1, 0),
            Self::Tertiary => (2, 0),
            Self::Numbered(n) => (3, *n),
            Self::Other(_) => (4, 0),
        }
    }
}

impl From<&str> for ExecutorRole {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "primary" => Self::Primary,
            "backup" => Self::Backup,
            "tertiary" => Self::Tertiary,
            lower => match lower
                .strip_prefix("executor-")
                .and_then(|n| n.parse::<u32>().ok())
            {
                Some(n) => Self::Numbered(n),
                None => Self::Other(trimmed.to_string()),
            },
        }
    }
}

impl From<String> for ExecutorRole {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ExecutorRole> for String {
    fn from(role: ExecutorRole) -> Self {
        role.to_string()
    }
}

impl std::fmt::Display for ExecutorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Backup => write!(f, "backup"),
            Self::Tertiary => write!(f, "tertiary"),
            Self::Numbered(n) => write!(f, "executor-{n}"),
            Self::Other(label) => write!(f, "{label}"),
        }
    }
}

/// How `next()` spreads work across available executors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionPolicy {
    #[default]
    Weighted,
    RoundRobin,
    PrimaryOnly,
}

impl DistributionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weighted => "weighted",
            Self::RoundRobin => "round-robin",
            Self::PrimaryOnly => "primary-only",
        }
    }
}

impl std::str::FromStr for DistributionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "weighted" => Ok(Self::Weighted),
            "round-robin" => Ok(Self::RoundRobin),
            "primary-only" => Ok(Self::PrimaryOnly),
            other => Err(format!(
                "Invalid distribution '{other}'. Valid values: weighted, round-robin, primary-only"
            )),
        }
    }
}

impl std::fmt::Display for DistributionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a substitute executor is chosen after a failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverStrategy {
    #[default]
    NextInLine,
    WeightedRandom,
    RoundRobin,
}

impl FailoverStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextInLine => "next-in-line",
            Self::WeightedRandom => "weighted-random",
            Self::RoundRobin => "round-robin",
        }
    }
}

impl std::fmt::Display for FailoverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an externally killed monitor (SIGKILL, exit code -1 / 4294967295)
/// may halt automatic restarts.
///
/// External kills always count toward the crash-loop streak and the restart
/// attempt counter. Under `AlwaysRetry` they are nevertheless always
/// restarted; under `Budgeted` they halt like any other crash once the
/// breaker trips or the budget runs out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExternalKillPolicy {
    #[default]
    AlwaysRetry,
    Budgeted,
}

/// Failover settings, loaded once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    pub strategy: FailoverStrategy,
    /// Extra attempts a dispatch may make after the first one fails.
    pub max_retries: u32,
    pub cooldown: Duration,
    pub disable_on_consecutive_failures: u32,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            strategy: FailoverStrategy::NextInLine,
            max_retries: 3,
            cooldown: Duration::from_secs(5 * 60),
            disable_on_consecutive_failures: 3,
        }
    }
}

/// Output format for CLI responses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(ExecutorRole::from("primary"), ExecutorRole::Primary);
        assert_eq!(ExecutorRole::from("Backup"), ExecutorRole::Backup);
        assert_eq!(ExecutorRole::from("tertiary"), ExecutorRole::Tertiary);
        assert_eq!(ExecutorRole::from("executor-4"), ExecutorRole::Numbered(4));
        assert_eq!(
            ExecutorRole::from("overflow"),
            ExecutorRole::Other("overflow".to_string())
        );
        // Malformed numbered roles fall back to a free-form label.
        assert_eq!(
            ExecutorRole::from("executor-x"),
            ExecutorRole::Other("executor-x".to_string())
        );
    }

    #[test]
    fn test_role_priority_order() {
        let mut roles = vec![
            ExecutorRole::Other("zzz".into()),
            ExecutorRole::Numbered(5),
            ExecutorRole::Tertiary,
            ExecutorRole::Numbered(4),
            ExecutorRole::Primary,
            ExecutorRole::Backup,
        ];
        roles.sort_by_key(|r| r.priority());
        assert_eq!(
            roles,
            vec![
                ExecutorRole::Primary,
                ExecutorRole::Backup,
                ExecutorRole::Tertiary,
                ExecutorRole::Numbered(4),
                ExecutorRole::Numbered(5),
                ExecutorRole::Other("zzz".into()),
            ]
        );
    }

    #[test]
    fn test_role_for_position() {
        assert_eq!(ExecutorRole::for_position(0), ExecutorRole::Primary);
        assert_eq!(ExecutorRole::for_position(1), ExecutorRole::Backup);
        assert_eq!(ExecutorRole::for_position(2), ExecutorRole::Tertiary);
        assert_eq!(ExecutorRole::for_position(3), ExecutorRole::Numbered(4));
    }

    #[test]
    fn test_role_serde_as_string() {
        let json = serde_json::to_string(&ExecutorRole::Numbered(7)).unwrap();
        assert_eq!(json, "\"executor-7\"");
        let role: ExecutorRole = serde_json::from_str("\"backup\"").unwrap();
        assert_eq!(role, ExecutorRole::Backup);
    }

    #[test]
    fn test_executor_deserialize_with_executor_alias() {
        let json = r#"{"name":"copilot-claude","executor":"copilot","weight":40,"role":"backup"}"#;
        let executor: Executor = serde_json::from_str(json).unwrap();
        assert_eq!(executor.kind, "copilot");
        assert_eq!(executor.variant, "default");
        assert!(executor.enabled);
        assert!(executor.models.is_empty());
        assert_eq!(executor.role, ExecutorRole::Backup);
    }

    #[test]
    fn test_distribution_from_str() {
        assert_eq!(
            "round-robin".parse::<DistributionPolicy>().unwrap(),
            DistributionPolicy::RoundRobin
        );
        assert_eq!(
            "primary-only".parse::<DistributionPolicy>().unwrap(),
            DistributionPolicy::PrimaryOnly
        );
        assert!("random".parse::<DistributionPolicy>().is_err());
    }

    #[test]
    fn test_policy_serde_kebab_case() {
        let json = serde_json::to_string(&FailoverStrategy::WeightedRandom).unwrap();
        assert_eq!(json, "\"weighted-random\"");
        let parsed: DistributionPolicy = serde_json::from_str("\"primary-only\"").unwrap();
        assert_eq!(parsed, DistributionPolicy::PrimaryOnly);
    }

    #[test]
    fn test_external_kill_policy_serde() {
        let parsed: ExternalKillPolicy = serde_json::from_str("\"budgeted\"").unwrap();
        assert_eq!(parsed, ExternalKillPolicy::Budgeted);
        assert_eq!(ExternalKillPolicy::default(), ExternalKillPolicy::AlwaysRetry);
    }

    #[test]
    fn test_failover_policy_defaults() {
        let policy = FailoverPolicy::default();
        assert_eq!(policy.strategy, FailoverStrategy::NextInLine);
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.cooldown, Duration::from_secs(300));
        assert_eq!(policy.disable_on_consecutive_failures, 3);
    }
}
