use super::*;
use std::collections::HashMap;
use tempfile::tempdir;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let config = KestrelConfig::load_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, KestrelConfig::default());

    let executors = config.executors();
    assert_eq!(executors.len(), 1);
    assert_eq!(executors[0].name, "codex-default");
    assert_eq!(executors[0].kind, "codex");
    assert_eq!(executors[0].weight, 100);
    assert_eq!(executors[0].role, ExecutorRole::Primary);
}

#[test]
fn test_parse_full_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[distribution]
mode = "round-robin"

[failover]
strategy = "weighted-random"
max_retries = 2
cooldown_minutes = 10
disable_on_consecutive_failures = 4

[[executors]]
name = "codex-default"
executor = "codex"
weight = 60

[[executors]]
name = "copilot-claude"
executor = "copilot"
variant = "claude"
weight = 40
models = ["claude-sonnet"]

[[executors]]
name = "claude-direct"
executor = "claude"
weight = 0

[[executors]]
name = "overflow"
executor = "codex"
role = "executor-7"
enabled = false

[supervisor]
restart_delay_ms = 1000
max_restarts = 10
external_kill_policy = "budgeted"
monitor_command = ["/usr/bin/node", "monitor.mjs"]
pid_dir = "/var/run/kestrel"

[notify]
command = "notify-send kestrel {kind}"
timeout_secs = 10

[logging]
dir = "/var/log/kestrel"
"#,
    )
    .unwrap();

    let config = KestrelConfig::load_from(&path).unwrap();
    assert_eq!(config.distribution(), DistributionPolicy::RoundRobin);

    let policy = config.failover_policy();
    assert_eq!(policy.strategy, FailoverStrategy::WeightedRandom);
    assert_eq!(policy.max_retries, 2);
    assert_eq!(policy.cooldown, Duration::from_secs(600));
    assert_eq!(policy.disable_on_consecutive_failures, 4);

    let executors = config.executors();
    let roles: Vec<ExecutorRole> = executors.iter().map(|e| e.role.clone()).collect();
    assert_eq!(
        roles,
        vec![
            ExecutorRole::Primary,
            ExecutorRole::Backup,
            ExecutorRole::Tertiary,
            ExecutorRole::Numbered(7),
        ]
    );
    assert_eq!(executors[1].variant, "claude");
    assert_eq!(executors[1].models, vec!["claude-sonnet".to_string()]);
    assert_eq!(executors[2].weight, 0);
    assert!(!executors[3].enabled);
    assert_eq!(executors[3].weight, 100);

    let sup = &config.supervisor;
    assert_eq!(sup.restart_delay(), Duration::from_secs(1));
    assert_eq!(sup.max_restarts, 10);
    assert_eq!(sup.external_kill_policy, ExternalKillPolicy::Budgeted);
    // Unset fields keep their defaults.
    assert_eq!(sup.instant_crash_window(), Duration::from_secs(15));
    assert_eq!(sup.self_restart_delay(), Duration::from_secs(2));
    assert_eq!(sup.healthy_run(), Duration::from_secs(300));
    assert_eq!(sup.pid_dir(), PathBuf::from("/var/run/kestrel"));
    assert_eq!(sup.monitor_command.len(), 2);

    assert!(config.notify.enabled);
    assert_eq!(config.notify.timeout_secs, 10);
    assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/kestrel")));
}

#[test]
fn test_fourth_executor_without_role_is_numbered() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut toml = String::new();
    for name in ["a", "b", "c", "d"] {
        toml.push_str(&format!("[[executors]]\nname = \"{name}\"\nexecutor = \"codex\"\n\n"));
    }
    std::fs::write(&path, toml).unwrap();

    let executors = KestrelConfig::load_from(&path).unwrap().executors();
    assert_eq!(executors[3].role, ExecutorRole::Numbered(4));
}

#[test]
fn test_parse_error_names_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[distribution]\nmode = \"random\"\n").unwrap();
    let err = KestrelConfig::load_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
}

#[test]
fn test_load_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[[executors]]\nname = \"a\"\nexecutor = \"codex\"\n\n[[executors]]\nname = \"a\"\nexecutor = \"copilot\"\n",
    )
    .unwrap();
    let err = KestrelConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Duplicate executor name 'a'"));
}

#[test]
fn test_env_overrides_apply() {
    let mut config = KestrelConfig::default();
    config
        .apply_env_overrides(lookup(&[
            ("KESTREL_RESTART_DELAY_MS", "250"),
            ("KESTREL_MAX_RESTARTS", " 7 "),
            ("KESTREL_DISTRIBUTION", "primary-only"),
        ]))
        .unwrap();
    assert_eq!(config.supervisor.restart_delay_ms, 250);
    assert_eq!(config.supervisor.max_restarts, 7);
    assert_eq!(config.distribution(), DistributionPolicy::PrimaryOnly);
}

#[test]
fn test_env_overrides_ignore_empty_and_reject_garbage() {
    let mut config = KestrelConfig::default();
    config
        .apply_env_overrides(lookup(&[("KESTREL_MAX_RESTARTS", "")]))
        .unwrap();
    assert_eq!(config.supervisor.max_restarts, 0);

    let err = config
        .apply_env_overrides(lookup(&[("KESTREL_RESTART_DELAY_MS", "soon")]))
        .unwrap_err();
    assert!(err.to_string().contains("KESTREL_RESTART_DELAY_MS"));

    let err = config
        .apply_env_overrides(lookup(&[("KESTREL_DISTRIBUTION", "random")]))
        .unwrap_err();
    assert!(err.to_string().contains("Valid values"));
}

#[test]
fn test_round_trip_serialization_keeps_sections() {
    let config = KestrelConfig::default();
    let text = toml::to_string(&config).unwrap();
    assert!(text.contains("[supervisor]"));
    assert!(text.contains("codex-default"));
    let parsed: KestrelConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
