//! Explicitly constructed application state, passed to command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use kestrel_config::KestrelConfig;
use kestrel_core::{NotificationSink, NullSink};
use kestrel_hooks::HookNotifier;
use kestrel_process::SupervisorSettings;
use kestrel_scheduler::ExecutorScheduler;

pub struct AppContext {
    pub config: KestrelConfig,
    /// Config path given on the command line or via `KESTREL_CONFIG`.
    pub config_path: Option<PathBuf>,
    pub scheduler: ExecutorScheduler,
}

impl AppContext {
    pub fn new(config: KestrelConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let scheduler = ExecutorScheduler::new(
            config.executors(),
            config.failover_policy(),
            config.distribution(),
        )?;
        Ok(Self {
            config,
            config_path,
            scheduler,
        })
    }

    pub fn pid_dir(&self) -> PathBuf {
        self.config.supervisor.pid_dir()
    }

    /// The config file actually in effect, if any.
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config_path
            .clone()
            .or_else(kestrel_config::paths::default_config_path)
    }

    /// Monitor argv: the configured command, else `<current exe> monitor`
    /// (with `--config` forwarded when one was given explicitly).
    pub fn monitor_argv(&self) -> Result<Vec<String>> {
        let configured = &self.config.supervisor.monitor_command;
        if !configured.is_empty() {
            return Ok(configured.clone());
        }
        let exe = std::env::current_exe().context("failed to resolve current executable")?;
        let mut argv = vec![exe.to_string_lossy().into_owned(), "monitor".to_string()];
        if let Some(path) = &self.config_path {
            argv.push("--config".to_string());
            argv.push(path.to_string_lossy().into_owned());
        }
        Ok(argv)
    }

    pub fn supervisor_settings(&self) -> Result<SupervisorSettings> {
        let sup = &self.config.supervisor;
        let mut settings = SupervisorSettings::new(self.monitor_argv()?, &self.pid_dir());
        settings.restart_delay = sup.restart_delay();
        settings.max_restarts = sup.max_restarts;
        settings.instant_crash_window = sup.instant_crash_window();
        settings.max_instant_crashes = sup.max_instant_crashes;
        settings.self_restart_delay = sup.self_restart_delay();
        settings.external_kill_delay = sup.external_kill_delay();
        settings.external_kill_policy = sup.external_kill_policy;
        settings.healthy_run = sup.healthy_run();
        settings.ghost_kill_timeout = sup.ghost_kill_timeout();
        Ok(settings)
    }

    /// Hook-backed sink when a notify command is configured, else a no-op.
    pub fn notifier(&self) -> Arc<dyn NotificationSink> {
        let notify = &self.config.notify;
        if notify.enabled && notify.command.is_some() {
            Arc::new(HookNotifier::new(notify.clone()))
        } else {
            Arc::new(NullSink)
        }
    }
}

/// `pid_dir/name`, used by the status and stop commands.
pub fn pid_path(pid_dir: &Path, name: &str) -> PathBuf {
    pid_dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(config: KestrelConfig, path: Option<&str>) -> AppContext {
        AppContext::new(config, path.map(PathBuf::from)).expect("valid context")
    }

    #[test]
    fn test_default_monitor_argv_forwards_config() {
        let ctx = context(KestrelConfig::default(), Some("/etc/kestrel.toml"));
        let argv = ctx.monitor_argv().unwrap();
        assert_eq!(argv.len(), 4);
        assert_eq!(argv[1], "monitor");
        assert_eq!(argv[2..], ["--config", "/etc/kestrel.toml"]);
    }

    #[test]
    fn test_configured_monitor_command_wins() {
        let mut config = KestrelConfig::default();
        config.supervisor.monitor_command = vec!["node".into(), "monitor.mjs".into()];
        let ctx = context(config, None);
        assert_eq!(ctx.monitor_argv().unwrap(), vec!["node", "monitor.mjs"]);
    }

    #[test]
    fn test_supervisor_settings_follow_config() {
        let mut config = KestrelConfig::default();
        config.supervisor.restart_delay_ms = 750;
        config.supervisor.max_restarts = 4;
        config.supervisor.pid_dir = Some(PathBuf::from("/run/kestrel-test"));
        let ctx = context(config, None);
        let settings = ctx.supervisor_settings().unwrap();
        assert_eq!(settings.restart_delay, Duration::from_millis(750));
        assert_eq!(settings.max_restarts, 4);
        assert_eq!(
            settings.monitor_pid_file,
            PathBuf::from("/run/kestrel-test/monitor.pid")
        );
        assert_eq!(
            settings.supervisor_pid_file,
            Some(PathBuf::from("/run/kestrel-test/supervisor.pid"))
        );
    }

    #[test]
    fn test_context_owns_scheduler() {
        let mut ctx = context(KestrelConfig::default(), None);
        assert_eq!(ctx.scheduler.next().name, "codex-default");
    }
}
