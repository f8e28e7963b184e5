//! Built-in monitor: the default child process under supervision.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use kestrel_process::{SELF_RESTART_EXIT_CODE, SUPERVISED_ENV};
use tracing::{debug, info, warn};

use crate::context::AppContext;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tracks the config file's modification time. A file appearing,
/// disappearing or being rewritten all count as a change.
#[derive(Debug)]
pub(crate) struct ConfigWatcher {
    path: Option<PathBuf>,
    baseline: Option<SystemTime>,
}

impl ConfigWatcher {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        let baseline = path.as_deref().and_then(modified_at);
        Self { path, baseline }
    }

    pub(crate) fn changed(&self) -> bool {
        match &self.path {
            Some(path) => modified_at(path) != self.baseline,
            None => false,
        }
    }
}

fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether the marker the supervisor sets on its children is present.
pub(crate) fn is_supervised(marker: Option<&str>) -> bool {
    marker == Some("1")
}

pub async fn handle_monitor(ctx: &AppContext) -> Result<i32> {
    let marker = std::env::var(SUPERVISED_ENV).ok();
    if !is_supervised(marker.as_deref()) {
        warn!(
            "Monitor is running without a supervisor; config reloads will exit \
             instead of restarting. Use `kestrel start` to supervise it"
        );
    }
    info!(
        pid = std::process::id(),
        distribution = %ctx.scheduler.distribution(),
        "Monitor started"
    );
    for line in ctx.scheduler.to_display_string().lines() {
        info!("{line}");
    }

    let watcher = ConfigWatcher::new(ctx.effective_config_path());
    let mut ticker = tokio::time::interval(CONFIG_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = shutdown_signal()?;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Monitor shutting down");
                return Ok(0);
            }
            _ = ticker.tick() => {
                if watcher.changed() {
                    info!("Config changed on disk; requesting restart");
                    return Ok(SELF_RESTART_EXIT_CODE);
                }
                debug!("Config unchanged");
            }
        }
    }
}

/// Resolves on the first SIGTERM or SIGINT.
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        let mut int =
            signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
        Ok(async move {
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            let _ = tokio::signal::ctrl_c().await;
        })
    }
}
