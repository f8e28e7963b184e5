//! The supervisor run loop.
//!
//! Owns exactly one monitor child at a time. Each exit is classified
//! ([`classify`]) and turned into a decision: stop, respawn after a delay, or
//! halt and propagate the child's exit code. Shutdown signals arrive on a
//! `watch` channel and are forwarded to the child.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use kestrel_core::{Clock, CrashNotice, ExternalKillPolicy, NoticeKind, NotificationSink};
use kestrel_lock::PidFile;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::crash_loop::CrashLoopTracker;
use crate::exit::{ExitKind, classify};
use crate::ghost::reap_ghosts;
use crate::handle::{ExitOutcome, ProcessLauncher, ProcessSignature, ProcessTable, Signal};

pub const MONITOR_PID_FILE: &str = "monitor.pid";
pub const SUPERVISOR_PID_FILE: &str = "supervisor.pid";

/// Runtime settings for one supervisor instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub monitor_argv: Vec<String>,
    pub monitor_pid_file: PathBuf,
    /// Where the supervisor records its own PID for `stop`/`status`.
    pub supervisor_pid_file: Option<PathBuf>,
    pub restart_delay: Duration,
    /// 0 = unlimited.
    pub max_restarts: u32,
    pub instant_crash_window: Duration,
    pub max_instant_crashes: u32,
    pub self_restart_delay: Duration,
    pub external_kill_delay: Duration,
    pub external_kill_policy: ExternalKillPolicy,
    /// A run at least this long clears the restart-attempt counter.
    pub healthy_run: Duration,
    pub ghost_kill_timeout: Duration,
}

impl SupervisorSettings {
    /// Defaults with both PID files placed in `pid_dir`.
    pub fn new(monitor_argv: Vec<String>, pid_dir: &Path) -> Self {
        Self {
            monitor_argv,
            monitor_pid_file: pid_dir.join(MONITOR_PID_FILE),
            supervisor_pid_file: Some(pid_dir.join(SUPERVISOR_PID_FILE)),
            restart_delay: Duration::from_millis(5_000),
            max_restarts: 0,
            instant_crash_window: Duration::from_millis(15_000),
            max_instant_crashes: 3,
            self_restart_delay: Duration::from_millis(2_000),
            external_kill_delay: Duration::from_millis(5_000),
            external_kill_policy: ExternalKillPolicy::AlwaysRetry,
            healthy_run: Duration::from_secs(300),
            ghost_kill_timeout: Duration::from_millis(5_000),
        }
    }
}

/// The currently running child, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisedProcess {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub argv: Vec<String>,
    pub pid_file_path: PathBuf,
}

/// [`Clock`] backed by `tokio::time::Instant`, so paused test runtimes
/// drive crash windows and run durations too.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

enum Decision {
    Exit(i32),
    Restart(Duration),
}

pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    launcher: Arc<dyn ProcessLauncher>,
    table: Arc<dyn ProcessTable>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    tracker: CrashLoopTracker,
    attempt: u32,
    current: Option<SupervisedProcess>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("settings", &self.settings)
            .field("tracker", &self.tracker)
            .field("attempt", &self.attempt)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        launcher: Arc<dyn ProcessLauncher>,
        table: Arc<dyn ProcessTable>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let tracker =
            CrashLoopTracker::new(settings.instant_crash_window, settings.max_instant_crashes)
                .with_clock(Arc::clone(&clock));
        Self {
            settings,
            launcher,
            table,
            sink,
            clock,
            tracker,
            attempt: 0,
            current: None,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Restart attempts since the last clean start or healthy run.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn tracker(&self) -> &CrashLoopTracker {
        &self.tracker
    }

    pub fn current(&self) -> Option<&SupervisedProcess> {
        self.current.as_ref()
    }

    /// Supervise the monitor until it stops cleanly, a shutdown signal
    /// arrives, or restarts are halted. Returns the process exit code.
    ///
    /// If the monitor PID file names a live process, nothing is spawned and
    /// the result is 0: another supervisor already owns the monitor.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<Option<Signal>>) -> Result<i32> {
        let monitor_pid = PidFile::new(&self.settings.monitor_pid_file);
        let table = Arc::clone(&self.table);
        if let Some(pid) = monitor_pid.live_owner_with(|pid| table.is_alive(pid)) {
            info!(
                pid,
                path = %monitor_pid.path().display(),
                "Monitor already running, not spawning another"
            );
            return Ok(0);
        }

        let own_pid = std::process::id();
        let supervisor_pid = self.settings.supervisor_pid_file.as_ref().map(PidFile::new);
        if let Some(file) = &supervisor_pid
            && let Err(err) = file.write(own_pid)
        {
            warn!(error = %err, "Failed to record supervisor PID");
        }

        if let Some(signature) = ProcessSignature::from_argv(&self.settings.monitor_argv) {
            // A monitor that recorded itself since the check above is tracked.
            let mut exclude = vec![own_pid];
            exclude.extend(monitor_pid.read().filter(|pid| table.is_alive(*pid)));
            reap_ghosts(
                self.table.as_ref(),
                &signature,
                &exclude,
                self.settings.ghost_kill_timeout,
            )
            .await;
        }

        let result = self.supervise(&monitor_pid, &mut shutdown).await;

        if let Err(err) = monitor_pid.remove() {
            warn!(error = %err, "Failed to remove monitor PID file");
        }
        if let Some(file) = &supervisor_pid
            && file.read() == Some(own_pid)
            && let Err(err) = file.remove()
        {
            warn!(error = %err, "Failed to remove supervisor PID file");
        }
        result
    }

    async fn supervise(
        &mut self,
        pid_file: &PidFile,
        shutdown: &mut watch::Receiver<Option<Signal>>,
    ) -> Result<i32> {
        loop {
            if let Some(signal) = *shutdown.borrow() {
                info!(%signal, "Shutdown requested, not spawning monitor");
                return Ok(0);
            }

            let mut child = self.launcher.spawn(&self.settings.monitor_argv)?;
            let pid = child.pid();
            if let Err(err) = pid_file.write(pid) {
                warn!(pid, error = %err, "Failed to write monitor PID file");
            }
            self.tracker.mark_start();
            let started = self.clock.now();
            self.current = Some(SupervisedProcess {
                pid,
                started_at: Utc::now(),
                argv: self.settings.monitor_argv.clone(),
                pid_file_path: pid_file.path().to_path_buf(),
            });
            info!(pid, attempt = self.attempt, "Monitor started");

            let outcome = tokio::select! {
                outcome = child.wait() => outcome?,
                signal = wait_for_shutdown(shutdown) => {
                    info!(pid, %signal, "Forwarding shutdown signal to monitor");
                    if let Err(err) = child.signal(signal) {
                        warn!(pid, error = %err, "Failed to forward signal to monitor");
                    }
                    let outcome = child.wait().await?;
                    info!(pid, %outcome, "Monitor stopped");
                    self.tracker.reset();
                    self.current = None;
                    return Ok(0);
                }
            };

            self.current = None;
            if let Err(err) = pid_file.remove() {
                warn!(error = %err, "Failed to remove monitor PID file");
            }
            let run_duration = self.clock.now().saturating_duration_since(started);

            match self.decide(outcome, run_duration).await {
                Decision::Exit(code) => return Ok(code),
                Decision::Restart(delay) => {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        signal = wait_for_shutdown(shutdown) => {
                            info!(%signal, "Shutdown requested during restart delay, not respawning");
                            return Ok(0);
                        }
                    }
                }
            }
        }
    }

    async fn decide(&mut self, outcome: ExitOutcome, run_duration: Duration) -> Decision {
        let kind = classify(outcome);

        if run_duration >= self.settings.healthy_run && self.attempt > 0 {
            debug!(
                run_secs = run_duration.as_secs(),
                "Monitor ran long enough to count as healthy, clearing restart attempts"
            );
            self.attempt = 0;
        }

        match kind {
            ExitKind::Clean | ExitKind::Stopped { .. } => {
                info!(%outcome, "Monitor exited cleanly");
                self.tracker.reset();
                Decision::Exit(0)
            }
            ExitKind::SelfRestart => {
                info!(
                    delay_ms = self.settings.self_restart_delay.as_millis() as u64,
                    "Monitor requested a restart"
                );
                Decision::Restart(self.settings.self_restart_delay)
            }
            ExitKind::ExternalKill { .. } | ExitKind::Crash { .. } => {
                let external = matches!(kind, ExitKind::ExternalKill { .. });
                let report = self.tracker.record_exit();
                self.attempt = self.attempt.saturating_add(1);
                let max = self.settings.max_restarts;
                let budget_exhausted = max > 0 && self.attempt > max;
                let exempt =
                    external && self.settings.external_kill_policy == ExternalKillPolicy::AlwaysRetry;

                if (report.exceeded || budget_exhausted) && !exempt {
                    error!(
                        %outcome,
                        attempt = self.attempt,
                        max_restarts = max,
                        instant_crashes = report.instant_crash_count,
                        crash_loop = report.exceeded,
                        "Monitor keeps crashing, pausing automatic restarts"
                    );
                    self.notify_and_wait(NoticeKind::Halted, outcome, None).await;
                    return Decision::Exit(kind.propagated_code());
                }

                let delay = if external {
                    self.settings.external_kill_delay
                } else {
                    self.settings.restart_delay
                };
                if external {
                    warn!(
                        %outcome,
                        attempt = self.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Monitor was killed externally, restarting"
                    );
                } else {
                    warn!(
                        %outcome,
                        attempt = self.attempt,
                        run_ms = report.run_duration.as_millis() as u64,
                        instant_crashes = report.instant_crash_count,
                        delay_ms = delay.as_millis() as u64,
                        "Monitor crashed, restarting"
                    );
                }
                // Fire and forget: the restart never waits on the sink.
                drop(self.notify(NoticeKind::Crash, outcome, Some(delay)));
                Decision::Restart(delay)
            }
        }
    }

    fn notify(
        &self,
        kind: NoticeKind,
        outcome: ExitOutcome,
        next_restart_delay: Option<Duration>,
    ) -> tokio::task::JoinHandle<()> {
        let notice = CrashNotice {
            kind,
            exit_code: outcome.code,
            signal: outcome.signal,
            next_restart_delay_ms: next_restart_delay
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            attempt: self.attempt,
            max_restarts: self.settings.max_restarts,
        };
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.notify(&notice))
    }

    /// Used on halt only: the process is about to exit and would otherwise
    /// drop the notification on the floor.
    async fn notify_and_wait(
        &self,
        kind: NoticeKind,
        outcome: ExitOutcome,
        next_restart_delay: Option<Duration>,
    ) {
        if let Err(err) = self.notify(kind, outcome, next_restart_delay).await {
            warn!(error = %err, "Notification task failed");
        }
    }
}

/// Resolve once a shutdown signal has been published. A dropped sender
/// means no signal can ever arrive.
async fn wait_for_shutdown(rx: &mut watch::Receiver<Option<Signal>>) -> Signal {
    loop {
        if let Some(signal) = *rx.borrow_and_update() {
            return signal;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
