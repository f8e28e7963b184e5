//! `start`, `stop` and `status`.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kestrel_core::OutputFormat;
use kestrel_lock::{PidFile, is_process_alive};
use kestrel_process::supervisor::{MONITOR_PID_FILE, SUPERVISOR_PID_FILE};
use kestrel_process::{
    PosixLauncher, ProcessSupervisor, Signal, SystemProcessTable, send_signal, signal_group,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::context::{AppContext, pid_path};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn handle_start(ctx: &AppContext, foreground: bool) -> Result<i32> {
    let supervisor_pid = PidFile::new(pid_path(&ctx.pid_dir(), SUPERVISOR_PID_FILE));
    if let Some(pid) = supervisor_pid.live_owner() {
        println!("kestrel supervisor already running (PID {pid})");
        return Ok(0);
    }

    if !foreground {
        let pid = spawn_background(ctx.config_path.as_deref())?;
        println!("kestrel supervisor started in background (PID {pid})");
        return Ok(0);
    }

    let settings = ctx.supervisor_settings()?;
    info!(
        monitor = ?settings.monitor_argv,
        pid_dir = %ctx.pid_dir().display(),
        "Starting supervisor"
    );
    let mut supervisor = ProcessSupervisor::new(
        settings,
        Arc::new(PosixLauncher),
        Arc::new(SystemProcessTable),
        ctx.notifier(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(None);
    let listener = spawn_signal_listener(shutdown_tx)?;
    let code = supervisor.run(shutdown_rx).await;
    listener.abort();
    code
}

/// Re-exec `kestrel start --foreground` detached from the terminal.
fn spawn_background(config_path: Option<&Path>) -> Result<u32> {
    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    let mut cmd = std::process::Command::new(exe);
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    cmd.arg("start").arg("--foreground");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid() is async-signal-safe, runs before exec in child.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let child = cmd.spawn().context("failed to spawn background supervisor")?;
    Ok(child.id())
}

/// Publish the first SIGTERM/SIGINT on the shutdown channel.
fn spawn_signal_listener(
    tx: watch::Sender<Option<Signal>>,
) -> Result<tokio::task::JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        let mut int =
            signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
        Ok(tokio::spawn(async move {
            let received = tokio::select! {
                _ = term.recv() => Signal::Terminate,
                _ = int.recv() => Signal::Interrupt,
            };
            info!(signal = %received, "Shutdown signal received");
            let _ = tx.send(Some(received));
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(Some(Signal::Interrupt));
            }
        }))
    }
}

pub async fn handle_stop(ctx: &AppContext, timeout_secs: u64) -> Result<i32> {
    let pid_dir = ctx.pid_dir();
    let supervisor_pid = PidFile::new(pid_path(&pid_dir, SUPERVISOR_PID_FILE));
    let monitor_pid = PidFile::new(pid_path(&pid_dir, MONITOR_PID_FILE));

    let target = match supervisor_pid.live_owner() {
        Some(pid) => StopTarget::Supervisor(pid),
        None => match monitor_pid.live_owner() {
            Some(pid) => StopTarget::MonitorGroup(pid),
            None => {
                println!("kestrel is not running");
                return Ok(0);
            }
        },
    };
    let pid = target.pid();

    target.signal(Signal::Terminate)?;
    info!(pid, "Sent SIGTERM");

    if wait_for_exit(pid, Duration::from_secs(timeout_secs)).await {
        println!("kestrel stopped (PID {pid})");
        return Ok(0);
    }

    eprintln!("PID {pid} did not exit within {timeout_secs}s, sending SIGKILL");
    target.signal(Signal::Kill)?;
    // A SIGKILLed supervisor cannot take its monitor group down with it.
    if let Some(monitor) = monitor_pid.live_owner()
        && monitor != pid
    {
        signal_group(monitor, Signal::Kill)?;
    }
    if wait_for_exit(pid, Duration::from_secs(1)).await {
        // live_owner() drops PID files naming dead processes.
        supervisor_pid.live_owner();
        monitor_pid.live_owner();
    }
    println!("kestrel killed (PID {pid})");
    Ok(0)
}

/// What `stop` signals: the supervisor itself (it forwards to the monitor),
/// or, without a supervisor, the monitor's whole process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopTarget {
    Supervisor(u32),
    MonitorGroup(u32),
}

impl StopTarget {
    fn pid(self) -> u32 {
        match self {
            Self::Supervisor(pid) | Self::MonitorGroup(pid) => pid,
        }
    }

    fn signal(self, signal: Signal) -> Result<()> {
        match self {
            Self::Supervisor(pid) => send_signal(pid, signal),
            Self::MonitorGroup(pgid) => signal_group(pgid, signal),
        }
    }
}

async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while is_process_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
    true
}

#[derive(Debug, Serialize)]
struct StatusReport {
    running: bool,
    supervisor_pid: Option<u32>,
    monitor_pid: Option<u32>,
    pid_dir: String,
}

fn live_pid(file: &PidFile) -> Option<u32> {
    file.read().filter(|pid| is_process_alive(*pid))
}

pub fn handle_status(ctx: &AppContext, format: OutputFormat) -> Result<i32> {
    let pid_dir = ctx.pid_dir();
    let supervisor = live_pid(&PidFile::new(pid_path(&pid_dir, SUPERVISOR_PID_FILE)));
    let monitor = live_pid(&PidFile::new(pid_path(&pid_dir, MONITOR_PID_FILE)));
    let report = StatusReport {
        running: supervisor.is_some() || monitor.is_some(),
        supervisor_pid: supervisor,
        monitor_pid: monitor,
        pid_dir: pid_dir.display().to_string(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("supervisor: {}", describe(report.supervisor_pid));
            println!("monitor:    {}", describe(report.monitor_pid));
        }
    }
    Ok(if report.running { 0 } else { 1 })
}

fn describe(pid: Option<u32>) -> String {
    match pid {
        Some(pid) => format!("running (PID {pid})"),
        None => "not running".to_string(),
    }
}
