//! OS seam for spawning, signalling, and scanning processes.
//!
//! The supervisor only talks to these traits; [`PosixLauncher`] and
//! [`SystemProcessTable`] are the production adapters, tests substitute
//! scripted fakes.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::debug;

/// Signals the supervisor sends or forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}

impl Signal {
    /// POSIX signal number.
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Interrupt => 2,
            Self::Kill => 9,
            Self::Terminate => 15,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// How a child ended: an exit code, a terminating signal, or (rarely) neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>>;
}

/// A spawned child owned by the supervisor.
#[async_trait]
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// Deliver `signal`. Signalling a child that already exited is a no-op.
    fn signal(&self, signal: Signal) -> Result<()>;

    fn is_alive(&mut self) -> bool;

    async fn wait(&mut self) -> Result<ExitOutcome>;
}

/// System-wide process view, used for PID-file liveness and ghost reaping.
pub trait ProcessTable: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;

    /// Deliver `signal` to an arbitrary PID. A vanished target is not an error.
    fn signal(&self, pid: u32, signal: Signal) -> Result<()>;

    /// PIDs whose command line matches `signature`.
    fn scan(&self, signature: &ProcessSignature) -> Vec<u32>;
}

/// Command-line fingerprint of a monitor process.
///
/// Matches when the executable's file name equals `executable` and the
/// remaining arguments equal `args` exactly. A monitor started with a
/// different `--config` belongs to another instance and never matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSignature {
    pub executable: String,
    pub args: Vec<String>,
}

impl ProcessSignature {
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            executable: file_name(program).to_string(),
            args: args.to_vec(),
        })
    }

    pub fn matches(&self, cmd: &[String]) -> bool {
        match cmd.split_first() {
            Some((program, rest)) => {
                file_name(program) == self.executable && rest == self.args.as_slice()
            }
            None => false,
        }
    }
}

fn file_name(program: &str) -> &str {
    Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program)
}

/// Set to `1` in the environment of every supervised monitor.
pub const SUPERVISED_ENV: &str = "KESTREL_SUPERVISED";

/// Spawns the monitor with `tokio::process`, in its own session so a
/// terminal Ctrl-C reaches only the supervisor, which then forwards it.
/// The monitor leads its own process group; signals go to the whole group.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixLauncher;

impl ProcessLauncher for PosixLauncher {
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>> {
        let Some((program, args)) = argv.split_first() else {
            bail!("monitor command is empty");
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .env(SUPERVISED_ENV, "1");

        // SAFETY: setsid() is async-signal-safe, runs before exec in child.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn monitor: {program}"))?;
        let pid = child
            .id()
            .context("Spawned monitor exited before its PID could be read")?;
        debug!(pid, program = %program, "Spawned monitor");

        Ok(Box::new(PosixChild { child, pid }))
    }
}

struct PosixChild {
    child: tokio::process::Child,
    pid: u32,
}

#[async_trait]
impl ProcessHandle for PosixChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        // Once tokio has reaped the child its PID may be recycled.
        if self.child.id().is_none() {
            return Ok(());
        }
        signal_group(self.pid, signal)
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn wait(&mut self) -> Result<ExitOutcome> {
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for monitor pid {}", self.pid))?;
        Ok(ExitOutcome::from(status))
    }
}

/// `kill(2)` wrapper. `ESRCH` (no such process) is treated as success.
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    deliver(pid, false, signal)
}

/// Signal every process in the group led by `pgid` (`kill(-pgid, ..)`).
/// `ESRCH` (group already gone) is treated as success.
pub fn signal_group(pgid: u32, signal: Signal) -> Result<()> {
    deliver(pgid, true, signal)
}

fn deliver(pid: u32, group: bool, signal: Signal) -> Result<()> {
    // 1 would make the group form `kill(-1, ..)`: every process we may signal.
    if pid == 0 || pid > i32::MAX as u32 || (group && pid == 1) {
        bail!("refusing to signal invalid pid {pid}");
    }

    #[cfg(unix)]
    {
        let target = if group { -(pid as i32) } else { pid as i32 };
        // SAFETY: kill() is async-signal-safe; pid is validated above.
        let ret = unsafe { libc::kill(target as libc::pid_t, signal.as_raw()) };
        if ret == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(err).with_context(|| format!("Failed to send {signal} to pid {target}"))
    }

    #[cfg(not(unix))]
    {
        bail!("sending {signal} to pid {pid} is not supported on this platform")
    }
}

/// Live system view: `kill(pid, 0)` liveness and a sysinfo process scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        kestrel_lock::is_process_alive(pid)
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        send_signal(pid, signal)
    }

    fn scan(&self, signature: &ProcessSignature) -> Vec<u32> {
        use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            // Skip Linux tasks (threads); only whole processes are candidates.
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter_map(|(pid, process)| {
                let cmd: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                signature.matches(&cmd).then(|| pid.as_u32())
            })
            .collect();
        pids.sort_unstable();
        pids
    }
}
