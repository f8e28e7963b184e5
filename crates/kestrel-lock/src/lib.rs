//! PID-file based single-instance signal.
//! Independent crate with no internal kestrel dependencies.
//!
//! This is optimistic exclusion, not a lock: a PID file plus a liveness probe
//! tells a starting supervisor whether another monitor already owns the
//! machine. Two simultaneous starts can both pass the probe; the caller
//! resolves that race by exiting 0.
//!
//! On-disk format is the decimal PID followed by a newline. Older installs
//! wrote a JSON object with a `pid` field; that form is still accepted on
//! read but never written.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Legacy JSON PID record. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct LegacyPidRecord {
    pid: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded PID. A missing, empty, or unparseable file reads as
    /// `None`.
    pub fn read(&self) -> Option<u32> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %self.path.display(), error = %err, "Unreadable PID file");
                }
                return None;
            }
        };
        let pid = parse_pid(&content);
        if pid.is_none() && !content.trim().is_empty() {
            warn!(path = %self.path.display(), "Ignoring malformed PID file");
        }
        pid
    }

    /// Record `pid`, creating parent directories on demand.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create PID directory: {}", parent.display()))?;
        }
        fs::write(&self.path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write PID file: {}", self.path.display()))
    }

    /// Remove the file. Already-missing files are not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove PID file: {}", self.path.display())),
        }
    }

    /// PID of a live process (other than the caller) recorded in this file.
    ///
    /// A stale file naming a dead process is removed on the way out.
    pub fn live_owner(&self) -> Option<u32> {
        self.live_owner_with(is_process_alive)
    }

    /// [`live_owner`](Self::live_owner) with an injected liveness probe.
    pub fn live_owner_with(&self, is_alive: impl Fn(u32) -> bool) -> Option<u32> {
        let pid = self.read()?;
        if pid == std::process::id() {
            return None;
        }
        if is_alive(pid) {
            return Some(pid);
        }
        debug!(pid, path = %self.path.display(), "Removing stale PID file");
        if let Err(err) = self.remove() {
            warn!(error = %err, "Failed to remove stale PID file");
        }
        None
    }
}

/// Parse PID file content: decimal text, or the legacy `{"pid": N}` form.
///
/// PID 0 and values beyond `i32::MAX` are rejected: `kill(0, ..)` would
/// target the caller's process group.
pub fn parse_pid(content: &str) -> Option<u32> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    let raw = match trimmed.parse::<u64>() {
        Ok(pid) => pid,
        Err(_) => serde_json::from_str::<LegacyPidRecord>(trimmed).ok()?.pid,
    };
    if raw == 0 || raw > i32::MAX as u64 {
        return None;
    }
    u32::try_from(raw).ok()
}

/// Liveness probe via `kill(pid, 0)`.
///
/// `EPERM` counts as alive: the PID exists and belongs to someone else.
/// Only unix targets can probe; elsewhere every PID reads as dead.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    #[cfg(unix)]
    {
        // SAFETY: `kill(pid, 0)` performs existence/permission probe only.
        let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if ret == 0 {
            return true;
        }
        let errno = std::io::Error::last_os_error().raw_os_error();
        errno == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_decimal() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("monitor.pid"));
        pid_file.write(4321).expect("write should succeed");

        let raw = fs::read_to_string(pid_file.path()).unwrap();
        assert_eq!(raw, "4321\n");
        assert_eq!(pid_file.read(), Some(4321));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("deep").join("nested").join("monitor.pid"));
        pid_file.write(99).expect("should create intermediate dirs");
        assert_eq!(pid_file.read(), Some(99));
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("absent.pid"));
        assert_eq!(pid_file.read(), None);
    }

    #[test]
    fn test_read_legacy_json() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monitor.pid");
        fs::write(&path, r#"{"pid": 777, "startedAt": "2025-01-01T00:00:00Z", "argv": []}"#)
            .unwrap();
        assert_eq!(PidFile::new(&path).read(), Some(777));
    }

    #[test]
    fn test_parse_pid_rejects_garbage_and_zero() {
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("   \n"), None);
        assert_eq!(parse_pid("not-a-pid"), None);
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("-5"), None);
        assert_eq!(parse_pid("4294967295"), None);
        assert_eq!(parse_pid(r#"{"pid": 0}"#), None);
        assert_eq!(parse_pid(r#"{"other": 1}"#), None);
        assert_eq!(parse_pid(" 12 \n"), Some(12));
    }

    #[test]
    fn test_remove_tolerates_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("monitor.pid"));
        assert!(pid_file.remove().is_ok());
        pid_file.write(5).unwrap();
        assert!(pid_file.remove().is_ok());
        assert!(!pid_file.path().exists());
        assert!(pid_file.remove().is_ok());
    }

    #[test]
    fn test_live_owner_reports_live_pid() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("monitor.pid"));
        pid_file.write(31337).unwrap();
        assert_eq!(pid_file.live_owner_with(|pid| pid == 31337), Some(31337));
        assert!(pid_file.path().exists());
    }

    #[test]
    fn test_live_owner_removes_stale_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("monitor.pid"));
        pid_file.write(31337).unwrap();
        assert_eq!(pid_file.live_owner_with(|_| false), None);
        assert!(!pid_file.path().exists(), "stale PID file should be removed");
    }

    #[test]
    fn test_live_owner_ignores_own_pid() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_file = PidFile::new(dir.path().join("monitor.pid"));
        pid_file.write(std::process::id()).unwrap();
        assert_eq!(pid_file.live_owner_with(|_| true), None);
    }

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_rejects_invalid_pids() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_process_alive_reaped_child() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("failed to spawn true");
        let pid = child.id();
        child.wait().expect("failed to wait for child");
        assert!(!is_process_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_process_alive_init_counts_as_alive() {
        // PID 1 always exists; unprivileged callers get EPERM, which still
        // means "alive".
        assert!(is_process_alive(1));
    }
}
