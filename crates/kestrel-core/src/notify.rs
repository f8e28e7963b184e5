//! Crash-notification contract between the supervisor and alert sinks.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    /// The monitor crashed and a restart is scheduled.
    Crash,
    /// Automatic restarts are paused; operator attention required.
    Halted,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crash => "crash",
            Self::Halted => "halted",
        }
    }
}

/// Payload handed to a [`NotificationSink`] after an abnormal monitor exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashNotice {
    pub kind: NoticeKind,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Delay before the next restart; `None` when restarts are halted.
    pub next_restart_delay_ms: Option<u64>,
    pub attempt: u32,
    /// Restart budget; 0 means unlimited.
    pub max_restarts: u32,
}

/// Best-effort, fire-and-forget alert delivery.
///
/// Implementations must swallow their own failures: nothing here may
/// propagate into the supervisor's restart decisions.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: &CrashNotice);
}

/// Sink that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notice: &CrashNotice) {}
}
