//! Process supervision: spawn the monitor, classify its exits, restart it
//! with crash-loop protection, and forward shutdown signals.

pub mod crash_loop;
pub mod exit;
pub mod ghost;
pub mod handle;
pub mod supervisor;

pub use crash_loop::{CrashLoopTracker, CrashReport, TrackerState};
pub use exit::{ExitKind, SELF_RESTART_EXIT_CODE, classify};
pub use ghost::reap_ghosts;
pub use handle::{
    ExitOutcome, PosixLauncher, ProcessHandle, ProcessLauncher, ProcessSignature, ProcessTable,
    SUPERVISED_ENV, Signal, SystemProcessTable, send_signal, signal_group,
};
pub use supervisor::{ProcessSupervisor, SupervisedProcess, SupervisorSettings, TokioClock};
