//! Classification of monitor exits into restart decisions.

use crate::handle::{ExitOutcome, Signal};

/// Exit code a monitor uses to ask for a fresh process (e.g. after its
/// configuration changed). Never counted as a crash.
pub const SELF_RESTART_EXIT_CODE: i32 = 75;

/// `-1` as reported on POSIX, `4294967295` (u32::MAX) as reported on
/// platforms with unsigned exit codes. Both fold to -1 as `i32`.
const EXTERNAL_KILL_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code 0.
    Clean,
    /// Terminated by SIGTERM or SIGINT: someone asked it to stop.
    Stopped { signal: i32 },
    SelfRestart,
    /// SIGKILL, OOM killer, or the -1 / 4294967295 sentinel.
    ExternalKill { code: Option<i32>, signal: Option<i32> },
    Crash { code: i32 },
}

impl ExitKind {
    /// Code the supervisor propagates when it halts on this exit.
    ///
    /// Signal deaths map to the shell convention `128 + signal`.
    pub fn propagated_code(&self) -> i32 {
        match *self {
            Self::Clean | Self::SelfRestart => 0,
            Self::Crash { code } => code,
            Self::Stopped { signal } => 128 + signal,
            Self::ExternalKill {
                signal: Some(signal),
                ..
            } => 128 + signal,
            Self::ExternalKill { code, .. } => code.unwrap_or(1),
        }
    }
}

pub fn classify(outcome: ExitOutcome) -> ExitKind {
    match (outcome.code, outcome.signal) {
        (Some(0), _) => ExitKind::Clean,
        (Some(SELF_RESTART_EXIT_CODE), _) => ExitKind::SelfRestart,
        (Some(EXTERNAL_KILL_EXIT_CODE), signal) => ExitKind::ExternalKill {
            code: Some(EXTERNAL_KILL_EXIT_CODE),
            signal,
        },
        (Some(code), _) => ExitKind::Crash { code },
        (None, Some(signal))
            if signal == Signal::Terminate.as_raw() || signal == Signal::Interrupt.as_raw() =>
        {
            ExitKind::Stopped { signal }
        }
        (None, signal) => ExitKind::ExternalKill { code: None, signal },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(c: i32) -> ExitOutcome {
        ExitOutcome {
            code: Some(c),
            signal: None,
        }
    }

    fn signal(s: i32) -> ExitOutcome {
        ExitOutcome {
            code: None,
            signal: Some(s),
        }
    }

    #[test]
    fn test_classify_codes() {
        assert_eq!(classify(code(0)), ExitKind::Clean);
        assert_eq!(classify(code(75)), ExitKind::SelfRestart);
        assert_eq!(classify(code(1)), ExitKind::Crash { code: 1 });
        assert_eq!(classify(code(137)), ExitKind::Crash { code: 137 });
    }

    #[test]
    fn test_classify_unsigned_sentinel_as_external_kill() {
        let folded = u32::MAX as i32;
        assert!(matches!(
            classify(code(folded)),
            ExitKind::ExternalKill { code: Some(-1), .. }
        ));
        assert!(matches!(
            classify(code(-1)),
            ExitKind::ExternalKill { .. }
        ));
    }

    #[test]
    fn test_classify_signals() {
        assert_eq!(classify(signal(15)), ExitKind::Stopped { signal: 15 });
        assert_eq!(classify(signal(2)), ExitKind::Stopped { signal: 2 });
        assert_eq!(
            classify(signal(9)),
            ExitKind::ExternalKill {
                code: None,
                signal: Some(9)
            }
        );
        assert_eq!(
            classify(signal(11)),
            ExitKind::ExternalKill {
                code: None,
                signal: Some(11)
            }
        );
    }

    #[test]
    fn test_propagated_code() {
        assert_eq!(ExitKind::Crash { code: 3 }.propagated_code(), 3);
        assert_eq!(classify(signal(9)).propagated_code(), 137);
        assert_eq!(classify(code(-1)).propagated_code(), -1);
        assert_eq!(
            ExitKind::ExternalKill {
                code: None,
                signal: None
            }
            .propagated_code(),
            1
        );
    }
}
