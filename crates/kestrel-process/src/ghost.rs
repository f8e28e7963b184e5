//! Ghost reaping: monitors left running by a supervisor that died without
//! cleaning up (SIGKILL, OOM, crash) keep holding ports and API sessions.
//! Before the first spawn they are terminated, escalating to SIGKILL.

use std::time::Duration;

use tracing::{info, warn};

use crate::handle::{ProcessSignature, ProcessTable, Signal};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminate every process matching `signature` except those in `exclude`.
///
/// Sends SIGTERM, polls liveness for up to `timeout`, then SIGKILLs the
/// survivors. Returns the PIDs that were targeted. Signal failures are
/// logged and otherwise ignored.
pub async fn reap_ghosts(
    table: &dyn ProcessTable,
    signature: &ProcessSignature,
    exclude: &[u32],
    timeout: Duration,
) -> Vec<u32> {
    let ghosts: Vec<u32> = table
        .scan(signature)
        .into_iter()
        .filter(|pid| !exclude.contains(pid))
        .collect();
    if ghosts.is_empty() {
        return ghosts;
    }

    warn!(
        pids = ?ghosts,
        executable = %signature.executable,
        "Found untracked monitor processes, terminating"
    );
    for &pid in &ghosts {
        if let Err(err) = table.signal(pid, Signal::Terminate) {
            warn!(pid, error = %err, "Failed to send SIGTERM to ghost");
        }
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let survivors: Vec<u32> = ghosts
            .iter()
            .copied()
            .filter(|&pid| table.is_alive(pid))
            .collect();
        if survivors.is_empty() {
            info!(count = ghosts.len(), "Ghost monitors exited");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(pids = ?survivors, "Ghosts ignored SIGTERM, escalating to SIGKILL");
            for pid in survivors {
                if let Err(err) = table.signal(pid, Signal::Kill) {
                    warn!(pid, error = %err, "Failed to send SIGKILL to ghost");
                }
            }
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    ghosts
}
