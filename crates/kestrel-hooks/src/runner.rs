//! Hook command execution with template variable substitution.

use crate::config::HookConfig;
use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Wrap in single quotes; internal quotes become `'\''`.
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Single-pass `{key}` substitution with shell-escaped values.
///
/// Unknown placeholders and unclosed braces are kept verbatim. Substituted
/// text is never re-scanned.
fn substitute_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            result.push(ch);
            continue;
        }
        let mut key = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            key.push(inner);
        }
        match (closed, variables.get(&key)) {
            (true, Some(value)) => result.push_str(&shell_escape(value)),
            (true, None) => {
                result.push('{');
                result.push_str(&key);
                result.push('}');
            }
            (false, _) => {
                result.push('{');
                result.push_str(&key);
            }
        }
    }
    result
}

/// Run the hook's command via `sh -c`, bounded by `timeout_secs`.
///
/// A disabled hook or one without a command is a no-op. Returns `Err` on
/// spawn failure, non-zero exit, or timeout; on timeout the whole process
/// group is killed.
pub fn run_hook(config: &HookConfig, variables: &HashMap<String, String>) -> Result<()> {
    if !config.enabled {
        tracing::debug!("Notify hook disabled, skipping");
        return Ok(());
    }
    let Some(template) = config.command.as_deref() else {
        tracing::debug!("Notify hook has no command configured, skipping");
        return Ok(());
    };

    let expanded = substitute_variables(template, variables);
    tracing::debug!(command = %expanded, "Executing notify hook");

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&expanded)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Own process group, so a timeout kills the shell's children too.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().context("Failed to spawn notify hook")?;
    let timeout = Duration::from_secs(config.timeout_secs);
    let start = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                tracing::debug!("Notify hook completed");
                return Ok(());
            }
            let exit_code = status.code().unwrap_or(-1);
            bail!("Notify hook exited with code {exit_code}");
        }

        if start.elapsed() >= timeout {
            #[cfg(unix)]
            {
                // SAFETY: kill() is async-signal-safe. Negative PID targets
                // the entire process group created by process_group(0).
                unsafe {
                    libc::kill(-(child.id() as i32), libc::SIGKILL);
                }
            }
            #[cfg(not(unix))]
            {
                let _ = child.kill();
            }
            let _ = child.wait();
            bail!("Notify hook timed out after {}s", config.timeout_secs);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
