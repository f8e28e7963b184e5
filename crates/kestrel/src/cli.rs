use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kestrel_core::OutputFormat;

#[derive(Parser)]
#[command(name = "kestrel", version)]
#[command(about = "Kestrel: crash-safe supervisor and executor scheduler for agent monitors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/kestrel/config.toml)
    #[arg(long, global = true, env = "KESTREL_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the supervisor, detached unless --foreground is given
    Start {
        /// Run in the current process instead of detaching
        #[arg(long)]
        foreground: bool,
    },

    /// Stop a running supervisor (SIGTERM, then SIGKILL after the timeout)
    Stop {
        /// Seconds to wait for a graceful exit before SIGKILL
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },

    /// Show supervisor and monitor status (exit 1 when not running)
    Status {
        /// Output format (text or json)
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the built-in monitor (normally spawned by the supervisor)
    Monitor,

    /// Inspect executor scheduling
    Executors {
        #[command(subcommand)]
        cmd: ExecutorsCommands,
    },
}

#[derive(Subcommand)]
pub enum ExecutorsCommands {
    /// Show configured executors, shares, and cooldowns
    Status {
        /// Output format (text or json)
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Dry-run executor selection
    Next {
        /// Number of selections to make
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}
