use anyhow::Result;
use clap::Parser;

mod cli;
mod context;
mod executors_cmd;
mod logging;
mod monitor_cmd;
mod supervise_cmd;

use cli::{Cli, Commands, ExecutorsCommands};
use context::AppContext;
use kestrel_config::KestrelConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = KestrelConfig::load(cli.config.as_deref())?;
    let log_guard = logging::init(config.logging.dir.as_deref())?;
    let mut ctx = AppContext::new(config, cli.config)?;

    let code = match cli.command {
        Commands::Start { foreground } => supervise_cmd::handle_start(&ctx, foreground).await?,
        Commands::Stop { timeout_secs } => supervise_cmd::handle_stop(&ctx, timeout_secs).await?,
        Commands::Status { format } => supervise_cmd::handle_status(&ctx, format)?,
        Commands::Monitor => monitor_cmd::handle_monitor(&ctx).await?,
        Commands::Executors { cmd } => match cmd {
            ExecutorsCommands::Status { format } => executors_cmd::handle_status(&ctx, format)?,
            ExecutorsCommands::Next { count } => executors_cmd::handle_next(&mut ctx, count)?,
        },
    };

    // Flush file logs before a non-zero exit skips destructors.
    drop(log_guard);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
