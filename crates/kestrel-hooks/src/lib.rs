//! Shell-command notification hooks for supervisor crash alerts.

pub mod config;
pub mod notifier;
pub mod runner;

pub use config::HookConfig;
pub use notifier::{HookNotifier, notice_variables};
pub use runner::run_hook;
