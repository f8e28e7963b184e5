use std::path::PathBuf;

pub const APP_NAME: &str = "kestrel";

fn runtime_dir_for_name(app_name: &str, runtime_root: Option<&str>, uid: u32) -> PathBuf {
    if let Some(runtime_root) = runtime_root.filter(|root| !root.is_empty()) {
        return PathBuf::from(runtime_root).join(app_name);
    }
    PathBuf::from("/tmp").join(format!("{app_name}-{uid}"))
}

fn effective_uid() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: `geteuid` has no preconditions and returns caller effective UID.
        unsafe { libc::geteuid() }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

/// `{XDG config dir}/kestrel/config.toml`, or `None` when no home directory
/// can be determined (e.g. in minimal containers).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default PID directory: `$XDG_RUNTIME_DIR/kestrel`, else `/tmp/kestrel-{uid}`.
pub fn runtime_dir() -> PathBuf {
    let runtime_root = std::env::var("XDG_RUNTIME_DIR").ok();
    runtime_dir_for_name(APP_NAME, runtime_root.as_deref(), effective_uid())
}
