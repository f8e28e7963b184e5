#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No enabled executors configured")]
    NoExecutors,

    #[error("Duplicate executor name '{0}'")]
    DuplicateExecutor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
