pub mod config;
pub mod paths;
pub mod validate;

pub use config::{
    DistributionSection, ExecutorEntry, FailoverSection, KestrelConfig, LoggingSection,
    SupervisorSection,
};
pub use validate::validate_config;
