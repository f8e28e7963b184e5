//! Shared domain types for the kestrel supervisor: executors, policies,
//! error taxonomy, time source, and the crash-notification contract.

pub mod clock;
pub mod error;
pub mod notify;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AppError;
pub use notify::{CrashNotice, NoticeKind, NotificationSink, NullSink};
pub use types::{
    DistributionPolicy, Executor, ExecutorRole, ExternalKillPolicy, FailoverPolicy,
    FailoverStrategy, OutputFormat,
};
