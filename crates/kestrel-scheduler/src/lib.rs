//! Scheduler: executor selection (weighted / round-robin / primary-only),
//! cooldown bookkeeping, failover, and retry-with-failover dispatch.

pub mod dispatch;
pub mod failover;
pub mod scheduler;
pub mod selection;
pub mod summary;

pub use dispatch::{DispatchError, DispatchOutcome, dispatch};
pub use scheduler::ExecutorScheduler;
pub use summary::{ExecutorStatus, ExecutorSummary};
