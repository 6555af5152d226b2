//! Completion-order scheduler with a concurrency cap.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructors, configuration, insertion, accessors
//! - `admission`: moving waiting jobs into the running set under the limit
//! - `polling`: the completion-order poll loop and iteration protocol
//! - `metrics`: batch counters

mod admission;
mod core;
pub mod metrics;
mod polling;
pub mod types;

pub use self::core::Scheduler;
pub use metrics::SchedulerMetrics;
pub use types::{IterationState, Progress, DEFAULT_BACKOFF};
