pub mod process;
pub mod runnable;
pub mod scheduler;

pub use process::{CapturedOutput, CommandRunnable};
pub use runnable::{RunStatus, Runnable};
pub use scheduler::{IterationState, Progress, Scheduler, SchedulerMetrics, DEFAULT_BACKOFF};

pub use fanout_core::{JobError, JobErrorKind, JobKey, PoolConfig, RunnableError, SchedulerError};
