use std::time::Duration;

use fanout_core::RunnableError;

/// Observed state of a started [`Runnable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Still executing.
    Running,
    /// Exited on its own. `code` is `None` when killed by a signal.
    Terminated { code: Option<i32> },
    /// Exceeded its wall-clock limit and was stopped.
    TimedOut(Duration),
    /// Checking the status itself failed.
    StatusCheckFailed(String),
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running)
    }
}

/// One external unit of work the [`Scheduler`](crate::Scheduler) can drive.
///
/// Implementations own the mechanics of starting a command, capturing its
/// output and enforcing its timeout. The scheduler only calls [`start`] once
/// and then polls.
///
/// Once `poll_status` returns anything other than [`RunStatus::Running`] it
/// must keep returning that same status.
///
/// [`start`]: Runnable::start
pub trait Runnable {
    /// Begin execution. A second call fails with [`RunnableError::AlreadyRunning`].
    fn start(&mut self) -> Result<(), RunnableError>;

    /// Non-blocking status check.
    fn poll_status(&mut self) -> RunStatus;

    /// Whether the runnable has been started and has not yet finished.
    fn is_running(&self) -> bool;

    /// Block until the runnable has fully shut down (pipes drained, process reaped).
    fn wait(&mut self) {}

    /// Short description used in log lines.
    fn label(&self) -> String {
        "runnable".to_string()
    }
}

impl<R: Runnable + ?Sized> Runnable for Box<R> {
    fn start(&mut self) -> Result<(), RunnableError> {
        (**self).start()
    }

    fn poll_status(&mut self) -> RunStatus {
        (**self).poll_status()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn wait(&mut self) {
        (**self).wait()
    }

    fn label(&self) -> String {
        (**self).label()
    }
}
