use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::key::JobKey;

/// Errors that interrupt the caller's control flow.
///
/// Everything that can go wrong with an individual job is a [`JobError`]
/// instead and lands in the scheduler's error log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate job key: {0}")]
    DuplicateKey(JobKey),
}

/// Failure captured for a single job. Never aborts the batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("failed to start: {0}")]
    StartFailure(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("exited abnormally (code {})", describe_code(.code))]
    AbnormalExit { code: Option<i32> },

    #[error("status check failed: {0}")]
    StatusCheckFailed(String),
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Coarse category of a [`JobError`], handy for `match`-free branching and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    StartFailure,
    TimedOut,
    AbnormalExit,
    StatusCheckFailed,
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            JobError::StartFailure(_) => JobErrorKind::StartFailure,
            JobError::TimedOut(_) => JobErrorKind::TimedOut,
            JobError::AbnormalExit { .. } => JobErrorKind::AbnormalExit,
            JobError::StatusCheckFailed(_) => JobErrorKind::StatusCheckFailed,
        }
    }
}

/// Errors returned by `Runnable::start`.
#[derive(Debug, Error)]
pub enum RunnableError {
    #[error("already running")]
    AlreadyRunning,

    #[error("spawn error: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors loading or validating a pool configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_messages() {
        assert_eq!(
            JobError::AbnormalExit { code: Some(2) }.to_string(),
            "exited abnormally (code 2)"
        );
        assert_eq!(
            JobError::AbnormalExit { code: None }.to_string(),
            "exited abnormally (code none)"
        );
        assert_eq!(
            JobError::TimedOut(Duration::from_millis(250)).to_string(),
            "timed out after 250ms"
        );
    }

    #[test]
    fn job_error_kind() {
        assert_eq!(JobError::StartFailure("x".into()).kind(), JobErrorKind::StartFailure);
        assert_eq!(JobError::TimedOut(Duration::ZERO).kind(), JobErrorKind::TimedOut);
        assert_eq!(JobError::AbnormalExit { code: None }.kind(), JobErrorKind::AbnormalExit);
        assert_eq!(
            JobError::StatusCheckFailed("io".into()).kind(),
            JobErrorKind::StatusCheckFailed
        );
    }

    #[test]
    fn duplicate_key_message() {
        let err = SchedulerError::DuplicateKey(JobKey::from("lint"));
        assert_eq!(err.to_string(), "duplicate job key: lint");
    }
}
