use fanout_core::{JobError, JobErrorKind, JobKey};
use fanout_pool::{CommandRunnable, Runnable};
use serde::Serialize;

/// What the CLI prints for one finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub key: JobKey,
    pub command: String,
    /// `"ok"` or `"failed"`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
}

impl JobReport {
    /// Build a report from a job that has been waited on.
    pub fn new(key: JobKey, job: &mut CommandRunnable, error: Option<&JobError>) -> Self {
        let command = job.label();
        let output = job.output().cloned().unwrap_or_default();
        Self {
            key,
            command,
            status: if error.is_some() { "failed" } else { "ok" },
            error: error.map(ToString::to_string),
            error_kind: error.map(JobError::kind),
            exit_code: output.code,
            duration_ms: output.duration.as_millis() as u64,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    /// Header line followed by the output, each line prefixed with the key.
    pub fn render_text(&self, width: usize) -> String {
        let key = self.key.to_string();
        let mut out = match &self.error {
            Some(err) => format!(
                "{key:>width$} │ FAILED `{}` ({}ms): {err}\n",
                self.command, self.duration_ms
            ),
            None => format!("{key:>width$} │ ok `{}` ({}ms)\n", self.command, self.duration_ms),
        };
        for line in self.stdout.lines() {
            out.push_str(&format!("{key:>width$} │ {line}\n"));
        }
        for line in self.stderr.lines() {
            out.push_str(&format!("{key:>width$} ! {line}\n"));
        }
        out
    }
}
