//! External command adapter.
//!
//! [`CommandRunnable`] wraps `std::process::Command` so shell commands can be
//! scheduled directly. Output is drained by one reader thread per pipe so a
//! chatty child never blocks on a full pipe while the scheduler is polling
//! other jobs.
//!
//! On Unix each command leads its own process group. Timeouts, [`kill`] and
//! drop signal the whole group, so grandchildren started by `sh -c` die with
//! it and release the output pipes.
//!
//! [`kill`]: CommandRunnable::kill

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fanout_core::RunnableError;
use serde::Serialize;
use tracing::{debug, warn};

use crate::runnable::{RunStatus, Runnable};

/// Output captured from a finished command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` if killed by a signal or timed out.
    pub code: Option<i32>,
    /// Time from spawn until the exit was observed.
    pub duration: Duration,
}

impl CapturedOutput {
    /// stdout and stderr combined the way the shell tool reports them.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n--- stderr ---\n{}", self.stdout, self.stderr)
        }
    }
}

struct Readers {
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl Readers {
    fn join(self) -> (String, String) {
        (join_pipe(self.stdout), join_pipe(self.stderr))
    }
}

fn drain<T: Read + Send + 'static>(pipe: Option<T>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

/// SIGKILL the child's process group, then the child itself.
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(e.into()),
        }
    }
    child.kill()
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// A one-shot external command with an optional wall-clock timeout.
pub struct CommandRunnable {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    display: Option<String>,
    child: Option<Child>,
    started_at: Option<Instant>,
    finished_after: Option<Duration>,
    outcome: Option<RunStatus>,
    readers: Option<Readers>,
    output: Option<CapturedOutput>,
}

impl CommandRunnable {
    /// Run `program` directly, without a shell.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            timeout: None,
            display: None,
            child: None,
            started_at: None,
            finished_after: None,
            outcome: None,
            readers: None,
            output: None,
        }
    }

    /// Run a command line through `sh -c`.
    pub fn shell(command_line: impl Into<String>) -> Self {
        let command_line = command_line.into();
        let mut runnable = Self::new("sh").arg("-c").arg(command_line.clone());
        runnable.display = Some(command_line);
        runnable
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Kill the command if it is still running after `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// OS process id while the child is alive.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// The final status, once observed.
    pub fn outcome(&self) -> Option<&RunStatus> {
        self.outcome.as_ref()
    }

    /// Captured output, once the command has finished.
    ///
    /// Joins the reader threads on first call, which blocks until every
    /// process holding the pipes (including grandchildren) has closed them.
    pub fn output(&mut self) -> Option<&CapturedOutput> {
        self.collect();
        self.output.as_ref()
    }

    /// Stop the command early. A no-op if it is not running.
    pub fn kill(&mut self) -> std::io::Result<()> {
        if self.outcome.is_some() {
            return Ok(());
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        kill_tree(child)?;
        let status = child.wait()?;
        debug!(command = %self.label(), "command killed");
        self.settle(RunStatus::Terminated { code: status.code() });
        Ok(())
    }

    fn settle(&mut self, status: RunStatus) -> RunStatus {
        self.finished_after = self.started_at.map(|at| at.elapsed());
        self.outcome = Some(status.clone());
        status
    }

    fn collect(&mut self) {
        if self.output.is_some() {
            return;
        }
        let code = match &self.outcome {
            Some(RunStatus::Terminated { code }) => *code,
            Some(_) => None,
            None => return,
        };
        let (stdout, stderr) = self.readers.take().map(Readers::join).unwrap_or_default();
        self.output = Some(CapturedOutput {
            stdout,
            stderr,
            code,
            duration: self.finished_after.unwrap_or_default(),
        });
    }
}

impl Runnable for CommandRunnable {
    fn start(&mut self) -> Result<(), RunnableError> {
        if self.child.is_some() || self.outcome.is_some() {
            return Err(RunnableError::AlreadyRunning);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        self.readers = Some(Readers {
            stdout: drain(child.stdout.take()),
            stderr: drain(child.stderr.take()),
        });
        debug!(command = %self.label(), pid = child.id(), "command spawned");
        self.started_at = Some(Instant::now());
        self.child = Some(child);
        Ok(())
    }

    fn poll_status(&mut self) -> RunStatus {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let Some(child) = self.child.as_mut() else {
            return RunStatus::StatusCheckFailed("command has not been started".to_string());
        };

        match child.try_wait() {
            Ok(Some(status)) => self.settle(RunStatus::Terminated { code: status.code() }),
            Ok(None) => {
                let expired = match (self.timeout, self.started_at) {
                    (Some(limit), Some(at)) => at.elapsed() >= limit,
                    _ => false,
                };
                if !expired {
                    return RunStatus::Running;
                }
                if let Err(e) = kill_tree(child) {
                    debug!(error = %e, "kill after timeout failed");
                }
                let _ = child.wait();
                let limit = self.timeout.unwrap_or_default();
                warn!(command = %self.label(), ?limit, "command timed out");
                self.settle(RunStatus::TimedOut(limit))
            }
            Err(e) => self.settle(RunStatus::StatusCheckFailed(e.to_string())),
        }
    }

    fn is_running(&self) -> bool {
        self.child.is_some() && self.outcome.is_none()
    }

    fn wait(&mut self) {
        if self.outcome.is_none() {
            if let Some(child) = self.child.as_mut() {
                match child.wait() {
                    Ok(status) => {
                        self.settle(RunStatus::Terminated { code: status.code() });
                    }
                    Err(e) => {
                        self.settle(RunStatus::StatusCheckFailed(e.to_string()));
                    }
                }
            }
        }
        self.collect();
    }

    fn label(&self) -> String {
        match &self.display {
            Some(line) => line.clone(),
            None if self.args.is_empty() => self.program.clone(),
            None => format!("{} {}", self.program, self.args.join(" ")),
        }
    }
}

impl Drop for CommandRunnable {
    fn drop(&mut self) {
        if self.is_running() {
            if let Some(child) = self.child.as_mut() {
                let _ = kill_tree(child);
                let _ = child.wait();
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn wait_for_exit(job: &mut CommandRunnable) -> RunStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = job.poll_status();
            if !status.is_running() || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let mut job = CommandRunnable::shell("echo hello");
        job.start().unwrap();
        assert_eq!(wait_for_exit(&mut job), RunStatus::Terminated { code: Some(0) });

        let output = job.output().unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.code, Some(0));
    }

    #[test]
    fn nonzero_exit_code() {
        let mut job = CommandRunnable::shell("echo oops >&2; exit 3");
        job.start().unwrap();
        assert_eq!(wait_for_exit(&mut job), RunStatus::Terminated { code: Some(3) });
        assert_eq!(job.output().unwrap().stderr.trim(), "oops");
    }

    #[test]
    fn second_start_is_rejected() {
        let mut job = CommandRunnable::shell("true");
        job.start().unwrap();
        assert!(matches!(job.start(), Err(RunnableError::AlreadyRunning)));
        job.wait();
        assert!(matches!(job.start(), Err(RunnableError::AlreadyRunning)));
    }

    #[test]
    fn spawn_failure() {
        let mut job = CommandRunnable::new("/nonexistent/fanout-test-binary");
        assert!(matches!(job.start(), Err(RunnableError::Spawn(_))));
        assert!(!job.is_running());
    }

    #[test]
    fn timeout_kills_the_command() {
        let mut job = CommandRunnable::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        job.start().unwrap();

        let started = Instant::now();
        let status = wait_for_exit(&mut job);
        assert_eq!(status, RunStatus::TimedOut(Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(4));
        // the status is sticky
        assert_eq!(job.poll_status(), status);
        assert!(!job.is_running());
    }

    #[test]
    fn timeout_kills_shell_grandchildren() {
        let mut job = CommandRunnable::shell("sleep 3; echo late")
            .timeout(Duration::from_millis(200));
        job.start().unwrap();

        let started = Instant::now();
        assert_eq!(wait_for_exit(&mut job), RunStatus::TimedOut(Duration::from_millis(200)));
        job.wait();
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert_eq!(job.output().unwrap().stdout, "");
    }

    #[test]
    fn kill_reaches_the_whole_pipeline() {
        let mut job = CommandRunnable::shell("sleep 3 | cat");
        job.start().unwrap();

        let started = Instant::now();
        job.kill().unwrap();
        job.wait();
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[test]
    fn kill_stops_a_running_command() {
        let mut job = CommandRunnable::new("sleep").arg("5");
        job.start().unwrap();
        assert!(job.is_running());

        job.kill().unwrap();
        assert!(!job.is_running());
        assert_eq!(job.poll_status(), RunStatus::Terminated { code: None });
    }

    #[test]
    fn env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = CommandRunnable::shell("echo \"$GREETING\"; pwd")
            .env("GREETING", "hi")
            .current_dir(dir.path());
        job.start().unwrap();
        job.wait();

        let output = job.output().unwrap();
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("hi"));
        let pwd = lines.next().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(pwd).canonicalize().unwrap(), expected);
    }

    #[test]
    fn labels() {
        assert_eq!(CommandRunnable::shell("make test").label(), "make test");
        assert_eq!(CommandRunnable::new("ls").args(["-l", "/tmp"]).label(), "ls -l /tmp");
        assert_eq!(CommandRunnable::new("true").label(), "true");
    }

    #[test]
    fn combined_output() {
        let out = CapturedOutput {
            stdout: "a".into(),
            stderr: "b".into(),
            ..CapturedOutput::default()
        };
        assert_eq!(out.combined(), "a\n--- stderr ---\nb");
    }
}
