use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use fanout_core::PoolConfig;
use fanout_pool::{CommandRunnable, Scheduler};
use indexmap::IndexMap;
use serde::Deserialize;

/// A TOML job file: optional `[pool]` settings plus `[[jobs]]` entries.
///
/// ```toml
/// [pool]
/// limit = 4
///
/// [[jobs]]
/// name = "lint"
/// command = "cargo clippy"
/// timeout_secs = 600
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// One command to run.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    /// Key to report the job under. Unnamed jobs get the next free index.
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command line, run via `sh -c`.
    pub command: String,

    /// Per-job timeout; falls back to `--timeout-secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Working directory, relative to the job file.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

impl JobFile {
    /// Parse a job file from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut file: Self = toml::from_str(toml_str).context("invalid job file")?;
        file.pool.apply_env_overrides();
        file.pool.validate()?;
        Ok(file)
    }

    /// Load a job file, resolving relative `cwd` entries against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file '{}'", path.display()))?;
        let mut file = Self::from_toml(&content)
            .with_context(|| format!("failed to load job file '{}'", path.display()))?;

        if let Some(base) = path.parent() {
            for job in &mut file.jobs {
                if let Some(cwd) = job.cwd.as_mut() {
                    if cwd.is_relative() {
                        *cwd = base.join(&*cwd);
                    }
                }
            }
        }
        Ok(file)
    }
}

impl JobSpec {
    pub fn from_command(command: impl Into<String>) -> Self {
        Self {
            name: None,
            command: command.into(),
            timeout_secs: None,
            cwd: None,
            env: IndexMap::new(),
        }
    }

    pub fn to_runnable(&self, default_timeout: Option<Duration>) -> CommandRunnable {
        let mut runnable = CommandRunnable::shell(self.command.clone());
        for (k, v) in &self.env {
            runnable = runnable.env(k.clone(), v.clone());
        }
        if let Some(dir) = &self.cwd {
            runnable = runnable.current_dir(dir.clone());
        }
        let timeout = self.timeout_secs.map(Duration::from_secs).or(default_timeout);
        if let Some(limit) = timeout {
            runnable = runnable.timeout(limit);
        }
        runnable
    }
}

/// Build a scheduler with one job per entry, keyed by name where given.
pub fn build_scheduler(
    specs: &[JobSpec],
    config: &PoolConfig,
    default_timeout: Option<Duration>,
) -> Result<Scheduler<CommandRunnable>> {
    let mut scheduler = Scheduler::new(Vec::new(), config)?;
    for spec in specs {
        let runnable = spec.to_runnable(default_timeout);
        match &spec.name {
            Some(name) => scheduler
                .insert_keyed(name.as_str(), runnable)
                .with_context(|| format!("job '{name}' is listed twice"))?,
            None => {
                scheduler.insert(runnable)?;
            }
        }
    }
    Ok(scheduler)
}
