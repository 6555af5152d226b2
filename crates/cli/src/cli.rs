use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fanout_core::PoolConfig;

/// Run shell commands in parallel and report each one as it finishes.
///
/// Results are printed in completion order, not the order the commands
/// were given in.
#[derive(Parser, Debug)]
#[command(name = "fanout", version, about = "Run shell commands in parallel, report in completion order")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Emit one JSON object per finished job instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the jobs listed in a TOML job file
    Run {
        /// Path to the job file
        path: PathBuf,

        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Run each trailing argument as a shell command line
    Exec {
        #[command(flatten)]
        pool: PoolArgs,

        /// Command lines, passed to `sh -c`
        #[arg(last = true, required = true)]
        commands: Vec<String>,
    },
}

/// Pool options shared by both subcommands. Flags win over the job file and env.
#[derive(Args, Debug, Clone, Default)]
pub struct PoolArgs {
    /// Maximum number of jobs running at once (0 = unbounded)
    #[arg(long, short = 'j')]
    pub limit: Option<usize>,

    /// Log a heartbeat when nothing finished for this many milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Do not treat a non-zero exit code as a failure
    #[arg(long)]
    pub allow_failure: bool,

    /// Kill any job without its own timeout after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl PoolArgs {
    pub fn apply(&self, config: &mut PoolConfig) {
        if let Some(limit) = self.limit {
            config.limit = Some(limit);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = Some(ms);
        }
        if self.allow_failure {
            config.require_success = false;
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exec() {
        let args = CliArgs::try_parse_from([
            "fanout", "exec", "-j", "2", "--allow-failure", "--", "echo a", "echo b",
        ])
        .unwrap();
        let Command::Exec { pool, commands } = args.command else {
            panic!("expected exec");
        };
        assert_eq!(pool.limit, Some(2));
        assert!(pool.allow_failure);
        assert_eq!(commands, vec!["echo a", "echo b"]);
    }

    #[test]
    fn parse_run_with_json() {
        let args = CliArgs::try_parse_from(["fanout", "run", "jobs.toml", "--json"]).unwrap();
        assert!(args.json);
        assert!(matches!(args.command, Command::Run { .. }));
    }

    #[test]
    fn exec_requires_commands() {
        assert!(CliArgs::try_parse_from(["fanout", "exec"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = PoolConfig { limit: Some(8), ..PoolConfig::default() };
        let pool = PoolArgs {
            limit: Some(2),
            poll_interval_ms: Some(500),
            allow_failure: true,
            timeout_secs: Some(30),
        };
        pool.apply(&mut config);

        assert_eq!(config.limit, Some(2));
        assert_eq!(config.poll_interval_ms, Some(500));
        assert!(!config.require_success);
        assert_eq!(pool.default_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn absent_flags_keep_config() {
        let mut config = PoolConfig { limit: Some(8), ..PoolConfig::default() };
        PoolArgs::default().apply(&mut config);
        assert_eq!(config, PoolConfig { limit: Some(8), ..PoolConfig::default() });
    }
}
