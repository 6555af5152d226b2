use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Largest backoff accepted between empty scans.
pub const MAX_BACKOFF_MS: u64 = 1000;

/// Scheduler configuration, typically parsed from the `[pool]` table of a job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of jobs running at once. `None` or 0 = unbounded.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Emit a heartbeat when nothing finished within this many milliseconds.
    /// `None` = block until some job finishes.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Treat a non-zero exit as a captured failure.
    #[serde(default = "default_require_success")]
    pub require_success: bool,
    /// Sleep between scans that found nothing finished.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_require_success() -> bool {
    true
}

fn default_backoff_ms() -> u64 {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            limit: None,
            poll_interval_ms: None,
            require_success: default_require_success(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl PoolConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Resolve the concurrency limit (0 means unbounded).
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&n| n > 0)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_ms > MAX_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "backoff_ms {} exceeds maximum of {MAX_BACKOFF_MS}",
                self.backoff_ms
            )));
        }
        Ok(())
    }

    /// Redacted view for startup logs and `--json` reports.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "limit": self.effective_limit(),
            "poll_interval_ms": self.poll_interval_ms,
            "require_success": self.require_success,
            "backoff_ms": self.backoff_ms,
        })
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `FANOUT_LIMIT` -> `limit`
    /// - `FANOUT_POLL_INTERVAL_MS` -> `poll_interval_ms`
    /// - `FANOUT_REQUIRE_SUCCESS` -> `require_success`
    /// - `FANOUT_BACKOFF_MS` -> `backoff_ms`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FANOUT_LIMIT") {
            match v.parse::<usize>() {
                Ok(n) => self.limit = Some(n),
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable FANOUT_LIMIT"),
            }
        }
        if let Some(v) = lookup("FANOUT_POLL_INTERVAL_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.poll_interval_ms = Some(ms),
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable FANOUT_POLL_INTERVAL_MS"),
            }
        }
        if let Some(v) = lookup("FANOUT_REQUIRE_SUCCESS") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.require_success = true,
                "0" | "false" | "no" => self.require_success = false,
                _ => tracing::warn!(value = %v, "ignoring unparsable FANOUT_REQUIRE_SUCCESS"),
            }
        }
        if let Some(v) = lookup("FANOUT_BACKOFF_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.backoff_ms = ms,
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable FANOUT_BACKOFF_MS"),
            }
        }
    }
}
