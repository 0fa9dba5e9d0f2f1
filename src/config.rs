//! Configuration parsing, validation, and target path resolution.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Polling and back-off intervals (milliseconds) for the supervisor and the
/// control channel.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Child liveness poll interval while it runs normally.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Total time to wait for the child after a stop request.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Child liveness poll interval during the grace period.
    #[serde(default = "default_grace_poll_interval_ms")]
    pub grace_poll_interval_ms: u64,
    /// Pause between a normal child exit and the next launch.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Pause before re-checking a missing target executable.
    #[serde(default = "default_missing_target_delay_ms")]
    pub missing_target_delay_ms: u64,
    /// Pause after the OS refused to spawn the target.
    #[serde(default = "default_spawn_failure_delay_ms")]
    pub spawn_failure_delay_ms: u64,
    /// Pause before re-creating the control channel endpoint.
    #[serde(default = "default_listener_retry_ms")]
    pub listener_retry_ms: u64,
    /// Upper bound on reading one command from a control connection.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_grace_period_ms() -> u64 {
    10_000
}

fn default_grace_poll_interval_ms() -> u64 {
    200
}

fn default_restart_delay_ms() -> u64 {
    1_000
}

fn default_missing_target_delay_ms() -> u64 {
    5_000
}

fn default_spawn_failure_delay_ms() -> u64 {
    2_000
}

fn default_listener_retry_ms() -> u64 {
    1_000
}

fn default_read_timeout_ms() -> u64 {
    1_000
}

fn default_target() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("synapse_burnout.exe")
    } else {
        PathBuf::from("synapse_burnout")
    }
}

fn default_ipc_name() -> String {
    "LabMonitorPipe_v1".into()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            grace_poll_interval_ms: default_grace_poll_interval_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            missing_target_delay_ms: default_missing_target_delay_ms(),
            spawn_failure_delay_ms: default_spawn_failure_delay_ms(),
            listener_retry_ms: default_listener_retry_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl TimingConfig {
    /// Child liveness poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Grace window after a stop request.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Poll interval inside the grace window.
    #[must_use]
    pub fn grace_poll_interval(&self) -> Duration {
        Duration::from_millis(self.grace_poll_interval_ms)
    }

    /// Delay before relaunching after a normal exit.
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Delay before re-checking a missing target.
    #[must_use]
    pub fn missing_target_delay(&self) -> Duration {
        Duration::from_millis(self.missing_target_delay_ms)
    }

    /// Delay after a spawn failure.
    #[must_use]
    pub fn spawn_failure_delay(&self) -> Duration {
        Duration::from_millis(self.spawn_failure_delay_ms)
    }

    /// Delay before re-creating the control endpoint.
    #[must_use]
    pub fn listener_retry(&self) -> Duration {
        Duration::from_millis(self.listener_retry_ms)
    }

    /// Bound on a single command read.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("grace_period_ms", self.grace_period_ms),
            ("grace_poll_interval_ms", self.grace_poll_interval_ms),
            ("restart_delay_ms", self.restart_delay_ms),
            ("missing_target_delay_ms", self.missing_target_delay_ms),
            ("spawn_failure_delay_ms", self.spawn_failure_delay_ms),
            ("listener_retry_ms", self.listener_retry_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(AppError::Config(format!(
                    "timing.{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// Global configuration parsed from `netwatch.toml`.
///
/// Every field has a default, so an empty file (or no file at all) yields
/// the reference behavior.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Target executable, relative to the working directory unless absolute.
    #[serde(default = "default_target")]
    pub target: PathBuf,
    /// Named pipe / local socket identifier for the control channel.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Polling and back-off intervals.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            ipc_name: default_ipc_name(),
            timing: TimingConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field invariants. Call again after applying CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on an empty target or channel name, or a
    /// zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.target.as_os_str().is_empty() {
            return Err(AppError::Config("target must not be empty".into()));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        self.timing.validate()
    }

    /// Absolute path of the target executable.
    ///
    /// Relative targets are anchored at the current working directory so the
    /// launch never falls back to a `PATH` lookup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the working directory cannot be determined.
    pub fn resolve_target(&self) -> Result<PathBuf> {
        if self.target.is_absolute() {
            return Ok(self.target.clone());
        }
        let cwd = env::current_dir()
            .map_err(|err| AppError::Config(format!("cannot determine working directory: {err}")))?;
        Ok(cwd.join(&self.target))
    }
}
