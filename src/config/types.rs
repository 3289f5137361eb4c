//! Configuration types.

use crate::error::GlasshouseError;
use crate::logging::LoggingConfig;
use crate::sandbox::library;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address.
const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Default cap on request body size: 64 MiB.
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Default seed directory, relative to the working directory.
const DEFAULT_SEED_DIR: &str = "seed";

/// Default sandbox home directory.
pub(crate) const DEFAULT_HOME_DIR: &str = "/home/sandbox";

/// Default interval between readiness polls.
const DEFAULT_READY_POLL_INTERVAL_MS: u64 = 100;

/// Default number of readiness polls before giving up.
const DEFAULT_READY_POLL_ATTEMPTS: u32 = 100;

/// Libraries loaded into every fresh engine by default.
const DEFAULT_PRELOAD: [&str; 2] = ["stats", "text"];

/// Root configuration structure for glasshouse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlasshouseConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Sandbox lifecycle settings.
    pub sandbox: SandboxConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl GlasshouseConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the sandbox settings.
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Sets the listen address.
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.server.bind = bind.into();
        self
    }

    /// Sets the largest accepted request body.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.server.max_body_bytes = max_body_bytes;
        self
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending field.
    pub fn validate(&self) -> Result<(), GlasshouseError> {
        if self.server.max_body_bytes == 0 {
            return Err(GlasshouseError::configuration(
                "server.max_body_bytes",
                "must be at least 1",
            ));
        }
        self.sandbox.validate()
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Largest request body accepted; larger bodies get a `ParsingError` reply.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Sandbox lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Host directory whose files are copied into every fresh sandbox.
    pub seed_dir: PathBuf,
    /// Absolute home directory inside the sandbox filesystem.
    pub home_dir: String,
    /// Milliseconds between readiness polls.
    pub ready_poll_interval_ms: u64,
    /// Readiness polls before `wait_until_ready` gives up.
    pub ready_poll_attempts: u32,
    /// Libraries loaded at boot, before any request arrives.
    pub preload_libraries: Vec<String>,
}

impl SandboxConfig {
    /// Creates sandbox settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seed directory.
    #[must_use]
    pub fn with_seed_dir(mut self, seed_dir: impl Into<PathBuf>) -> Self {
        self.seed_dir = seed_dir.into();
        self
    }

    /// Sets the readiness polling budget.
    #[must_use]
    pub fn with_ready_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.ready_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.ready_poll_attempts = attempts;
        self
    }

    /// Sets the libraries loaded at boot.
    #[must_use]
    pub fn with_preload_libraries<I, S>(mut self, libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload_libraries = libraries.into_iter().map(Into::into).collect();
        self
    }

    /// Interval between readiness polls.
    #[must_use]
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    fn validate(&self) -> Result<(), GlasshouseError> {
        if self.ready_poll_attempts == 0 {
            return Err(GlasshouseError::configuration(
                "sandbox.ready_poll_attempts",
                "must be at least 1",
            ));
        }
        if !self.home_dir.starts_with('/') || self.home_dir.len() < 2 {
            return Err(GlasshouseError::configuration(
                "sandbox.home_dir",
                format!("'{}' must be an absolute path below /", self.home_dir),
            ));
        }
        let known = library::names();
        if let Some(unknown) = self
            .preload_libraries
            .iter()
            .find(|name| !known.contains(&name.as_str()))
        {
            return Err(GlasshouseError::configuration(
                "sandbox.preload_libraries",
                format!("unknown library '{unknown}'; available: {}", known.join(", ")),
            ));
        }
        Ok(())
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            seed_dir: PathBuf::from(DEFAULT_SEED_DIR),
            home_dir: DEFAULT_HOME_DIR.to_string(),
            ready_poll_interval_ms: DEFAULT_READY_POLL_INTERVAL_MS,
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
            preload_libraries: DEFAULT_PRELOAD.iter().map(|s| s.to_string()).collect(),
        }
    }
}
