//! Configuration management for newscheck.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory when no config is given.
pub const DEFAULT_CONFIG_FILE: &str = "newscheck.toml";

/// Main configuration structure for newscheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log the engine's validated output after each check.
    pub echo_output: bool,

    /// Seed for randomized request parameters. `None` draws from entropy.
    pub seed: Option<u64>,

    /// Server process settings.
    pub server: ServerConfig,

    /// HTTP retry budgets.
    pub retry: RetryConfig,
}

/// Settings for the supervised server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// File receiving the server's stdout and stderr.
    pub log_path: PathBuf,

    /// Time between SIGTERM and SIGKILL when stopping.
    pub stop_grace_ms: u64,

    /// How long to wait after spawning before checking the process is alive.
    pub startup_probe_ms: u64,
}

/// Retry budgets for requests against the server under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub connect_window_ms: u64,
    pub connect_interval_ms: u64,
    pub unavailable_window_ms: u64,
    pub unavailable_interval_ms: u64,

    /// Per-attempt timeout; 0 disables it.
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            echo_output: true,
            seed: None,
            server: ServerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/dev/null"),
            stop_grace_ms: 5_000,
            startup_probe_ms: 100,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_window_ms: 10_000,
            connect_interval_ms: 100,
            unavailable_window_ms: 300_000,
            unavailable_interval_ms: 1_000,
            request_timeout_ms: 0,
        }
    }
}

impl ServerConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn startup_probe(&self) -> Duration {
        Duration::from_millis(self.startup_probe_ms)
    }
}

impl RetryConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;

        config.expand_tilde_in_paths();
        config.validate()?;

        Ok(config)
    }

    /// Load `path` if given, otherwise `newscheck.toml` from the working
    /// directory when present, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            Self::load(local)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject budgets that would make the retry loops spin or never retry.
    pub fn validate(&self) -> crate::Result<()> {
        if self.retry.connect_interval_ms == 0 || self.retry.unavailable_interval_ms == 0 {
            return Err(crate::Error::Config(
                "retry intervals must be greater than zero".to_string(),
            ));
        }
        if self.server.log_path.as_os_str().is_empty() {
            return Err(crate::Error::Config(
                "server.log_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn expand_tilde_in_paths(&mut self) {
        let raw = self.server.log_path.to_string_lossy();
        let expanded = shellexpand::tilde(&raw).into_owned();
        self.server.log_path = PathBuf::from(expanded);
    }
}
