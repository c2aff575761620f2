//! Configuration for the sampling engine
//!
//! Loaded from a TOML file with per-field defaults; nothing here is ever
//! written back — the engine itself persists no state.

mod defaults;

pub use defaults::{
    DEFAULT_LIVENESS_INTERVAL_MS, DEFAULT_LOG_LEVEL, DEFAULT_MIN_PER_WORKER,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_WORKER_CAP, DEFAULT_WORKER_TIMEOUT_MS,
};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Tick interval in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub interval_ms: u64,
    /// Minimum spacing between process-liveness probes.
    #[serde(default = "defaults::liveness_interval_ms")]
    pub liveness_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval_ms: defaults::poll_interval_ms(),
            liveness_interval_ms: defaults::liveness_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Hard cap on pooled workers; the effective cap is further clamped by
    /// the CPU count.
    #[serde(default = "defaults::worker_cap")]
    pub cap: usize,
    /// Requests per worker below which no extra worker is spawned.
    #[serde(default = "defaults::min_per_worker")]
    pub min_per_worker: usize,
    /// How long the dispatcher waits for a chunk before evicting the worker.
    #[serde(default = "defaults::worker_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            cap: defaults::worker_cap(),
            min_per_worker: defaults::min_per_worker(),
            timeout_ms: defaults::worker_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: defaults::log_level(),
        }
    }
}

impl Config {
    /// Loads from `path`, falling back to defaults when the file is missing.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_ms must be at least 1".to_string(),
            ));
        }
        if self.workers.cap == 0 || self.workers.cap > 64 {
            return Err(ConfigError::Invalid(
                "workers.cap must be between 1 and 64".to_string(),
            ));
        }
        if self.workers.min_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "workers.min_per_worker must be at least 1".to_string(),
            ));
        }
        if self.workers.timeout_ms < 10 {
            return Err(ConfigError::Invalid(
                "workers.timeout_ms must be at least 10".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(self.poll.interval_ms),
            liveness_interval: Duration::from_millis(self.poll.liveness_interval_ms),
            worker_cap: self.workers.cap,
            min_per_worker: self.workers.min_per_worker,
            worker_timeout: Duration::from_millis(self.workers.timeout_ms),
        }
    }
}

/// Runtime engine parameters, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub liveness_interval: Duration,
    pub worker_cap: usize,
    pub min_per_worker: usize,
    pub worker_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Config::default().engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll.interval_ms, 100);
        assert_eq!(config.workers.cap, 6);
        assert_eq!(config.workers.timeout_ms, 5000);
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/memory-sampler.toml").unwrap();
        assert_eq!(config.poll.interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poll]\ninterval_ms = 10\n\n[workers]\ncap = 2").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.poll.interval_ms, 10);
        assert_eq!(config.workers.cap, 2);
        // Untouched sections keep defaults.
        assert_eq!(config.workers.min_per_worker, DEFAULT_MIN_PER_WORKER);
    }

    #[test]
    fn test_validation_rejects_nonsense() {
        let mut config = Config::default();
        config.poll.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.workers.cap = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.workers.timeout_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_conversion() {
        let engine = Config::default().engine();
        assert_eq!(engine.poll_interval, Duration::from_millis(100));
        assert_eq!(engine.worker_timeout, Duration::from_millis(5000));
    }
}
