//! Streaming configuration for upload budgets and decode concurrency.
//!
//! Configuration can be loaded from a TOML file, environment variables,
//! or created programmatically. Tile sizes are not configurable: they are
//! bound by the GPU's maximum texture size and live in [`crate::size_class`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Default wall-clock budget for tile uploads per idle tick.
///
/// A 60 FPS frame lasts 16ms; uploads take about a quarter of it.
pub const DEFAULT_UPLOAD_BUDGET_MS: u64 = 4;

/// Default number of first-frame decodes allowed to run at once.
pub const DEFAULT_DECODE_CONCURRENCY: usize = 3;

/// Default time an idle decode worker waits for work before exiting.
pub const DEFAULT_WORKER_KEEP_ALIVE_MS: u64 = 3000;

/// Configuration for the streaming engine.
///
/// Missing keys in a TOML file fall back to their defaults and unknown keys
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Upload budget per idle tick in milliseconds
    pub upload_budget_ms: u64,
    /// Permits in the first-decode concurrency gate
    pub decode_concurrency: usize,
    /// Idle decode worker lifetime in milliseconds
    pub worker_keep_alive_ms: u64,
    /// Thread name prefix for decode workers
    pub worker_name: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            upload_budget_ms: DEFAULT_UPLOAD_BUDGET_MS,
            decode_concurrency: DEFAULT_DECODE_CONCURRENCY,
            worker_keep_alive_ms: DEFAULT_WORKER_KEEP_ALIVE_MS,
            worker_name: "tilestream-decode".to_string(),
        }
    }
}

impl StreamingConfig {
    /// Sets the upload budget in milliseconds.
    pub fn with_upload_budget_ms(mut self, ms: u64) -> Self {
        self.upload_budget_ms = ms;
        self
    }

    /// Sets the number of concurrent first-frame decodes.
    pub fn with_decode_concurrency(mut self, permits: usize) -> Self {
        self.decode_concurrency = permits;
        self
    }

    /// Sets the idle worker keep-alive in milliseconds.
    pub fn with_worker_keep_alive_ms(mut self, ms: u64) -> Self {
        self.worker_keep_alive_ms = ms;
        self
    }

    /// Sets the decode worker thread name prefix.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Upload budget as a [`Duration`].
    pub fn upload_budget(&self) -> Duration {
        Duration::from_millis(self.upload_budget_ms)
    }

    /// Worker keep-alive as a [`Duration`].
    pub fn worker_keep_alive(&self) -> Duration {
        Duration::from_millis(self.worker_keep_alive_ms)
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TILESTREAM_UPLOAD_BUDGET_MS`: upload budget per idle tick (default: 4)
    /// - `TILESTREAM_DECODE_CONCURRENCY`: concurrent first decodes (default: 3)
    /// - `TILESTREAM_WORKER_KEEP_ALIVE_MS`: idle worker lifetime (default: 3000)
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = env_value("TILESTREAM_UPLOAD_BUDGET_MS")? {
            config.upload_budget_ms = ms;
        }
        if let Some(permits) = env_value("TILESTREAM_DECODE_CONCURRENCY")? {
            config.decode_concurrency = permits;
        }
        if let Some(ms) = env_value("TILESTREAM_WORKER_KEEP_ALIVE_MS")? {
            config.worker_keep_alive_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// upload_budget_ms = 4
    /// decode_concurrency = 3
    /// worker_keep_alive_ms = 3000
    /// worker_name = "tilestream-decode"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string(self)?;
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_budget_ms == 0 {
            return Err(ConfigError::InvalidValue("upload_budget_ms".to_string()));
        }
        if self.decode_concurrency == 0 {
            return Err(ConfigError::InvalidValue("decode_concurrency".to_string()));
        }
        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed TOML
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
