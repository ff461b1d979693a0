//! Checkpoint configuration
//!
//! Loadable from a TOML file or built in code:
//!
//! ```toml
//! # Root directory holding one sub-directory per checkpoint epoch
//! checkpoint_dir = "./data/checkpoints"
//! # Ticks between two checkpoint passes
//! checkpoint_interval = 30
//! # Length of one tick in milliseconds
//! tick_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Checkpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoint root directory
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Number of ticks between checkpoint passes
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,
    /// Tick length in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

fn default_checkpoint_interval() -> u32 {
    30
}

fn default_tick_ms() -> u64 {
    1000
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig {
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_interval: default_checkpoint_interval(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl CheckpointConfig {
    /// Config rooted at `dir` with default timing
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointConfig::default().with_checkpoint_dir(dir)
    }

    /// Set the checkpoint root directory
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Set the number of ticks between passes
    pub fn with_interval(mut self, ticks: u32) -> Self {
        self.checkpoint_interval = ticks;
        self
    }

    /// Set the tick length
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick_ms = tick.as_millis() as u64;
        self
    }

    /// Tick length
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCheckpointDir);
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }

    /// Read, parse and validate config from a file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CheckpointConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Checkpoint directory is empty
    #[error("checkpoint_dir must not be empty")]
    EmptyCheckpointDir,

    /// Interval of zero ticks
    #[error("checkpoint_interval must be at least 1")]
    ZeroInterval,

    /// Tick of zero length
    #[error("tick_ms must be at least 1")]
    ZeroTick,

    /// Config file could not be read
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this struct
    #[error("Failed to parse config file '{}': {message}", path.display())]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Parser message
        message: String,
    },
}
