//! Engine Configuration
//!
//! Parameters shared by every session an [`LrcEngine`](crate::lrc::LrcEngine)
//! opens. Loadable from YAML; the CLI overrides individual values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lrc::layout::{DEFAULT_SHARD_SIZE, MAX_SHARDS};

/// Default parity shards per code instance: two local plus ten global
pub const DEFAULT_MAX_PARITY_SHARDS: usize = 12;

/// Default limit on concurrently open sessions
pub const DEFAULT_MAX_SESSIONS: usize = 3;

/// Local parity shards counted in `max_parity_shards` (row and column)
const LOCAL_PARITY_SHARDS: usize = 2;

/// Configuration for the LRC engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrcConfig {
    /// Parity shards per code instance; globals are this minus two
    pub max_parity_shards: usize,

    /// Maximum number of open sessions
    pub max_sessions: usize,

    /// Shard size in bytes
    pub shard_size: usize,
}

impl Default for LrcConfig {
    fn default() -> Self {
        Self {
            max_parity_shards: DEFAULT_MAX_PARITY_SHARDS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

impl LrcConfig {
    /// Number of global parity shards
    pub fn global_count(&self) -> usize {
        self.max_parity_shards.saturating_sub(LOCAL_PARITY_SHARDS)
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_parity_shards <= LOCAL_PARITY_SHARDS {
            return Err(Error::Config(format!(
                "max_parity_shards must exceed {} to leave room for global parity, got {}",
                LOCAL_PARITY_SHARDS, self.max_parity_shards
            )));
        }
        if self.max_parity_shards >= MAX_SHARDS {
            return Err(Error::Config(format!(
                "max_parity_shards must be below {}, got {}",
                MAX_SHARDS, self.max_parity_shards
            )));
        }
        if self.max_sessions == 0 {
            return Err(Error::Config(
                "max_sessions must be greater than 0".to_string(),
            ));
        }
        if self.shard_size < 2 {
            return Err(Error::Config(format!(
                "shard_size must be at least 2 bytes, got {}",
                self.shard_size
            )));
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }
}
