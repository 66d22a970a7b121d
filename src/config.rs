//! Server configuration
//!
//! Everything the process needs before it can serve, gathered from command
//! line flags and the environment in one place:
//! - data directory (`--data-path`, `SOLVE_IT_DATA_PATH`, auto-detection)
//! - initial objective mapping
//! - security policy (`MCP_*` variables)
//! - logging (`LOG_*` variables, `--log-level`)

use crate::error::ConfigError;
use crate::knowledge::{data_path, DEFAULT_MAPPING_FILE};
use crate::logging::LogConfig;
use crate::security::SecurityPolicy;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Command line overrides; `None` means "use the environment or default"
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub mapping_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_path: PathBuf,
    pub mapping_file: String,
    pub policy: SecurityPolicy,
    pub log: LogConfig,
}

impl ServerConfig {
    /// Logging settings only; needed before the rest can be loaded and logged
    pub fn log_config(overrides: &CliOverrides) -> Result<LogConfig, ConfigError> {
        LogConfig::from_env()?.with_level(overrides.log_level.as_deref())
    }

    /// Full configuration from the process environment
    pub fn load(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let log = Self::log_config(overrides)?;
        let policy = SecurityPolicy::load()?;
        let data_path = data_path::resolve(overrides.data_path.as_deref())?;
        Self::assemble(data_path, overrides, policy, log)
    }

    /// Configuration with an already-resolved data directory
    pub fn assemble(
        data_path: PathBuf,
        overrides: &CliOverrides,
        policy: SecurityPolicy,
        log: LogConfig,
    ) -> Result<Self, ConfigError> {
        data_path::validate(&data_path)?;

        let mapping_file = overrides
            .mapping_file
            .clone()
            .unwrap_or_else(|| DEFAULT_MAPPING_FILE.to_string());

        debug!(
            data_path = %data_path.display(),
            mapping_file = %mapping_file,
            "Server configuration assembled"
        );

        Ok(Self {
            data_path,
            mapping_file,
            policy,
            log,
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}
