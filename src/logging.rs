//! Tracing subscriber setup
//!
//! stdout carries the protocol, so logs go to stderr or, with
//! `LOG_TO_FILE=true`, to an append-only file.

use crate::error::{ConfigError, Result, SolveItError};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_LOG_TO_FILE: &str = "LOG_TO_FILE";
pub const ENV_LOG_FILE_PATH: &str = "LOG_FILE_PATH";

const LOG_FILE_NAME: &str = "mcp_server.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Level for this crate; dependencies stay at `warn`
    pub level: String,
    pub format: LogFormat,
    /// Log file, when file logging is enabled
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            file: None,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let level = present(ENV_LOG_LEVEL)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_else(|| "info".to_string());
        let level = normalize_level(&level).ok_or_else(|| ConfigError::Malformed {
            key: ENV_LOG_LEVEL.to_string(),
            value: level.clone(),
        })?;

        let format = match present(ENV_LOG_FORMAT).map(|v| v.trim().to_lowercase()) {
            None => LogFormat::Human,
            Some(v) if v == "human" => LogFormat::Human,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => {
                return Err(ConfigError::Malformed {
                    key: ENV_LOG_FORMAT.to_string(),
                    value: v,
                })
            }
        };

        let to_file = match present(ENV_LOG_TO_FILE).map(|v| v.trim().to_lowercase()) {
            None => false,
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => true,
            Some(v) if matches!(v.as_str(), "false" | "0" | "no") => false,
            Some(v) => {
                return Err(ConfigError::Malformed {
                    key: ENV_LOG_TO_FILE.to_string(),
                    value: v,
                })
            }
        };

        let file = to_file.then(|| {
            present(ENV_LOG_FILE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(default_log_file)
        });

        Ok(Self {
            level: level.to_string(),
            format,
            file,
        })
    }

    /// Apply a `--log-level` flag on top of the environment
    pub fn with_level(mut self, level: Option<&str>) -> std::result::Result<Self, ConfigError> {
        if let Some(level) = level {
            let normalized =
                normalize_level(&level.to_lowercase()).ok_or_else(|| ConfigError::Malformed {
                    key: "--log-level".to_string(),
                    value: level.to_string(),
                })?;
            self.level = normalized.to_string();
        }
        Ok(self)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::new(format!(
            "warn,solveit_core={level},solveit_mcp={level}",
            level = self.level
        ))
    }
}

/// `~/.local/share/solveit-mcp/mcp_server.log` or the platform equivalent
fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solveit-mcp")
        .join(LOG_FILE_NAME)
}

fn normalize_level(level: &str) -> Option<&'static str> {
    match level {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LogConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(false);

    let installed = match (&config.file, config.format) {
        (None, LogFormat::Human) => builder.with_writer(std::io::stderr).try_init(),
        (None, LogFormat::Json) => builder.json().with_writer(std::io::stderr).try_init(),
        (Some(path), format) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = Mutex::new(file);
            match format {
                LogFormat::Human => builder.with_ansi(false).with_writer(writer).try_init(),
                LogFormat::Json => builder.json().with_writer(writer).try_init(),
            }
        }
    };

    installed.map_err(|e| SolveItError::Other(format!("Failed to initialise logging: {}", e)))
}
