//! Process-wide security policy
//!
//! Numeric ceilings that every request is checked against. The policy is
//! built once at startup, wrapped in an `Arc` and handed to every component
//! that needs it. It is never mutated afterwards.

use crate::error::ConfigError;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const ENV_MAX_INPUT_SIZE: &str = "MCP_MAX_INPUT_SIZE";
pub const ENV_MAX_STRING_LENGTH: &str = "MCP_MAX_STRING_LENGTH";
pub const ENV_MAX_OUTPUT_SIZE: &str = "MCP_MAX_OUTPUT_SIZE";
pub const ENV_MAX_OUTPUT_LINES: &str = "MCP_MAX_OUTPUT_LINES";
pub const ENV_DEFAULT_TIMEOUT: &str = "MCP_DEFAULT_TIMEOUT";
pub const ENV_MAX_TIMEOUT: &str = "MCP_MAX_TIMEOUT";
pub const ENV_RATE_LIMIT: &str = "MCP_RATE_LIMIT";
pub const ENV_OUTPUT_RATE_LIMIT: &str = "MCP_OUTPUT_RATE_LIMIT";

/// Security ceilings applied to every tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityPolicy {
    /// Largest serialized argument payload accepted (bytes)
    pub max_input_bytes: usize,

    /// Longest single string value accepted (characters)
    pub max_string_length: usize,

    /// Response size before truncation (bytes)
    pub max_output_bytes: usize,

    /// Response line count before truncation
    pub max_output_lines: usize,

    /// Timeout for tools that declare none (seconds)
    pub default_timeout_seconds: f64,

    /// Hard execution ceiling (seconds)
    pub max_timeout_seconds: f64,

    /// Admitted requests per minute
    pub request_rate_per_minute: u32,

    /// Admitted response bytes per minute
    pub output_bytes_rate_per_minute: u64,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            max_input_bytes: 1_000_000,
            max_string_length: 100_000,
            max_output_bytes: 10_000_000,
            max_output_lines: 50_000,
            default_timeout_seconds: 30.0,
            max_timeout_seconds: 300.0,
            request_rate_per_minute: 100,
            output_bytes_rate_per_minute: 52_428_800,
        }
    }
}

impl SecurityPolicy {
    /// Load the policy from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the policy from an arbitrary key lookup.
    ///
    /// Missing or blank values fall back to the defaults; a value that is
    /// present but does not parse is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let policy = Self {
            max_input_bytes: read(&lookup, ENV_MAX_INPUT_SIZE, defaults.max_input_bytes)?,
            max_string_length: read(&lookup, ENV_MAX_STRING_LENGTH, defaults.max_string_length)?,
            max_output_bytes: read(&lookup, ENV_MAX_OUTPUT_SIZE, defaults.max_output_bytes)?,
            max_output_lines: read(&lookup, ENV_MAX_OUTPUT_LINES, defaults.max_output_lines)?,
            default_timeout_seconds: read(
                &lookup,
                ENV_DEFAULT_TIMEOUT,
                defaults.default_timeout_seconds,
            )?,
            max_timeout_seconds: read(&lookup, ENV_MAX_TIMEOUT, defaults.max_timeout_seconds)?,
            request_rate_per_minute: read(
                &lookup,
                ENV_RATE_LIMIT,
                defaults.request_rate_per_minute,
            )?,
            output_bytes_rate_per_minute: read(
                &lookup,
                ENV_OUTPUT_RATE_LIMIT,
                defaults.output_bytes_rate_per_minute,
            )?,
        };

        policy.validate()?;

        info!(
            max_input_bytes = policy.max_input_bytes,
            max_output_bytes = policy.max_output_bytes,
            default_timeout_seconds = policy.default_timeout_seconds,
            max_timeout_seconds = policy.max_timeout_seconds,
            request_rate_per_minute = policy.request_rate_per_minute,
            output_bytes_rate_per_minute = policy.output_bytes_rate_per_minute,
            "Security policy loaded"
        );

        Ok(policy)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("default timeout", self.default_timeout_seconds),
            ("max timeout", self.max_timeout_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidPolicy(format!(
                    "{} must be a positive number of seconds, got {}",
                    name, value
                )));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidPolicy(format!(
                    "{} of {}s is too large to represent",
                    name, value
                )));
            }
        }

        if self.default_timeout_seconds > self.max_timeout_seconds {
            return Err(ConfigError::InvalidPolicy(format!(
                "default timeout ({}s) exceeds max timeout ({}s)",
                self.default_timeout_seconds, self.max_timeout_seconds
            )));
        }

        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        seconds_to_duration(self.default_timeout_seconds)
    }

    pub fn max_timeout(&self) -> Duration {
        seconds_to_duration(self.max_timeout_seconds)
    }
}

/// Saturating conversion for policies built without [`SecurityPolicy::validate`]
pub(crate) fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

fn read<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|_| ConfigError::Malformed {
                key: key.to_string(),
                value: raw,
            })
        }
        _ => Ok(default),
    }
}
