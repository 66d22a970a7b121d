//! Per-tool security profiles.
//!
//! A profile is declared next to each tool in the registry and checked once,
//! when the registry is built. A bad profile stops startup instead of failing
//! the first call.

use super::policy::{seconds_to_duration, SecurityPolicy};
use super::request::is_path_field;
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeouts above this need `allow_long_execution`
pub const LONG_EXECUTION_THRESHOLD_SECONDS: f64 = 60.0;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\-_.]").expect("static sanitizer pattern"));

/// Security settings a tool declares at registration
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSecurityProfile {
    /// Requested execution timeout; `None` uses the policy default.
    /// Capped by the policy ceiling at call time.
    pub requested_timeout_seconds: Option<f64>,

    /// Explicit opt-in for timeouts above 60 seconds
    pub allow_long_execution: bool,

    /// Strip unsafe characters from every string argument
    pub auto_sanitize_strings: bool,

    /// Restrict path-like arguments to `allowed_path_prefixes`
    pub require_path_validation: bool,

    /// Absolute directory prefixes accepted by path validation
    pub allowed_path_prefixes: Vec<PathBuf>,
}

impl Default for ToolSecurityProfile {
    fn default() -> Self {
        Self {
            requested_timeout_seconds: None,
            allow_long_execution: false,
            auto_sanitize_strings: true,
            require_path_validation: false,
            allowed_path_prefixes: Vec::new(),
        }
    }
}

impl ToolSecurityProfile {
    /// Profile shared by the read-only knowledge base tools
    pub fn knowledge_base() -> Self {
        Self {
            requested_timeout_seconds: Some(45.0),
            ..Self::default()
        }
    }

    pub fn requested_timeout_seconds(&self, policy: &SecurityPolicy) -> f64 {
        self.requested_timeout_seconds
            .unwrap_or(policy.default_timeout_seconds)
    }

    /// Timeout to request from the governor, before capping
    pub fn requested_timeout(&self, policy: &SecurityPolicy) -> Duration {
        seconds_to_duration(self.requested_timeout_seconds(policy))
    }

    /// Fail-fast check run when a tool is registered
    pub fn validate(
        &self,
        tool_name: &str,
        policy: &SecurityPolicy,
        param_names: &[&str],
    ) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidProfile {
            tool: tool_name.to_string(),
            reason,
        };

        let timeout = self.requested_timeout_seconds(policy);
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(invalid(format!("timeout must be positive, got {}s", timeout)));
        }

        if timeout > policy.max_timeout_seconds {
            if !self.allow_long_execution {
                return Err(invalid(format!(
                    "timeout ({}s) exceeds maximum ({}s) without allow_long_execution",
                    timeout, policy.max_timeout_seconds
                )));
            }
            warn!(
                tool_name,
                requested_timeout = timeout,
                max_timeout = policy.max_timeout_seconds,
                "Tool timeout above maximum; calls will be capped"
            );
        }

        if timeout > LONG_EXECUTION_THRESHOLD_SECONDS && !self.allow_long_execution {
            return Err(invalid(format!(
                "requests {}s timeout but allow_long_execution is false",
                timeout
            )));
        }

        if self.require_path_validation {
            if self.allowed_path_prefixes.is_empty() {
                return Err(invalid(
                    "requires path validation but declares no allowed path prefixes".to_string(),
                ));
            }
            if let Some(relative) = self.allowed_path_prefixes.iter().find(|p| !p.is_absolute()) {
                return Err(invalid(format!(
                    "allowed path prefix '{}' must be absolute",
                    relative.display()
                )));
            }
        } else {
            for name in param_names.iter().filter(|n| is_path_field(n)) {
                warn!(
                    tool_name,
                    param = *name,
                    "Parameter may handle file paths but path validation is disabled"
                );
            }
        }

        debug!(tool_name, "Security profile validated");
        Ok(())
    }
}

/// Remove every character outside `[\w\s\-_.]`
pub fn sanitize_input(input: &str) -> String {
    UNSAFE_CHARS.replace_all(input, "").into_owned()
}

/// Apply [`sanitize_input`] to every string in a JSON tree
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_input(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}
