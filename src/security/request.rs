//! Inbound argument validation.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. request-rate admission
//! 2. aggregate serialized size
//! 3. per-field string length
//! 4. plain-data type safety
//!
//! Path validation against a tool's allowed prefixes is available as a
//! separate step for tools whose profile asks for it.

use super::policy::SecurityPolicy;
use super::profile::ToolSecurityProfile;
use super::rate_limit::TokenBucket;
use crate::error::SecurityViolation;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Field-name fragments that mark a parameter as a filesystem path
pub const PATH_FIELD_HINTS: [&str; 4] = ["path", "file", "dir", "folder"];

/// Validates tool arguments before any tool code runs
pub struct RequestValidator {
    policy: Arc<SecurityPolicy>,
    rate_limiter: TokenBucket,
}

impl RequestValidator {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        let rate_limiter = TokenBucket::per_minute(policy.request_rate_per_minute);
        Self {
            policy,
            rate_limiter,
        }
    }

    /// Run every request check in order
    pub fn validate(&self, tool_name: &str, arguments: &Value) -> Result<(), SecurityViolation> {
        if !self.rate_limiter.allow() {
            warn!(
                tool_name,
                security_violation = "rate_limit",
                "Rate limit exceeded for tool: {}",
                tool_name
            );
            return Err(SecurityViolation::RateLimitExceeded);
        }

        let input_size = serialized_len(arguments);
        if input_size > self.policy.max_input_bytes {
            warn!(
                tool_name,
                input_size,
                limit = self.policy.max_input_bytes,
                security_violation = "input_size",
                "Input size limit exceeded: {} bytes",
                input_size
            );
            return Err(SecurityViolation::InputTooLarge {
                actual: input_size,
                limit: self.policy.max_input_bytes,
            });
        }

        self.check_string_lengths(arguments, tool_name, "")?;
        check_plain_data(arguments, tool_name)?;

        debug!(tool_name, input_size, "Request validation passed for tool: {}", tool_name);
        Ok(())
    }

    fn check_string_lengths(
        &self,
        value: &Value,
        tool_name: &str,
        path: &str,
    ) -> Result<(), SecurityViolation> {
        match value {
            Value::String(s) => {
                let length = s.chars().count();
                if length > self.policy.max_string_length {
                    warn!(
                        tool_name,
                        string_length = length,
                        limit = self.policy.max_string_length,
                        path,
                        security_violation = "string_length",
                        "String length limit exceeded at {}",
                        path
                    );
                    return Err(SecurityViolation::StringTooLong {
                        path: path.to_string(),
                        length,
                        limit: self.policy.max_string_length,
                    });
                }
                Ok(())
            }
            Value::Object(map) => {
                for (key, child) in map {
                    self.check_string_lengths(child, tool_name, &key_path(path, key))?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.check_string_lengths(child, tool_name, &index_path(path, i))?;
                }
                Ok(())
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    /// Check path-like fields against the profile's allowed prefixes.
    ///
    /// Only top-level string fields whose name contains one of
    /// [`PATH_FIELD_HINTS`] are inspected.
    pub fn validate_paths(
        &self,
        tool_name: &str,
        profile: &ToolSecurityProfile,
        arguments: &Value,
    ) -> Result<(), SecurityViolation> {
        if !profile.require_path_validation {
            return Ok(());
        }

        let Some(map) = arguments.as_object() else {
            return Ok(());
        };

        for (field, value) in map {
            if !is_path_field(field) {
                continue;
            }
            let Value::String(raw) = value else {
                continue;
            };

            let allowed = normalize_path(Path::new(raw))
                .map(|resolved| {
                    profile
                        .allowed_path_prefixes
                        .iter()
                        .any(|prefix| resolved.starts_with(prefix))
                })
                .unwrap_or(false);

            if !allowed {
                warn!(
                    tool_name,
                    field_name = %field,
                    security_violation = "path_validation",
                    "Path not in allowed directories"
                );
                return Err(SecurityViolation::PathNotAllowed {
                    field: field.clone(),
                });
            }

            debug!(tool_name, field_name = %field, "Path validation passed");
        }

        Ok(())
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Request-rate bucket shared by every tool
    pub fn rate_limiter(&self) -> &TokenBucket {
        &self.rate_limiter
    }
}

/// Byte length of the canonical JSON form
pub fn serialized_len(value: &Value) -> usize {
    // Writing a Value to a String cannot fail; fall back to Display just in case.
    serde_json::to_string(value)
        .map(|s| s.len())
        .unwrap_or_else(|_| value.to_string().len())
}

/// The argument container must be a mapping; everything below it must be
/// plain data. `serde_json::Value` cannot carry code, so the walk over the
/// six value kinds only has to confirm the container shape.
fn check_plain_data(arguments: &Value, tool_name: &str) -> Result<(), SecurityViolation> {
    if arguments.is_object() {
        return Ok(());
    }

    let type_name = kind_name(arguments);
    error!(
        tool_name,
        object_type = type_name,
        path = "arguments",
        security_violation = "dangerous_type",
        "Arguments are not a mapping"
    );
    Err(SecurityViolation::DangerousType {
        type_name: type_name.to_string(),
        path: "arguments".to_string(),
    })
}

pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn is_path_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    PATH_FIELD_HINTS.iter().any(|hint| lower.contains(hint))
}

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

/// Absolute, lexically normalised form of `path`; `None` when it climbs with `..`
fn normalize_path(path: &Path) -> Option<PathBuf> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    Some(
        absolute
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect(),
    )
}
