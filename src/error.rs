//! Error types for the SOLVE-IT MCP server
//!
//! This module provides structured error definitions using thiserror. Three
//! families are kept apart because callers treat them differently:
//! - [`ConfigError`]: startup-time only, fatal
//! - [`SecurityViolation`]: request-time policy rejections
//! - everything else in [`SolveItError`]: unknown tools, bad parameters, I/O

use thiserror::Error;

/// Policy-enforced rejection of a single request.
///
/// Messages state the limit and the observed value, never internal paths or
/// collaborator details.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SecurityViolation {
    /// Request-rate bucket was empty
    #[error("Rate limit exceeded. Please slow down.")]
    RateLimitExceeded,

    /// Serialized arguments were larger than the input ceiling
    #[error("Input too large: {actual} bytes (limit: {limit})")]
    InputTooLarge { actual: usize, limit: usize },

    /// A string leaf exceeded the per-field ceiling
    #[error("String too long at {path}: {length} chars (limit: {limit})")]
    StringTooLong {
        path: String,
        length: usize,
        limit: usize,
    },

    /// A value that is not plain data was found in the arguments
    #[error("Dangerous object type not allowed: {type_name} at {path}")]
    DangerousType { type_name: String, path: String },

    /// The tool did not finish inside its effective timeout
    #[error("Tool execution timeout ({seconds}s)")]
    ExecutionTimeout { seconds: f64 },

    /// The sliding output window has no room for this response
    #[error("Output rate limit exceeded - server is sending too much data")]
    OutputRateLimitExceeded { size: usize },

    /// A path-like argument resolved outside the tool's allowed prefixes
    #[error("Path in '{field}' is not in allowed directories")]
    PathNotAllowed { field: String },
}

impl SecurityViolation {
    /// Short machine-readable tag used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit",
            Self::InputTooLarge { .. } => "input_size",
            Self::StringTooLong { .. } => "string_length",
            Self::DangerousType { .. } => "dangerous_type",
            Self::ExecutionTimeout { .. } => "execution_timeout",
            Self::OutputRateLimitExceeded { .. } => "output_rate_limit",
            Self::PathNotAllowed { .. } => "path_validation",
        }
    }
}

/// Configuration problems detected while the process starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A present environment value could not be parsed
    #[error("Malformed value for {key}: '{value}'")]
    Malformed { key: String, value: String },

    /// Values parsed but are inconsistent with each other
    #[error("Invalid security policy: {0}")]
    InvalidPolicy(String),

    /// A tool declared a security profile that cannot be honoured
    #[error("Invalid security profile for tool '{tool}': {reason}")]
    InvalidProfile { tool: String, reason: String },

    /// The knowledge base directory could not be located or is incomplete
    #[error("Data path error: {0}")]
    DataPath(String),
}

/// Main error type for SOLVE-IT MCP operations
#[derive(Error, Debug)]
pub enum SolveItError {
    /// Request rejected by the security middleware
    #[error("Security policy violation: {0}")]
    Security(#[from] SecurityViolation),

    /// Tool name not present in the registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments could not be coerced into the tool's parameter shape
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Knowledge base lookup failed
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    /// Requested item does not exist
    #[error("Item not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl SolveItError {
    /// True for rejections that came from the security middleware
    pub fn is_security_violation(&self) -> bool {
        matches!(self, SolveItError::Security(_))
    }
}

/// Result type alias for SOLVE-IT MCP operations
pub type Result<T> = std::result::Result<T, SolveItError>;

/// Convert anyhow::Error to SolveItError
impl From<anyhow::Error> for SolveItError {
    fn from(err: anyhow::Error) -> Self {
        SolveItError::Other(err.to_string())
    }
}
