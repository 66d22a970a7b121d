//! Post-processing of tool output.
//!
//! Size truncation runs first, then line truncation on the already-truncated
//! text, then the result is admitted against the output byte window.
//! Truncation is not an error; an over-budget window is.

use super::policy::SecurityPolicy;
use super::rate_limit::OutputRateLimiter;
use crate::error::SecurityViolation;
use crate::utils::string::prefix_within_bytes;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const SIZE_TRUNCATION_MARKER: &str = "\n[OUTPUT TRUNCATED - SIZE LIMIT EXCEEDED]";
pub const LINE_TRUNCATION_MARKER: &str = "\n[OUTPUT TRUNCATED - LINE LIMIT EXCEEDED]";

/// A response that passed validation, with what was done to it
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedResponse {
    pub text: String,
    pub original_size: usize,
    pub size_truncated: bool,
    pub lines_truncated: bool,
}

impl ValidatedResponse {
    pub fn truncated(&self) -> bool {
        self.size_truncated || self.lines_truncated
    }
}

pub struct ResponseValidator {
    policy: Arc<SecurityPolicy>,
    output_limiter: OutputRateLimiter,
}

impl ResponseValidator {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        let output_limiter = OutputRateLimiter::new(policy.output_bytes_rate_per_minute);
        Self {
            policy,
            output_limiter,
        }
    }

    /// Truncate and admit `result`, returning the text to send
    pub fn validate(&self, result: String, tool_name: &str) -> Result<String, SecurityViolation> {
        self.validate_detailed(result, tool_name).map(|r| r.text)
    }

    pub fn validate_detailed(
        &self,
        result: String,
        tool_name: &str,
    ) -> Result<ValidatedResponse, SecurityViolation> {
        let original_size = result.len();
        let mut text = result;
        let mut size_truncated = false;
        let mut lines_truncated = false;

        if text.len() > self.policy.max_output_bytes {
            let keep = prefix_within_bytes(&text, self.policy.max_output_bytes).len();
            text.truncate(keep);
            text.push_str(SIZE_TRUNCATION_MARKER);
            size_truncated = true;

            warn!(
                tool_name,
                original_size,
                truncated_size = text.len(),
                limit = self.policy.max_output_bytes,
                security_action = "truncate_output",
                "Output truncated due to size limit"
            );
        }

        let line_count = text.split('\n').count();
        if line_count > self.policy.max_output_lines {
            let mut kept = text
                .split('\n')
                .take(self.policy.max_output_lines)
                .collect::<Vec<_>>()
                .join("\n");
            kept.push_str(LINE_TRUNCATION_MARKER);
            text = kept;
            lines_truncated = true;

            warn!(
                tool_name,
                original_lines = line_count,
                truncated_lines = self.policy.max_output_lines,
                security_action = "truncate_lines",
                "Output truncated due to line limit"
            );
        }

        let final_size = text.len();
        if !self.output_limiter.check_output_rate(final_size) {
            error!(
                tool_name,
                output_size = final_size,
                security_violation = "output_rate_limit",
                "Output rate limit exceeded"
            );
            return Err(SecurityViolation::OutputRateLimitExceeded { size: final_size });
        }

        if !size_truncated && !lines_truncated {
            debug!(
                tool_name,
                output_size = final_size,
                "Response validation passed for tool: {}",
                tool_name
            );
        }

        Ok(ValidatedResponse {
            text,
            original_size,
            size_truncated,
            lines_truncated,
        })
    }
}
