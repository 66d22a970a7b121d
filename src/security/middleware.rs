//! The security components a dispatcher needs, built from one policy.

use super::governor::ExecutionGovernor;
use super::policy::SecurityPolicy;
use super::request::RequestValidator;
use super::response::ResponseValidator;
use std::sync::Arc;
use tracing::info;

/// One instance per server; every stage reads the same immutable policy
pub struct SecurityMiddleware {
    policy: Arc<SecurityPolicy>,
    request_validator: RequestValidator,
    governor: ExecutionGovernor,
    response_validator: ResponseValidator,
}

impl SecurityMiddleware {
    pub fn new(policy: SecurityPolicy) -> Self {
        let policy = Arc::new(policy);

        info!(
            max_input_bytes = policy.max_input_bytes,
            max_output_bytes = policy.max_output_bytes,
            max_timeout_seconds = policy.max_timeout_seconds,
            request_rate_per_minute = policy.request_rate_per_minute,
            "Security middleware initialized"
        );

        Self {
            request_validator: RequestValidator::new(Arc::clone(&policy)),
            governor: ExecutionGovernor::new(Arc::clone(&policy)),
            response_validator: ResponseValidator::new(Arc::clone(&policy)),
            policy,
        }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    pub fn requests(&self) -> &RequestValidator {
        &self.request_validator
    }

    pub fn governor(&self) -> &ExecutionGovernor {
        &self.governor
    }

    pub fn responses(&self) -> &ResponseValidator {
        &self.response_validator
    }
}

impl Default for SecurityMiddleware {
    fn default() -> Self {
        Self::new(SecurityPolicy::default())
    }
}
