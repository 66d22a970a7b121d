//! Bounded-time execution of tool calls.
//!
//! The knowledge base is synchronous, so each call runs on Tokio's blocking
//! pool under `tokio::time::timeout`. On expiry the join handle is dropped:
//! the caller gets the timeout error at once and the abandoned work finishes
//! (or not) on its own. Nothing is retried.

use super::policy::SecurityPolicy;
use crate::error::{Result, SecurityViolation, SolveItError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Outcome of capping a requested timeout against the policy ceiling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutDecision {
    pub requested: Duration,
    pub effective: Duration,
    pub capped: bool,
}

pub struct ExecutionGovernor {
    policy: Arc<SecurityPolicy>,
    capped_calls: AtomicU64,
}

impl ExecutionGovernor {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self {
            policy,
            capped_calls: AtomicU64::new(0),
        }
    }

    /// `min(requested, ceiling)`; capping is logged and counted
    pub fn decide(&self, tool_name: &str, requested: Duration) -> TimeoutDecision {
        let ceiling = self.policy.max_timeout();
        let effective = requested.min(ceiling);
        let capped = effective != requested;

        if capped {
            self.capped_calls.fetch_add(1, Ordering::Relaxed);
            info!(
                tool_name,
                requested_timeout = requested.as_secs_f64(),
                effective_timeout = effective.as_secs_f64(),
                max_timeout = ceiling.as_secs_f64(),
                "Tool timeout capped at maximum"
            );
        }

        TimeoutDecision {
            requested,
            effective,
            capped,
        }
    }

    /// Run `thunk` with an effective timeout derived from `requested`
    pub async fn run<F, T>(&self, tool_name: &str, requested: Duration, thunk: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let decision = self.decide(tool_name, requested);
        let handle = tokio::task::spawn_blocking(thunk);

        match tokio::time::timeout(decision.effective, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join_err)) => {
                error!(tool_name, error = %join_err, "Tool execution task failed");
                Err(SolveItError::Other(format!(
                    "Tool '{}' failed during execution",
                    tool_name
                )))
            }
            Err(_) => {
                let seconds = decision.effective.as_secs_f64();
                error!(
                    tool_name,
                    timeout_seconds = seconds,
                    security_violation = "execution_timeout",
                    "Tool execution timeout"
                );
                Err(SecurityViolation::ExecutionTimeout { seconds }.into())
            }
        }
    }

    /// Number of calls whose requested timeout exceeded the ceiling
    pub fn capped_calls(&self) -> u64 {
        self.capped_calls.load(Ordering::Relaxed)
    }
}
