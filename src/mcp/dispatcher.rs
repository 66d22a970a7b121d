//! Tool call orchestration
//!
//! Every `tools/call` goes through the same fixed sequence:
//! request validation, registry lookup, per-tool parameter security,
//! bounded execution, response validation. Nothing is reordered and a
//! failure at any stage ends the call.

use super::tools::{Tool, ToolRegistry};
use crate::error::{Result, SolveItError};
use crate::knowledge::KnowledgeBase;
use crate::security::{sanitize_value, SecurityMiddleware};
use crate::utils::string::truncate_at_char_boundary;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ARGUMENT_PREVIEW_CHARS: usize = 200;

/// Per-request tracing id, `tool_` followed by eight hex digits
pub fn correlation_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("tool_{}", &id[..8])
}

pub struct Dispatcher {
    registry: ToolRegistry,
    security: SecurityMiddleware,
    knowledge_base: Arc<dyn KnowledgeBase>,
}

impl Dispatcher {
    pub fn new(
        registry: ToolRegistry,
        security: SecurityMiddleware,
        knowledge_base: Arc<dyn KnowledgeBase>,
    ) -> Self {
        Self {
            registry,
            security,
            knowledge_base,
        }
    }

    /// Static tool metadata for discovery
    pub fn list_tools(&self) -> Vec<Tool> {
        self.registry.list()
    }

    pub fn security(&self) -> &SecurityMiddleware {
        &self.security
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call through the security pipeline
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String> {
        let correlation_id = correlation_id();
        let started = Instant::now();

        // A missing argument object is an empty one
        let arguments = match arguments {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };

        info!(
            correlation_id = %correlation_id,
            tool_name,
            arguments = %truncate_at_char_boundary(&arguments.to_string(), ARGUMENT_PREVIEW_CHARS),
            "Tool call received"
        );

        let outcome = self.run_pipeline(&correlation_id, tool_name, arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(text) => info!(
                correlation_id = %correlation_id,
                tool_name,
                duration_ms,
                result_size = text.len(),
                "Tool call completed"
            ),
            Err(SolveItError::Security(violation)) => error!(
                correlation_id = %correlation_id,
                tool_name,
                duration_ms,
                security_violation = violation.kind(),
                error = %violation,
                "Tool call rejected by security policy"
            ),
            Err(e) => error!(
                correlation_id = %correlation_id,
                tool_name,
                duration_ms,
                error = %e,
                error_debug = ?e,
                "Tool call failed"
            ),
        }

        outcome
    }

    async fn run_pipeline(
        &self,
        correlation_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<String> {
        self.security.requests().validate(tool_name, &arguments)?;

        let tool = self.registry.get(tool_name).ok_or_else(|| {
            warn!(correlation_id, tool_name, "Unknown tool requested");
            SolveItError::UnknownTool(tool_name.to_string())
        })?;

        let arguments = if tool.profile.auto_sanitize_strings {
            sanitize_value(arguments)
        } else {
            arguments
        };
        self.security
            .requests()
            .validate_paths(tool_name, &tool.profile, &arguments)?;

        debug!(correlation_id, tool_name, "Routing to tool");

        let requested = tool.profile.requested_timeout(self.security.policy());
        let invoke = tool.invoker();
        let knowledge_base = Arc::clone(&self.knowledge_base);
        let raw = self
            .security
            .governor()
            .run(tool_name, requested, move || {
                invoke(knowledge_base.as_ref(), arguments)
            })
            .await??;

        Ok(self.security.responses().validate(raw, tool_name)?)
    }
}
