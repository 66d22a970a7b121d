//! SOLVE-IT MCP - forensic knowledge base server with a layered security pipeline
//!
//! Exposes the SOLVE-IT digital forensics knowledge base (techniques,
//! weaknesses, mitigations, objective mappings) as MCP tools. Every tool call
//! is rate limited, size checked, time bounded and truncated before its
//! output leaves the process.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Security**: policy, rate limiters, request/response validators, timeout governor
//! - **Knowledge**: the `KnowledgeBase` trait and its on-disk JSON implementation
//! - **MCP**: tool registry, dispatcher and JSON-RPC server over stdio
//!
//! # Example
//!
//! ```ignore
//! use solveit_core::{Dispatcher, JsonKnowledgeBase, SecurityMiddleware, SecurityPolicy, ToolRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let policy = SecurityPolicy::load()?;
//!     let registry = ToolRegistry::solveit(&policy)?;
//!     let kb = JsonKnowledgeBase::load("solve-it-main/data", "solve-it.json")?;
//!     let dispatcher = Dispatcher::new(registry, SecurityMiddleware::new(policy), Arc::new(kb));
//!
//!     let text = dispatcher
//!         .call_tool("search", serde_json::json!({"keywords": "disk imaging"}))
//!         .await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod knowledge;
pub mod logging;
pub mod mcp;
pub mod security;
pub mod utils;

// Re-export commonly used types
pub use config::{CliOverrides, ServerConfig};
pub use error::{ConfigError, Result, SecurityViolation, SolveItError};
pub use knowledge::{JsonKnowledgeBase, KnowledgeBase};
pub use mcp::{Dispatcher, McpServer, Tool, ToolDefinition, ToolRegistry};
pub use security::{SecurityMiddleware, SecurityPolicy, ToolSecurityProfile};
