//! Model Context Protocol (MCP) server implementation
//!
//! Provides a JSON-RPC 2.0 server over stdio exposing the SOLVE-IT tools.
//! Every tool call passes through the security middleware in `dispatcher`.

pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::McpServer;
pub use tools::{Tool, ToolDefinition, ToolRegistry};
