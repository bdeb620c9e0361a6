//! Tool-invocation protocol for the weft coordinator.
//!
//! JSON-RPC 2.0 over stdio with the MCP handshake. The transport is a
//! thin shell: every tool call deserializes into the parameter types
//! from `weft-core` and dispatches into the task service.

mod error;
mod server;

pub use error::McpError;
pub use server::StdioMcpServer;
