//! JSON-RPC 2.0 / MCP stdio surface over the graph operations.

pub mod server;
pub mod tools;
pub mod types;

pub use server::McpServer;
