//! MCP stdio server and its tool handlers.
pub mod server;
pub mod tools;
