//! # mettarag, MeTTa code RAG backend
//!
//! Indexes MeTTa repositories and their documentation, links code chunks
//! through the functions they call, and serves dependency-aware context to
//! AI assistants via the Model Context Protocol (MCP).
//!
//! ## Architecture
//!
//! - **[`indexer`]**: MeTTa syntax trees, call/definition extraction, AST and markdown chunking, ingestion
//! - **[`db`]**: SQLite + sqlite-vec chunk store (CRUD, scoped lookups, vector search)
//! - **[`deps`]**: Batch dependency resolver and query-time dependency expander
//! - **[`rag`]**: Per-category retrieval and context assembly
//! - **[`embedder`]**: Embedding trait, ONNX sentence embedder with model download, deterministic test embedder
//! - **[`config`]**: Configuration loading and validation
//! - **[`mcp`]**: MCP server with 4 tool handlers (stdio transport via rmcp)

pub mod config;
pub mod db;
pub mod deps;
pub mod embedder;
pub mod indexer;
pub mod mcp;
pub mod rag;
