//! Parsing, chunking and ingestion of MeTTa repositories.
pub mod chunker;
pub mod core;
pub mod functions;
pub mod markdown;
pub mod syntax;

pub use self::core::{IngestStats, Indexer};
